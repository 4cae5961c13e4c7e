// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! HostFS Daemon - remote filesystem agent
//!
//! A long-lived process that exposes filesystem operations to authenticated
//! remote clients over a persistent bidirectional channel and streams change
//! notifications back to subscribed clients. This crate provides the request
//! dispatcher, the directory-watch multiplexer and the Unix-socket transport;
//! it can be embedded in executables or used as a standalone daemon.

pub mod logging;
pub mod operations;
pub mod server;
pub mod transport;
pub mod watch;

// Re-export the main daemon types
pub use operations::Dispatcher;
pub use server::DaemonServer;
pub use transport::{ClientLink, RemoteCallback, RequestContext};
pub use watch::{StopHandle, WatchHub};
