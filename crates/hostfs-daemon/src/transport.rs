// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Transport-facing seams
//!
//! The RPC transport itself lives outside the dispatcher and the watch hub;
//! these traits are the only surface the core consumes. The concrete
//! Unix-socket transport in [`crate::server`] implements all three.

use std::sync::Arc;

use hostfs_proto::CallbackRef;
use serde_json::Value;

/// A remote callback handle. Invoking it delivers the value to the client
/// that registered it.
///
/// Delivery is fire-and-forget with no back-pressure guarantee, and `call`
/// must never block: the watch hub invokes it from its event loop.
pub trait RemoteCallback: Send + Sync {
    fn call(&self, value: Value);
}

/// The originating client of a request, observable for disconnection.
pub trait ClientLink: Send + Sync {
    /// Register a hook that runs once when the client's connection goes away.
    fn on_disconnect(&self, hook: Box<dyn FnOnce() + Send>);
}

/// Per-request context supplied by the transport alongside the envelope.
pub trait RequestContext: Send + Sync {
    /// Transport-authenticated caller identity. Trusted by the time the
    /// request reaches a handler.
    fn username(&self) -> &str;

    /// Materialize a remote callback handle from a wire reference found in
    /// the request params.
    fn remote_callback(&self, reference: CallbackRef) -> Arc<dyn RemoteCallback>;

    /// Mint a server-side callback the client can invoke later, e.g.
    /// `stopWatching`.
    fn register_callback(&self, hook: Box<dyn Fn() + Send + Sync>) -> CallbackRef;

    /// The client issuing this request, for disconnect binding.
    fn client(&self) -> Arc<dyn ClientLink>;
}
