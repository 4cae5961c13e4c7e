// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! HostFS Protocol — wire types and validation
//!
//! This crate defines the JSON schemas and request/response types for the
//! HostFS control channel, used by the daemon and by client stubs.

pub mod messages;
pub mod validation;

// Re-export key types
pub use messages::{
    CallbackFrame, CallbackRef, ChangeEvent, ChangeKind, ClientFrame, CopyParams,
    CreateDirectoryParams, FileEntry, GetInfoParams, GlobParams, InvokeFrame, ReadDirectoryParams,
    ReadFileParams, RemoveParams, RenameParams, RequestEnvelope, ResponseEnvelope, ServerFrame,
    SetPermissionsParams, UniquePathParams, WireError, WriteFileParams,
};
pub use validation::{decode_params, OperationParams, ValidationError};
