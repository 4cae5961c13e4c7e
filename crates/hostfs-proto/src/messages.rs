// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Control channel message types for HostFS
//!
//! Everything here travels as one JSON object per line. Field names on the
//! wire are camelCase; callback handles travel as `{"$callback": <id>}`
//! references that the transport resolves on either end.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference to a callback registered on the other end of the channel.
///
/// Clients embed these in request params (e.g. `onChange`); the daemon embeds
/// them in results (e.g. `stopWatching`). The id is only meaningful within the
/// connection that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRef {
    #[serde(rename = "$callback")]
    pub id: u64,
}

/// Frames sent by a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Request(RequestEnvelope),
    Invoke(InvokeFrame),
}

/// A method invocation from an authenticated client.
///
/// `username` is the transport-authenticated caller identity; by the time an
/// envelope reaches the dispatcher it is trusted. `params` carries the typed
/// parameter record as its first element.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub username: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Invocation of a daemon-minted callback, e.g. `stopWatching`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct InvokeFrame {
    pub invoke: u64,
}

/// Frames sent by the daemon.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Response(ResponseEnvelope),
    Callback(CallbackFrame),
}

/// Result or error for a request, matched to it by `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

/// Structured error surfaced to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
}

/// Invocation of a client-registered callback (change-event delivery).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackFrame {
    pub callback: u64,
    pub args: Vec<Value>,
}

/// Immutable snapshot of a directory entry.
///
/// `target` is present only for symlinks that resolve; a broken symlink is
/// reported with `is_broken` set and no target, never as an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub full_path: String,
    pub is_dir: bool,
    pub size: u64,
    pub mode: u32,
    pub time: i64,
    pub is_broken: bool,
    pub readable: bool,
    pub writable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Classification of a filesystem change delivered to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
}

/// Payload delivered through a subscription's `onChange` callback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event: ChangeKind,
    pub file: FileEntry,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadDirectoryParams {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub on_change: Option<CallbackRef>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobParams {
    #[serde(default)]
    pub pattern: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileParams {
    #[serde(default)]
    pub path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileParams {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: Vec<u8>,
    #[serde(default)]
    pub do_not_overwrite: bool,
    #[serde(default)]
    pub append: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniquePathParams {
    #[serde(default)]
    pub path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInfoParams {
    #[serde(default)]
    pub path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPermissionsParams {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveParams {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

/// Shared by `Rename` and its `Move` alias.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectoryParams {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyParams {
    #[serde(default)]
    pub src_path: String,
    #[serde(default)]
    pub dst_path: String,
}
