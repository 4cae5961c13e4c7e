// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request dispatch
//!
//! One handler per exposed operation. Each handler decodes the first
//! positional argument of the envelope into its typed parameter record,
//! validates it, invokes the matching path primitive or the watch hub, and
//! returns the result as a JSON value. Handlers are stateless and may run
//! concurrently; no ordering is imposed between requests of one caller.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use hostfs_core::{ops, FsError, FsResult};
use hostfs_proto::{
    decode_params, CopyParams, CreateDirectoryParams, GetInfoParams, GlobParams, OperationParams,
    ReadDirectoryParams, ReadFileParams, RemoveParams, RenameParams, RequestEnvelope,
    SetPermissionsParams, UniquePathParams, WriteFileParams,
};

use crate::transport::RequestContext;
use crate::watch::WatchHub;

fn decode<T: OperationParams>(envelope: &RequestEnvelope) -> FsResult<T> {
    decode_params(&envelope.params).map_err(|err| FsError::BadArguments(err.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> FsResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| FsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
}

/// Maps operation names onto their handlers.
pub struct Dispatcher {
    hub: Arc<WatchHub>,
}

impl Dispatcher {
    pub fn new(hub: Arc<WatchHub>) -> Self {
        Self { hub }
    }

    pub fn watch_hub(&self) -> &Arc<WatchHub> {
        &self.hub
    }

    /// Execute one request and produce its result value.
    ///
    /// Errors are surfaced verbatim to the caller; *bad-arguments* messages
    /// enumerate the expected parameter schema.
    pub fn process_request(
        &self,
        envelope: &RequestEnvelope,
        ctx: &dyn RequestContext,
    ) -> FsResult<Value> {
        debug!(method = %envelope.method, username = %envelope.username, "processing request");

        match envelope.method.as_str() {
            "ReadDirectory" => self.read_directory(envelope, ctx),
            "Glob" => {
                let params: GlobParams = decode(envelope)?;
                to_json(&ops::glob(&params.pattern)?)
            }
            "ReadFile" => {
                let params: ReadFileParams = decode(envelope)?;
                to_json(&ops::read_file(Path::new(&params.path))?)
            }
            "WriteFile" => {
                let params: WriteFileParams = decode(envelope)?;
                let written = ops::write_file(
                    Path::new(&params.path),
                    &params.content,
                    params.do_not_overwrite,
                    params.append,
                )?;
                Ok(Value::from(written as u64))
            }
            "UniquePath" => {
                let params: UniquePathParams = decode(envelope)?;
                let path = ops::unique_path(Path::new(&params.path))?;
                Ok(Value::String(path.to_string_lossy().into_owned()))
            }
            "GetInfo" => {
                let params: GetInfoParams = decode(envelope)?;
                to_json(&ops::get_info(Path::new(&params.path))?)
            }
            "SetPermissions" => {
                let params: SetPermissionsParams = decode(envelope)?;
                ops::set_permissions(Path::new(&params.path), params.mode, params.recursive)?;
                Ok(Value::Bool(true))
            }
            "Remove" => {
                let params: RemoveParams = decode(envelope)?;
                ops::remove(Path::new(&params.path), params.recursive)?;
                Ok(Value::Bool(true))
            }
            // Move is an alias of Rename; neither falls back to
            // copy-then-delete across filesystems
            "Rename" | "Move" => {
                let params: RenameParams = decode(envelope)?;
                ops::rename(Path::new(&params.old_path), Path::new(&params.new_path))?;
                Ok(Value::Bool(true))
            }
            "CreateDirectory" => {
                let params: CreateDirectoryParams = decode(envelope)?;
                ops::create_directory(Path::new(&params.path), params.recursive)?;
                Ok(Value::Bool(true))
            }
            "Copy" => {
                let params: CopyParams = decode(envelope)?;
                ops::copy(Path::new(&params.src_path), Path::new(&params.dst_path))?;
                Ok(Value::Bool(true))
            }
            other => Err(FsError::BadArguments(format!("unknown method: {other}"))),
        }
    }

    /// List a directory and, when a change callback was supplied, subscribe
    /// the caller to its changes.
    ///
    /// The response carries `stopWatching` iff `onChange` was present; the
    /// subscription is also bound to the client's disconnect signal.
    fn read_directory(
        &self,
        envelope: &RequestEnvelope,
        ctx: &dyn RequestContext,
    ) -> FsResult<Value> {
        let params: ReadDirectoryParams = decode(envelope)?;
        let mut response = Map::new();

        if let Some(reference) = params.on_change {
            let callback = ctx.remote_callback(reference);
            let stop =
                self.hub.subscribe(Path::new(&params.path), ctx.username(), callback, ctx.client())?;
            let stop_ref = ctx.register_callback(Box::new(move || stop.stop()));
            response.insert("stopWatching".to_string(), to_json(&stop_ref)?);
        }

        let files = ops::read_directory(Path::new(&params.path))?;
        response.insert("files".to_string(), to_json(&files)?);
        Ok(Value::Object(response))
    }
}
