// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Schema validation for HostFS parameter records

use crate::messages::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Validation error
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("arguments are not passed")]
    MissingArguments,
    #[error("{0}")]
    Schema(&'static str),
}

/// A typed parameter record tied to its human-readable schema string.
///
/// The schema string is what callers see when decoding fails or a required
/// field is missing, e.g. `{ path: [string] }`.
pub trait OperationParams: DeserializeOwned {
    const SCHEMA: &'static str;

    /// Required-field check beyond what deserialization enforces.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Decode the first positional argument of a request into `T`.
pub fn decode_params<T: OperationParams>(params: &[Value]) -> Result<T, ValidationError> {
    let first = params.first().ok_or(ValidationError::MissingArguments)?;
    let decoded: T =
        serde_json::from_value(first.clone()).map_err(|_| ValidationError::Schema(T::SCHEMA))?;
    decoded.validate()?;
    Ok(decoded)
}

fn require(present: bool, schema: &'static str) -> Result<(), ValidationError> {
    if present {
        Ok(())
    } else {
        Err(ValidationError::Schema(schema))
    }
}

impl OperationParams for ReadDirectoryParams {
    const SCHEMA: &'static str = "{ path: [string], onChange: [function]}";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for GlobParams {
    const SCHEMA: &'static str = "{ pattern: [string] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.pattern.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for ReadFileParams {
    const SCHEMA: &'static str = "{ path: [string] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for WriteFileParams {
    const SCHEMA: &'static str = "{ path: [string] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for UniquePathParams {
    const SCHEMA: &'static str = "{ path: [string] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for GetInfoParams {
    const SCHEMA: &'static str = "{ path: [string] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for SetPermissionsParams {
    const SCHEMA: &'static str = "{ path: [string], mode: [integer], recursive: [bool] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for RemoveParams {
    const SCHEMA: &'static str = "{ path: [string], recursive: [bool] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for RenameParams {
    const SCHEMA: &'static str = "{ oldPath: [string], newPath: [string] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.old_path.is_empty() && !self.new_path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for CreateDirectoryParams {
    const SCHEMA: &'static str = "{ path: [string], recursive: [bool] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.path.is_empty(), Self::SCHEMA)
    }
}

impl OperationParams for CopyParams {
    const SCHEMA: &'static str = "{ srcPath: [string], dstPath: [string] }";

    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.src_path.is_empty() && !self.dst_path.is_empty(), Self::SCHEMA)
    }
}
