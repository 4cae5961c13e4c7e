// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for HostFS Core

use std::io;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("{0}")]
    BadArguments(String),
    #[error("no such file or directory")]
    NotFound,
    #[error("file already exists")]
    AlreadyExists,
    #[error("permission denied")]
    PermissionDenied,
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("cross-device rename")]
    CrossDevice,
    #[error("bad pattern: {0}")]
    BadPattern(String),
    #[error("watch failed: {0}")]
    WatchFailed(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Classify an OS error into a structured kind.
    ///
    /// Stable `ErrorKind`s cover the common cases; the rest are matched on
    /// raw errno so the mapping does not depend on newer std variants.
    pub fn classify(err: io::Error) -> FsError {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            _ => match err.raw_os_error() {
                Some(libc::EISDIR) => FsError::IsADirectory,
                Some(libc::ENOTDIR) => FsError::NotADirectory,
                Some(libc::ENOTEMPTY) => FsError::DirectoryNotEmpty,
                Some(libc::EXDEV) => FsError::CrossDevice,
                _ => FsError::Io(err),
            },
        }
    }
}
