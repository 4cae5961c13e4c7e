// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory entry construction
//!
//! Entries are immutable snapshots: stat once, fill every attribute, never
//! mutate. Symlinks are never followed for kind/size/mode/time; their
//! resolved target is attached separately, and a dangling link is reported
//! with `is_broken` rather than as an error.

use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use hostfs_proto::FileEntry;

use crate::error::{FsError, FsResult};

/// Probe accessibility of `path` from the effective process identity.
///
/// AT_EACCESS makes the check use the effective uid/gid; plain access(2)
/// would test against the real identity.
fn access(path: &Path, mode: libc::c_int) -> bool {
    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: cpath is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::faccessat(libc::AT_FDCWD, cpath.as_ptr(), mode, libc::AT_EACCESS) == 0 }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Stat `path` and build its entry snapshot.
pub fn stat_entry(path: &Path) -> FsResult<FileEntry> {
    let meta = path.symlink_metadata().map_err(FsError::classify)?;

    let mut entry = FileEntry {
        name: base_name(path),
        full_path: path.to_string_lossy().into_owned(),
        is_dir: meta.is_dir(),
        size: meta.len(),
        mode: meta.mode(),
        time: meta.mtime(),
        is_broken: false,
        readable: access(path, libc::R_OK),
        writable: access(path, libc::W_OK),
        target: None,
    };

    if meta.file_type().is_symlink() {
        match fs::canonicalize(path) {
            Ok(target) => entry.target = Some(target.to_string_lossy().into_owned()),
            Err(_) => entry.is_broken = true,
        }
    }

    Ok(entry)
}

/// Build the synthetic entry used in `removed` change events.
///
/// The file no longer exists to stat, so only its identity survives.
pub fn removed_entry(name: &str, full_path: &Path) -> FileEntry {
    FileEntry {
        name: name.to_string(),
        full_path: full_path.to_string_lossy().into_owned(),
        is_dir: false,
        size: 0,
        mode: 0,
        time: 0,
        is_broken: false,
        readable: false,
        writable: false,
        target: None,
    }
}
