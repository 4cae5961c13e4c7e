// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Stateless path primitives
//!
//! Every operation takes validated parameters, performs blocking filesystem
//! I/O and returns either a typed result or a structured [`FsError`]. The
//! first error aborts; recursive operations never roll back partial work.

use std::fs::{self, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use hostfs_proto::FileEntry;

use crate::entry::stat_entry;
use crate::error::{FsError, FsResult};

/// Enumerate the immediate children of `path`, hidden entries included.
///
/// The listing is sorted byte-wise ascending by base name so clients can
/// diff successive listings deterministically. Entries that vanish between
/// readdir and lstat are skipped.
pub fn read_directory(path: &Path) -> FsResult<Vec<FileEntry>> {
    let reader = fs::read_dir(path).map_err(FsError::classify)?;

    let mut entries = Vec::new();
    for dirent in reader {
        let dirent = dirent.map_err(FsError::classify)?;
        match stat_entry(&dirent.path()) {
            Ok(entry) => entries.push(entry),
            Err(FsError::NotFound) => continue,
            Err(err) => return Err(err),
        }
    }

    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    Ok(entries)
}

/// Read the entire content of a regular file.
pub fn read_file(path: &Path) -> FsResult<Vec<u8>> {
    fs::read(path).map_err(FsError::classify)
}

/// Write `content` to `path` and return the number of bytes written.
///
/// | doNotOverwrite | append | behavior                 |
/// |----------------|--------|--------------------------|
/// | false          | false  | truncate-or-create       |
/// | true           | false  | create-exclusive         |
/// | *              | true   | open-or-create, append   |
///
/// `append` dominates `do_not_overwrite`: appending never fails on existence.
pub fn write_file(
    path: &Path,
    content: &[u8],
    do_not_overwrite: bool,
    append: bool,
) -> FsResult<usize> {
    let mut options = OpenOptions::new();
    options.write(true);
    if append {
        options.create(true).append(true);
    } else if do_not_overwrite {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }

    let mut file = options.open(path).map_err(FsError::classify)?;
    file.write_all(content).map_err(FsError::classify)?;
    Ok(content.len())
}

fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Extension is the substring from the last `.` in the base name; empty when
/// the name has no `.` or begins with one.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Return `path` if nothing exists there, otherwise the first free path of
/// the form `<stem>_<n><ext>` with n counting up from 1.
///
/// Advisory only: a subsequent create may still race with another writer.
pub fn unique_path(path: &Path) -> FsResult<PathBuf> {
    if !occupied(path) {
        return Ok(path.to_path_buf());
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FsError::BadArguments("path has no file name".to_string()))?;
    let (stem, ext) = split_extension(&name);
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut n = 1u64;
    loop {
        let candidate = parent.join(format!("{stem}_{n}{ext}"));
        if !occupied(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Stat a single path, same attributes as a listing entry.
pub fn get_info(path: &Path) -> FsResult<FileEntry> {
    stat_entry(path)
}

fn chmod_tree(path: &Path, mode: u32) -> FsResult<()> {
    let meta = path.symlink_metadata().map_err(FsError::classify)?;
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(FsError::classify)?;
    if meta.is_dir() {
        for dirent in fs::read_dir(path).map_err(FsError::classify)? {
            let dirent = dirent.map_err(FsError::classify)?;
            chmod_tree(&dirent.path(), mode)?;
        }
    }
    Ok(())
}

/// Set mode bits on `path`, or on every entry of the subtree when recursive.
///
/// The walk is depth-first; the first error aborts it and partial mutation
/// is left in place.
pub fn set_permissions(path: &Path, mode: u32, recursive: bool) -> FsResult<()> {
    if recursive {
        chmod_tree(path, mode)
    } else {
        fs::set_permissions(path, Permissions::from_mode(mode)).map_err(FsError::classify)
    }
}

/// Remove an entry. Symlinks are removed without following.
///
/// Non-recursive removal of a non-empty directory fails *directory-not-empty*.
pub fn remove(path: &Path, recursive: bool) -> FsResult<()> {
    let meta = path.symlink_metadata().map_err(FsError::classify)?;

    let result = if meta.is_dir() {
        if recursive {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        }
    } else {
        fs::remove_file(path)
    };
    result.map_err(FsError::classify)
}

/// Rename `old` to `new`. Atomic on a single filesystem; *cross-device*
/// otherwise — no copy-then-delete fallback.
pub fn rename(old: &Path, new: &Path) -> FsResult<()> {
    fs::rename(old, new).map_err(FsError::classify)
}

/// Create a directory. Recursive creation makes all missing parents and
/// succeeds when the final directory already exists.
pub fn create_directory(path: &Path, recursive: bool) -> FsResult<()> {
    let result = if recursive {
        fs::create_dir_all(path)
    } else {
        fs::create_dir(path)
    };
    result.map_err(FsError::classify)
}

fn clear_destination(dst: &Path) -> FsResult<()> {
    match dst.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dst).map_err(FsError::classify),
        Ok(_) => fs::remove_file(dst).map_err(FsError::classify),
        Err(_) => Ok(()),
    }
}

/// Recursively copy `src` to `dst`, overwriting existing destination entries.
///
/// Regular files keep content and mode, directories are recreated with the
/// source mode, symlinks are duplicated as links (the referent is not
/// copied). A failure part-way through leaves the partial copy in place.
pub fn copy(src: &Path, dst: &Path) -> FsResult<()> {
    let meta = src.symlink_metadata().map_err(FsError::classify)?;
    let file_type = meta.file_type();

    if file_type.is_symlink() {
        let target = fs::read_link(src).map_err(FsError::classify)?;
        clear_destination(dst)?;
        symlink(&target, dst).map_err(FsError::classify)?;
    } else if file_type.is_dir() {
        match dst.symlink_metadata() {
            Ok(existing) if existing.is_dir() => {}
            Ok(_) => {
                fs::remove_file(dst).map_err(FsError::classify)?;
                fs::create_dir(dst).map_err(FsError::classify)?;
            }
            Err(_) => fs::create_dir(dst).map_err(FsError::classify)?,
        }
        fs::set_permissions(dst, meta.permissions()).map_err(FsError::classify)?;
        for dirent in fs::read_dir(src).map_err(FsError::classify)? {
            let dirent = dirent.map_err(FsError::classify)?;
            copy(&dirent.path(), &dst.join(dirent.file_name()))?;
        }
    } else {
        if let Ok(existing) = dst.symlink_metadata() {
            if existing.is_dir() {
                fs::remove_dir_all(dst).map_err(FsError::classify)?;
            }
        }
        fs::copy(src, dst).map_err(FsError::classify)?;
    }

    Ok(())
}

/// Expand a shell-style pattern (`*`, `?`, `[...]`, `\` escape; no `**`
/// recursion) into the sorted list of matching paths.
///
/// `*` and `?` never cross a path separator. Directories that cannot be read
/// during expansion are skipped rather than failing the whole call.
pub fn glob(pattern: &str) -> FsResult<Vec<String>> {
    let options = ::glob::MatchOptions {
        require_literal_separator: true,
        ..Default::default()
    };
    let paths =
        ::glob::glob_with(pattern, options).map_err(|e| FsError::BadPattern(e.to_string()))?;

    let mut matches = Vec::new();
    for path in paths {
        match path {
            Ok(p) => matches.push(p.to_string_lossy().into_owned()),
            Err(_) => continue,
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, bytes: &[u8]) {
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn write_then_read_roundtrip_and_exclusive_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");

        let written = write_file(&path, &[1, 2, 3], false, false).unwrap();
        assert_eq!(written, 3);
        assert_eq!(read_file(&path).unwrap(), vec![1, 2, 3]);

        let err = write_file(&path, &[4], true, false).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists));
        assert_eq!(read_file(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn append_dominates_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");

        write_file(&path, &[1], false, false).unwrap();
        write_file(&path, &[2], true, true).unwrap();
        assert_eq!(read_file(&path).unwrap(), vec![1, 2]);

        // append also creates when nothing exists yet
        let fresh = dir.path().join("fresh");
        write_file(&fresh, &[9], true, true).unwrap();
        assert_eq!(read_file(&fresh).unwrap(), vec![9]);
    }

    #[test]
    fn truncate_or_create_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        write_file(&path, &[1, 2, 3], false, false).unwrap();
        write_file(&path, &[7], false, false).unwrap();
        assert_eq!(read_file(&path).unwrap(), vec![7]);
    }

    #[test]
    fn read_file_errors_are_structured() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read_file(&dir.path().join("nope")).unwrap_err(), FsError::NotFound));
        assert!(matches!(read_file(dir.path()).unwrap_err(), FsError::IsADirectory));
    }

    #[test]
    fn listing_is_sorted_byte_wise_and_includes_hidden() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", ".hidden", "Alpha", "beta"] {
            write(&dir.path().join(name), b"");
        }

        let names: Vec<String> =
            read_directory(dir.path()).unwrap().into_iter().map(|e| e.name).collect();
        // byte-wise: '.' < uppercase < lowercase
        assert_eq!(names, [".hidden", "Alpha", "beta", "zeta"]);
    }

    #[test]
    fn listing_reports_broken_symlinks_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("link")).unwrap();

        let entries = read_directory(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_broken);
        assert!(entries[0].target.is_none());
    }

    #[test]
    fn unique_path_returns_input_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        assert_eq!(unique_path(&path).unwrap(), path);
        // repeated calls without creating the result are stable
        assert_eq!(unique_path(&path).unwrap(), path);
    }

    #[test]
    fn unique_path_counts_past_existing_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("report.txt"), b"");
        write(&dir.path().join("report_1.txt"), b"");

        let next = unique_path(&dir.path().join("report.txt")).unwrap();
        assert_eq!(next, dir.path().join("report_2.txt"));
        // advisory: nothing was created
        assert_eq!(unique_path(&dir.path().join("report.txt")).unwrap(), next);
    }

    #[test]
    fn unique_path_extension_rules() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("noext"), b"");
        assert_eq!(unique_path(&dir.path().join("noext")).unwrap(), dir.path().join("noext_1"));

        write(&dir.path().join(".bashrc"), b"");
        assert_eq!(
            unique_path(&dir.path().join(".bashrc")).unwrap(),
            dir.path().join(".bashrc_1")
        );

        write(&dir.path().join("archive.tar.gz"), b"");
        assert_eq!(
            unique_path(&dir.path().join("archive.tar.gz")).unwrap(),
            dir.path().join("archive.tar_1.gz")
        );
    }

    #[test]
    fn create_directory_recursive_builds_all_parents() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c");

        create_directory(&deep, true).unwrap();
        assert!(dir.path().join("a").is_dir());
        assert!(dir.path().join("a/b").is_dir());
        assert!(deep.is_dir());

        // repeat succeeds when the final directory already exists
        create_directory(&deep, true).unwrap();

        let err = create_directory(&deep, false).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists));
    }

    #[test]
    fn remove_non_recursive_refuses_non_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write(&sub.join("f"), b"x");

        let err = remove(&sub, false).unwrap_err();
        assert!(matches!(err, FsError::DirectoryNotEmpty));

        remove(&sub, true).unwrap();
        assert!(!sub.exists());
    }

    #[test]
    fn remove_deletes_symlink_without_following() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        write(&target, b"keep");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        remove(&link, false).unwrap();
        assert!(link.symlink_metadata().is_err());
        assert!(target.exists());
    }

    #[test]
    fn rename_moves_within_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old");
        write(&old, b"x");

        rename(&old, &dir.path().join("new")).unwrap();
        assert!(!old.exists());
        assert_eq!(read_file(&dir.path().join("new")).unwrap(), b"x");

        assert!(matches!(
            rename(&dir.path().join("gone"), &dir.path().join("anywhere")).unwrap_err(),
            FsError::NotFound
        ));
    }

    #[test]
    fn set_permissions_recursive_applies_to_children() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let file = sub.join("f");
        write(&file, b"x");

        set_permissions(dir.path(), 0o750, true).unwrap();
        assert_eq!(sub.metadata().unwrap().permissions().mode() & 0o7777, 0o750);
        assert_eq!(file.metadata().unwrap().permissions().mode() & 0o7777, 0o750);

        set_permissions(&file, 0o644, false).unwrap();
        assert_eq!(file.metadata().unwrap().permissions().mode() & 0o7777, 0o644);
        assert_eq!(sub.metadata().unwrap().permissions().mode() & 0o7777, 0o750);
    }

    #[test]
    fn copy_preserves_content_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        let f = src.join("f");
        write(&f, &[9]);
        fs::set_permissions(&f, Permissions::from_mode(0o700)).unwrap();

        let dst = dir.path().join("dst");
        copy(&src, &dst).unwrap();

        assert_eq!(read_file(&dst.join("f")).unwrap(), vec![9]);
        assert_eq!(dst.join("f").metadata().unwrap().permissions().mode() & 0o7777, 0o700);
        assert!(dst.is_dir());
    }

    #[test]
    fn copy_duplicates_symlinks_as_links() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        write(&src.join("real"), b"data");
        std::os::unix::fs::symlink("real", src.join("link")).unwrap();

        let dst = dir.path().join("dst");
        copy(&src, &dst).unwrap();

        let meta = dst.join("link").symlink_metadata().unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_link(dst.join("link")).unwrap(), PathBuf::from("real"));
    }

    #[test]
    fn copy_overwrites_existing_destination_entries() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        write(&src.join("f"), b"new");

        let dst = dir.path().join("dst");
        fs::create_dir(&dst).unwrap();
        write(&dst.join("f"), b"old-longer-content");

        copy(&src, &dst).unwrap();
        assert_eq!(read_file(&dst.join("f")).unwrap(), b"new");
    }

    #[test]
    fn glob_matches_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.rs", "b.rs", "c.txt"] {
            write(&dir.path().join(name), b"");
        }

        let pattern = format!("{}/*.rs", dir.path().display());
        let first = glob(&pattern).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0].ends_with("a.rs"));
        assert!(first[1].ends_with("b.rs"));

        assert_eq!(glob(&pattern).unwrap(), first);
    }

    #[test]
    fn glob_wildcards_do_not_cross_separators() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write(&sub.join("deep.rs"), b"");
        write(&dir.path().join("top.rs"), b"");

        let matches = glob(&format!("{}/*.rs", dir.path().display())).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("top.rs"));
    }

    #[test]
    fn glob_rejects_malformed_patterns() {
        let err = glob("/tmp/[unclosed").unwrap_err();
        assert!(matches!(err, FsError::BadPattern(_)));
    }
}
