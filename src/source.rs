// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use enum_dispatch::enum_dispatch;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// File extension for directory-backed streams
const STREAM_EXTENSION: &str = "tngl";

/// Produces named, append-capable byte streams backing one logical tangle.
///
/// Streams returned for different names are independent: they have distinct
/// positions and distinct lengths, and survive across reopens.
#[enum_dispatch]
pub trait StorageSource {
    /// Opens (creating if missing) the stream with the given name.
    fn open_stream(&self, name: &str) -> io::Result<File>;
}

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Stores one file per stream under a directory.
///
/// The directory is created on first use.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    path: PathBuf,
}

impl DirectorySource {
    /// Creates a source rooted at the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().into(),
        }
    }

    /// Returns the directory all streams live in.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageSource for DirectorySource {
    fn open_stream(&self, name: &str) -> io::Result<File> {
        std::fs::create_dir_all(&self.path)?;

        let mut path = self.path.join(name);
        path.set_extension(STREAM_EXTENSION);
        open_rw(&path)
    }
}

/// Stores streams as sibling files next to a host file path.
///
/// A stream named `keys` for host `db` becomes `db.keys`. This is the
/// portable counterpart of stashing streams in a file's side channels
/// (e.g. NTFS alternate data streams).
#[derive(Clone, Debug)]
pub struct SidecarSource {
    host: PathBuf,
}

impl SidecarSource {
    /// Creates a source attached to the given host file path.
    pub fn new<P: AsRef<Path>>(host: P) -> Self {
        Self {
            host: host.as_ref().into(),
        }
    }
}

impl StorageSource for SidecarSource {
    fn open_stream(&self, name: &str) -> io::Result<File> {
        if let Some(parent) = self.host.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file_name = self.host.file_name().map_or_else(
            || std::ffi::OsString::from("tangle"),
            std::ffi::OsStr::to_os_string,
        );
        file_name.push(".");
        file_name.push(name);

        open_rw(&self.host.with_file_name(file_name))
    }
}

/// May be a [`DirectorySource`] or a [`SidecarSource`]
#[derive(Clone, Debug)]
#[enum_dispatch(StorageSource)]
pub enum AnySource {
    /// One file per stream under a directory, see [`DirectorySource`]
    Directory(DirectorySource),

    /// Sibling files next to a host file, see [`SidecarSource`]
    Sidecar(SidecarSource),
}
