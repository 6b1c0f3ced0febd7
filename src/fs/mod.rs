//! Contains the structs and traits that define a storage backend.
//!
//! The request core only needs a handful of capabilities from storage:
//! look up a resource, list a collection, read, write, create and delete.
//! You only need this if you are going to implement your own backend;
//! [`LocalFs`](localfs::LocalFs) and [`MemFs`](memfs::MemFs) are included.
use std::fmt::Debug;
use std::io;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::{future::BoxFuture, stream::BoxStream};

use crate::davpath::DavPath;

#[cfg(any(docsrs, feature = "localfs"))]
pub mod localfs;
#[cfg(any(docsrs, feature = "memfs"))]
pub mod memfs;

/// Errors generated by a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
    /// Parent collection missing.
    Conflict,
}

/// The Result type.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Future returned by almost all of the storage trait methods.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;
/// Convenience alias for a boxed Stream.
pub type FsStream<T> = BoxStream<'static, T>;

/// Storage backend.
///
/// Paths are always absolute and normalized; a trailing slash on a
/// path is a hint that a collection is meant, backends must resolve
/// `/a` and `/a/` to the same entry.
pub trait DavFileSystem: Send + Sync {
    /// Look up a resource. `FsError::NotFound` if it does not exist.
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>>;

    /// List the direct children of a collection.
    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>>;

    /// Open a file for reading or writing. With `create` set and a
    /// missing parent collection, backends return `FsError::Conflict`
    /// or `FsError::NotFound`.
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>>;

    /// Create a collection.
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Remove an empty collection.
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Remove a file.
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;
}

/// One entry in a collection listing.
pub trait DavDirEntry: Send + Sync {
    /// Name of the entry, not percent-encoded.
    fn name(&self) -> Vec<u8>;

    /// Metadata of the entry.
    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>>;
}

/// An open file.
pub trait DavFile: Debug + Send + Sync {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>>;
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()>;
    /// Read at most `count` bytes. An empty result means end of file.
    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes>;
    fn flush(&mut self) -> FsFuture<'_, ()>;
}

/// Resource metadata.
pub trait DavMetaData: Debug + Send + Sync {
    /// Size of the data in bytes.
    fn len(&self) -> u64;
    /// Modification date.
    fn modified(&self) -> FsResult<SystemTime>;
    /// Is it a collection.
    fn is_dir(&self) -> bool;

    /// Creation date, if the backend knows it.
    fn created(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }

    /// Is it a plain file.
    fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Entity tag. By default derived from modification time and length.
    fn etag(&self) -> Option<String> {
        let modified = self.modified().ok()?;
        let t = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
        let t = t.as_secs() * 1000000 + t.subsec_nanos() as u64 / 1000;
        if self.is_file() {
            Some(format!("{:x}-{:x}", self.len(), t))
        } else {
            Some(format!("{t:x}"))
        }
    }

    /// Is the metadata empty (zero-length file).
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// OpenOptions for `open()`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OpenOptions {
    /// open for reading
    pub read: bool,
    /// open for writing
    pub write: bool,
    /// truncate file first when writing
    pub truncate: bool,
    /// create file if it doesn't exist
    pub create: bool,
}

impl OpenOptions {
    pub(crate) fn read() -> OpenOptions {
        OpenOptions {
            read: true,
            ..OpenOptions::default()
        }
    }

    pub(crate) fn write() -> OpenOptions {
        OpenOptions {
            write: true,
            truncate: true,
            create: true,
            ..OpenOptions::default()
        }
    }
}

impl std::error::Error for FsError {}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&io::Error> for FsError {
    fn from(e: &io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => FsError::NotFound,
            ErrorKind::PermissionDenied => FsError::Forbidden,
            ErrorKind::AlreadyExists => FsError::Exists,
            ErrorKind::Unsupported => FsError::NotImplemented,
            _ => FsError::GeneralFailure,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        (&e).into()
    }
}
