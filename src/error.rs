//! Error taxonomy shared by every layer of the filesystem.
//!
//! Kinds mirror the upcall-facing errno classes: missing data becomes
//! `ENOENT`, backend trouble becomes `EIO`, anything not implemented becomes
//! `ENOSYS`. The everyday POSIX conflicts a directory operation can hit
//! (name collision, non-empty directory, wrong entry type) get their own
//! kinds rather than being folded into `Invariant`, which is reserved for
//! violations that are genuine programming errors — full segment written
//! to, sealed segment rewritten, indirect tier overflow — and are logged at
//! `error` level since they should never happen in a correct build.

use std::fmt;

/// An error produced anywhere in the log/cache/filesystem stack.
#[derive(Debug)]
pub enum Error {
    /// An imap entry, child name, or backend object was missing.
    NotFound,
    /// The backing object store failed in a way that is not "missing".
    BackendUnavailable(String),
    /// The operation is not implemented (xattrs, etc).
    Unsupported,
    /// `mknod`/`mkdir`/`link` target name already has an entry.
    AlreadyExists,
    /// `rmdir` target has entries other than `.`/`..`.
    NotEmpty,
    /// `rmdir` (or a path component) was used on something other than a
    /// directory.
    NotADirectory,
    /// `unlink` was used on a directory.
    IsADirectory,
    /// A structural invariant was violated (full segment written to, sealed
    /// segment rewritten, indirect tier overflow, ...).
    Invariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::BackendUnavailable(msg) => write!(f, "backend unavailable: {msg}"),
            Self::Unsupported => write!(f, "unsupported operation"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::NotEmpty => write!(f, "directory not empty"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::IsADirectory => write!(f, "is a directory"),
            Self::Invariant(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Maps this error to the errno the FUSE bridge should reply with.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::BackendUnavailable(_) => libc::EIO,
            Self::Unsupported => libc::ENOSYS,
            Self::AlreadyExists => libc::EEXIST,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::Invariant(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
