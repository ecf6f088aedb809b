//! Errors surfaced to the kernel

use libc::c_int;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("operation not permitted: {0}")]
    PermissionDenied(String),

    #[error("item has local changes that are not uploaded yet: {0}")]
    UnflushedChanges(String),

    #[error("file too large: {0}")]
    FileTooLarge(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("remote request failed: {0:#}")]
    Remote(#[from] anyhow::Error),
}

impl FsError {
    /// Status code handed back to the kernel
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::PermissionDenied(_) => libc::EPERM,
            FsError::UnflushedChanges(_) => libc::EBUSY,
            FsError::FileTooLarge(_) => libc::EFBIG,
            FsError::InvalidName(_) => libc::EINVAL,
            FsError::Remote(_) => libc::EREMOTEIO,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;
