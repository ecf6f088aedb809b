//! OneDrive as a FUSE filesystem
//!
//! The drive is cached in memory as a tree of items. Directory listings and
//! file content are fetched on first use; writes stay in memory until the file
//! is closed, then upload in the background.

pub mod auth;
pub mod config;
pub mod error;
pub mod fuse;
pub mod log_appender;
pub mod onedrive_service;
pub mod tree;

pub use error::{FsError, FsResult};
