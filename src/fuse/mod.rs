//! FUSE module for OneDrive filesystem implementation

pub mod attributes;
pub mod file_handles;
pub mod filesystem;
pub mod operations;
pub mod utils;

pub use filesystem::OneDriveFuse;
pub use operations::{mount_filesystem, MountConfig};
