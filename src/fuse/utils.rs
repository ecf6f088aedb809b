//! Utility functions for FUSE filesystem implementation

use tokio::runtime::Handle;

/// Paths desktop environments look up on every new mount
const IGNORED_PATHS: &[&str] = &[
    "/BDMV",
    "/.Trash",
    "/.Trash-1000",
    "/.xdg-volume-info",
    "/autorun.inf",
    "/.localized",
    "/.DS_Store",
    "/._.",
    "/.hidden",
];

/// True for paths that never exist remotely and must not cost a request
pub fn ignore(path: &str) -> bool {
    IGNORED_PATHS.contains(&path)
}

/// Absolute form of a kernel-supplied path
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Drive a future to completion from a FUSE worker thread.
/// The caller must not be a runtime thread.
pub fn sync_await<F, T>(runtime: &Handle, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    runtime.block_on(future)
}

/// uid and gid of the process that mounted the drive
pub fn mount_owner() -> (u32, u32) {
    // getuid/getgid cannot fail and touch no memory
    unsafe { (libc::getuid(), libc::getgid()) }
}
