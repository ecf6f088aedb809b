//! File handle management for FUSE filesystem

use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// What an open handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Directory,
    File { writable: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFileHandle {
    pub ino: u64,
    pub kind: HandleKind,
}

impl OpenFileHandle {
    pub fn is_writable(&self) -> bool {
        matches!(self.kind, HandleKind::File { writable: true })
    }
}

/// Table of open file and directory handles
pub struct FileHandleManager {
    open_handles: Mutex<HashMap<u64, OpenFileHandle>>,
    next_handle_id: AtomicU64,
}

impl Default for FileHandleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandleManager {
    pub fn new() -> Self {
        Self {
            open_handles: Mutex::new(HashMap::new()),
            next_handle_id: AtomicU64::new(1),
        }
    }

    fn insert(&self, handle: OpenFileHandle) -> u64 {
        let fh = self.next_handle_id.fetch_add(1, Ordering::SeqCst);
        self.open_handles.lock().unwrap().insert(fh, handle);
        debug!("📂 Opened handle {} for inode {} ({:?})", fh, handle.ino, handle.kind);
        fh
    }

    pub fn open_file(&self, ino: u64, writable: bool) -> u64 {
        self.insert(OpenFileHandle {
            ino,
            kind: HandleKind::File { writable },
        })
    }

    pub fn open_dir(&self, ino: u64) -> u64 {
        self.insert(OpenFileHandle {
            ino,
            kind: HandleKind::Directory,
        })
    }

    pub fn get(&self, fh: u64) -> Option<OpenFileHandle> {
        self.open_handles.lock().unwrap().get(&fh).copied()
    }

    pub fn close(&self, fh: u64) -> Option<OpenFileHandle> {
        let handle = self.open_handles.lock().unwrap().remove(&fh);
        if let Some(handle) = &handle {
            debug!("📂 Closed handle {} for inode {}", fh, handle.ino);
        }
        handle
    }

    /// Drop every handle still pointing at a removed inode
    pub fn cleanup_handles_for_inode(&self, ino: u64) {
        self.open_handles
            .lock()
            .unwrap()
            .retain(|_, handle| handle.ino != ino);
    }

    pub fn open_count(&self) -> usize {
        self.open_handles.lock().unwrap().len()
    }
}
