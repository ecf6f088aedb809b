//! A single cached file or folder

use crate::error::{FsError, FsResult};
use crate::onedrive_service::onedrive_models::{DriveItem, FileFacet, FolderFacet};
use crate::onedrive_service::path_utils::{strip_drive_root, to_api_path};
use chrono::DateTime;
use std::sync::OnceLock;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

/// Inode number of the drive root
pub const ROOT_INO: u64 = 1;

/// Size reported for folders; the API reports 0
pub const FAKE_DIR_SIZE: u64 = 4096;

pub const DIR_MODE: u32 = libc::S_IFDIR as u32 | 0o755;
pub const FILE_MODE: u32 = libc::S_IFREG as u32 | 0o644;

/// Largest buffer a single-request upload can send
pub const MAX_BUFFER_SIZE: u64 = 250 * 1024 * 1024;

/// Whether cached data came from the remote, and when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Unfetched,
    Fetched { at: Instant },
}

impl CacheState {
    pub fn fetched_now() -> Self {
        CacheState::Fetched { at: Instant::now() }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, CacheState::Fetched { .. })
    }

    /// Fetched, and younger than `ttl` when one is set
    pub fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        match (self, ttl) {
            (CacheState::Unfetched, _) => false,
            (CacheState::Fetched { .. }, None) => true,
            (CacheState::Fetched { at }, Some(ttl)) => at.elapsed() < ttl,
        }
    }
}

/// Upload state of an item's buffered content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Clean,
    /// Local changes waiting for a flush
    Pending,
    Uploading,
    /// Last upload gave up; the content is still dirty
    Failed(String),
}

/// Non-owning link to the parent: remote ID, API path and arena index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub id: String,
    pub path: String,
    pub ino: u64,
}

/// Entry in a folder's children map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRef {
    pub ino: u64,
    pub is_dir: bool,
}

/// Snapshot of everything an upload needs, taken under the item lock
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub ino: u64,
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub data: Vec<u8>,
    pub revision: u64,
}

#[derive(Debug)]
pub struct Item {
    ino: u64,
    pub id: String,
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
    pub folder: Option<FolderFacet>,
    pub file: Option<FileFacet>,
    mode: OnceLock<u32>,
    parent: Option<ParentLink>,
    children: Option<HashMap<String, ChildRef>>,
    children_state: CacheState,
    content: Vec<u8>,
    content_state: CacheState,
    dirty: bool,
    revision: u64,
    sync_status: SyncStatus,
    upload_in_flight: bool,
    /// Unlinked locally; set before the remote copy exists
    removed: bool,
}

fn parse_modified(value: Option<&str>) -> Option<SystemTime> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(SystemTime::from)
}

impl Item {
    /// Build a clean item from a remote descriptor
    pub fn from_drive_item(ino: u64, drive_item: DriveItem, parent: Option<ParentLink>) -> Self {
        let mut item = Self {
            ino,
            id: String::new(),
            name: String::new(),
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
            folder: None,
            file: None,
            mode: OnceLock::new(),
            parent,
            children: None,
            children_state: CacheState::Unfetched,
            content: Vec::new(),
            content_state: CacheState::Unfetched,
            dirty: false,
            revision: 0,
            sync_status: SyncStatus::Clean,
            upload_in_flight: false,
            removed: false,
        };
        item.apply_remote(drive_item);
        if item.parent.is_none() && item.name.is_empty() {
            item.name = "root".to_string();
        }
        item
    }

    /// Build an item that only exists locally (empty remote ID).
    /// Files start dirty so the first flush creates them remotely.
    pub fn new_local(ino: u64, name: &str, mode: u32, parent: ParentLink) -> Self {
        let is_dir = mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32;
        Self {
            ino,
            id: String::new(),
            name: name.to_string(),
            size: 0,
            modified: SystemTime::now(),
            folder: is_dir.then(FolderFacet::default),
            file: (!is_dir).then(FileFacet::default),
            mode: OnceLock::from(mode),
            parent: Some(parent),
            children: is_dir.then(HashMap::new),
            children_state: CacheState::fetched_now(),
            content: Vec::new(),
            content_state: CacheState::fetched_now(),
            // A new file has to reach the remote even if nothing is written
            dirty: !is_dir,
            revision: if is_dir { 0 } else { 1 },
            sync_status: if is_dir { SyncStatus::Clean } else { SyncStatus::Pending },
            upload_in_flight: false,
            removed: false,
        }
    }

    /// Refresh identity and metadata from a remote response, in place.
    ///
    /// Mode, buffered content and tree links are left alone. Returns true when
    /// the remote content looks different from what was known before.
    pub fn apply_remote(&mut self, drive_item: DriveItem) -> bool {
        let old_size = self.size;
        let old_modified = self.modified;

        if !drive_item.id.is_empty() {
            self.id = drive_item.id;
        }
        if let Some(name) = drive_item.name {
            self.name = name;
        }
        if let Some(modified) = parse_modified(drive_item.last_modified.as_deref()) {
            self.modified = modified;
        }
        if let Some(size) = drive_item.size {
            self.size = size;
        }
        match (drive_item.file, drive_item.folder) {
            (Some(file), _) => {
                self.file = Some(file);
                self.folder = None;
            }
            (None, folder) => {
                self.folder = Some(folder.unwrap_or_default());
                self.file = None;
            }
        }

        self.size != old_size || self.modified != old_modified
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn parent_ino(&self) -> Option<u64> {
        self.parent.as_ref().map(|p| p.ino)
    }

    pub fn is_local_only(&self) -> bool {
        self.id.is_empty()
    }

    /// Absolute mount path, derived from the parent's path and this name
    pub fn path(&self) -> String {
        match &self.parent {
            None => "/".to_string(),
            Some(parent) => format!("{}/{}", strip_drive_root(&parent.path), self.name),
        }
    }

    /// API-rooted path, as children see it in their parent reference
    pub fn api_path(&self) -> String {
        to_api_path(&self.path())
    }

    /// Link a child should store to reach this item
    pub fn child_link(&self) -> ParentLink {
        ParentLink {
            id: self.id.clone(),
            path: self.api_path(),
            ino: self.ino,
        }
    }

    /// POSIX mode, synthesized from the facets on first use
    pub fn mode(&self) -> u32 {
        *self.mode.get_or_init(|| {
            if self.file.is_none() {
                DIR_MODE
            } else {
                FILE_MODE
            }
        })
    }

    pub fn is_dir(&self) -> bool {
        self.mode() & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }

    pub fn fake_size(&self) -> u64 {
        if self.is_dir() {
            FAKE_DIR_SIZE
        } else {
            self.size
        }
    }

    /// 2 + subdirectories for folders, 1 for files. Unfetched children count as none.
    pub fn nlink(&self) -> u32 {
        if !self.is_dir() {
            return 1;
        }
        let subdirs = self
            .children
            .as_ref()
            .map(|children| children.values().filter(|c| c.is_dir).count())
            .unwrap_or(0);
        2 + subdirs as u32
    }

    pub fn mtime(&self) -> SystemTime {
        self.modified
    }

    /// Utimens: local only, does not dirty the content
    pub fn set_modified(&mut self, modified: SystemTime) {
        self.modified = modified;
    }

    pub fn children(&self) -> Option<&HashMap<String, ChildRef>> {
        self.children.as_ref()
    }

    pub fn children_state(&self) -> CacheState {
        self.children_state
    }

    pub fn children_fresh(&self, ttl: Option<Duration>) -> bool {
        self.children.is_some() && self.children_state.is_fresh(ttl)
    }

    pub fn child(&self, name: &str) -> Option<ChildRef> {
        self.children.as_ref().and_then(|c| c.get(name).copied())
    }

    /// Replace the children map with a complete listing
    pub fn set_children(&mut self, children: HashMap<String, ChildRef>) {
        self.children = Some(children);
        self.children_state = CacheState::fetched_now();
    }

    pub fn take_children(&mut self) -> HashMap<String, ChildRef> {
        self.children.take().unwrap_or_default()
    }

    /// Register a child in an already filled map; a no-op while unfetched
    pub fn insert_child(&mut self, name: &str, child: ChildRef) {
        if let Some(children) = self.children.as_mut() {
            children.insert(name.to_string(), child);
        }
    }

    pub fn remove_child(&mut self, name: &str) -> Option<ChildRef> {
        self.children.as_mut().and_then(|c| c.remove(name))
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_state(&self) -> CacheState {
        self.content_state
    }

    /// Replace the buffer with freshly downloaded content.
    ///
    /// Refuses to discard local changes that were not uploaded yet.
    pub fn set_fetched_content(&mut self, data: Vec<u8>) -> FsResult<()> {
        if self.dirty {
            return Err(FsError::UnflushedChanges(self.path()));
        }
        self.size = data.len() as u64;
        self.content = data;
        self.content_state = CacheState::fetched_now();
        Ok(())
    }

    /// Forget downloaded content so the next open fetches it again
    pub fn invalidate_content(&mut self) {
        if !self.dirty {
            self.content.clear();
            self.content_state = CacheState::Unfetched;
        }
    }

    /// Bytes at `offset`, clipped to the buffer
    pub fn read(&self, offset: u64, size: usize) -> &[u8] {
        let len = self.content.len();
        let start = (offset as usize).min(len);
        let end = start.saturating_add(size).min(len);
        &self.content[start..end]
    }

    /// Write into the buffer, growing it as needed. Purely local.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> FsResult<usize> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| FsError::FileTooLarge(self.path()))?;
        self.check_buffer_size(end)?;
        let (start, end) = (offset as usize, end as usize);
        if end > self.content.len() {
            self.content.resize(end, 0);
        }
        self.content[start..end].copy_from_slice(data);
        self.size = self.content.len() as u64;
        self.mark_dirty();
        Ok(data.len())
    }

    /// Cut or zero-extend the buffer to `size` bytes
    pub fn truncate(&mut self, size: u64) -> FsResult<()> {
        self.check_buffer_size(size)?;
        self.content.resize(size as usize, 0);
        self.size = size;
        self.mark_dirty();
        Ok(())
    }

    /// Refuse buffers that could never be uploaded
    pub fn check_buffer_size(&self, size: u64) -> FsResult<()> {
        if size > MAX_BUFFER_SIZE {
            return Err(FsError::FileTooLarge(self.path()));
        }
        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
        self.modified = SystemTime::now();
        if !self.upload_in_flight {
            self.sync_status = SyncStatus::Pending;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    pub fn upload_in_flight(&self) -> bool {
        self.upload_in_flight
    }

    /// Flush bookkeeping: true when the caller must start an upload task.
    /// While one is in flight it picks up newer writes on its own.
    pub fn request_upload(&mut self) -> bool {
        if !self.dirty || self.upload_in_flight {
            return false;
        }
        self.upload_in_flight = true;
        self.sync_status = SyncStatus::Uploading;
        true
    }

    /// Snapshot the buffer for an upload; None once nothing is left to send
    pub fn prepare_upload(&mut self) -> Option<UploadJob> {
        if self.removed {
            self.upload_in_flight = false;
            return None;
        }
        if !self.dirty {
            self.upload_in_flight = false;
            self.sync_status = SyncStatus::Clean;
            return None;
        }
        self.upload_in_flight = true;
        self.sync_status = SyncStatus::Uploading;
        Some(UploadJob {
            ino: self.ino,
            id: self.id.clone(),
            parent_id: self.parent.as_ref().map(|p| p.id.clone()).unwrap_or_default(),
            name: self.name.clone(),
            data: self.content.clone(),
            revision: self.revision,
        })
    }

    /// Apply a successful upload response. Returns true if another upload
    /// must follow because the buffer changed while this one ran.
    pub fn complete_upload(&mut self, uploaded_revision: u64, response: DriveItem) -> bool {
        self.apply_remote(response);
        self.size = self.content.len() as u64;
        self.content_state = CacheState::fetched_now();

        if self.revision == uploaded_revision {
            self.dirty = false;
            self.upload_in_flight = false;
            self.sync_status = SyncStatus::Clean;
            return false;
        }
        true
    }

    /// Tombstone for an item removed while an upload may still create it
    pub fn mark_removed(&mut self) {
        self.removed = true;
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Record a failed upload; the buffer stays dirty for the next flush
    pub fn fail_upload(&mut self, reason: String) {
        self.upload_in_flight = false;
        self.sync_status = SyncStatus::Failed(reason);
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.content.len().min(10);
        write!(f, "DriveItem(")?;
        for byte in &self.content[..shown] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
