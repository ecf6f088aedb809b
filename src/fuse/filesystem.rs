//! Main FUSE filesystem implementation
//!
//! `OneDriveFuse` works on absolute paths; the `fuser::Filesystem` impl in
//! `operations` maps inode-based kernel calls onto it.

use crate::error::{FsError, FsResult};
use crate::fuse::attributes::AttributeManager;
use crate::fuse::file_handles::FileHandleManager;
use crate::fuse::utils::{ignore, mount_owner, normalize_path};
use crate::onedrive_service::path_utils::split_parent;
use crate::tree::DriveTree;
use fuser::{FileAttr, FileType};
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// One readdir entry: name plus the mode-derived kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub name: String,
    pub kind: FileType,
}

/// OneDrive FUSE filesystem backed by the in-memory drive tree
pub struct OneDriveFuse {
    tree: Arc<DriveTree>,
    file_handle_manager: FileHandleManager,
    runtime: Handle,
    attr_ttl: Duration,
    uid: u32,
    gid: u32,
}

impl OneDriveFuse {
    pub fn new(tree: Arc<DriveTree>, runtime: Handle, attr_ttl: Duration) -> Self {
        // Remote storage has no owners; everything belongs to whoever mounted it
        let (uid, gid) = mount_owner();
        Self {
            tree,
            file_handle_manager: FileHandleManager::new(),
            runtime,
            attr_ttl,
            uid,
            gid,
        }
    }

    pub fn tree(&self) -> &Arc<DriveTree> {
        &self.tree
    }

    pub fn file_handles(&self) -> &FileHandleManager {
        &self.file_handle_manager
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn attr_ttl(&self) -> Duration {
        self.attr_ttl
    }

    /// Resolve a path to an inode; any lookup failure reads as "no such entry"
    async fn resolve(&self, path: &str) -> FsResult<u64> {
        if ignore(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        self.tree.get_item(path).await.map_err(|e| match e {
            FsError::Remote(e) => {
                warn!("Lookup of {} failed: {:#}", path, e);
                FsError::NotFound(path.to_string())
            }
            other => other,
        })
    }

    /// Split a path for creation and resolve the parent directory
    async fn resolve_parent<'a>(&self, path: &'a str) -> FsResult<(u64, &'a str)> {
        let (parent, name) =
            split_parent(path).ok_or_else(|| FsError::InvalidName(path.to_string()))?;
        let parent_ino = self.resolve(parent).await?;
        Ok((parent_ino, name))
    }

    pub async fn attr_of(&self, ino: u64) -> FsResult<FileAttr> {
        let (uid, gid) = (self.uid, self.gid);
        self.tree
            .with_item(ino, |item| AttributeManager::item_to_file_attr(item, uid, gid))
            .await
    }

    pub async fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        let path = normalize_path(path);
        debug!("GETATTR: {}", path);
        let ino = self.resolve(&path).await?;
        self.attr_of(ino).await
    }

    /// Entries of a directory as name and kind pairs
    pub async fn open_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let path = normalize_path(path);
        debug!("OPENDIR: {}", path);
        let ino = self.resolve(&path).await?;
        if !self.tree.with_item(ino, |item| item.is_dir()).await? {
            return Err(FsError::NotADirectory(path));
        }

        let children = self.tree.children(ino).await.map_err(|e| match e {
            FsError::Remote(_) => FsError::NotFound(path.clone()),
            other => other,
        })?;
        Ok(children
            .into_iter()
            .map(|(name, child)| DirEntry {
                ino: child.ino,
                name,
                kind: if child.is_dir {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                },
            })
            .collect())
    }

    /// Mode is ignored: every folder is 0755
    pub async fn mkdir(&self, path: &str) -> FsResult<FileAttr> {
        let path = normalize_path(path);
        debug!("MKDIR: {}", path);
        let (parent, name) = self.resolve_parent(&path).await?;
        let ino = self.tree.create_dir(parent, name).await?;
        self.attr_of(ino).await
    }

    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path);
        debug!("RMDIR: {}", path);
        let (parent, name) = self.resolve_parent(&path).await?;
        self.tree.remove_dir(parent, name).await
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path);
        debug!("UNLINK: {}", path);
        let (parent, name) = self.resolve_parent(&path).await?;
        let ino = self.tree.lookup(parent, name).await?;
        self.tree.remove_file(parent, name).await?;
        self.file_handle_manager.cleanup_handles_for_inode(ino);
        Ok(())
    }

    /// Open a file and return its handle. Existing remote files are read-only;
    /// files created in this mount and not uploaded yet may be reopened for write.
    pub async fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        let path = normalize_path(path);
        debug!("OPEN: {} flags={:#o}", path, flags);
        let ino = self.resolve(&path).await?;

        let writable = flags & libc::O_ACCMODE != libc::O_RDONLY;
        if writable && !self.tree.with_item(ino, |item| item.is_local_only()).await? {
            return Err(FsError::PermissionDenied(path));
        }

        self.tree.open_file(ino).await?;
        Ok(self.file_handle_manager.open_file(ino, writable))
    }

    /// Create an empty file and open it for writing
    pub async fn create(&self, path: &str) -> FsResult<(u64, FileAttr)> {
        let path = normalize_path(path);
        debug!("CREATE: {}", path);
        let (parent, name) = self.resolve_parent(&path).await?;
        let ino = self.tree.create_file(parent, name).await?;
        let fh = self.file_handle_manager.open_file(ino, true);
        Ok((fh, self.attr_of(ino).await?))
    }

    fn handle_ino(&self, fh: u64) -> FsResult<u64> {
        self.file_handle_manager
            .get(fh)
            .map(|handle| handle.ino)
            .ok_or_else(|| FsError::NotFound(format!("file handle {}", fh)))
    }

    pub async fn read(&self, fh: u64, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let ino = self.handle_ino(fh)?;
        self.tree.read(ino, offset, size).await
    }

    pub async fn write(&self, fh: u64, offset: u64, data: &[u8]) -> FsResult<u32> {
        let handle = self
            .file_handle_manager
            .get(fh)
            .ok_or_else(|| FsError::NotFound(format!("file handle {}", fh)))?;
        if !handle.is_writable() {
            return Err(FsError::PermissionDenied(format!("file handle {}", fh)));
        }
        let written = self.tree.write(handle.ino, offset, data).await?;
        Ok(written as u32)
    }

    pub async fn truncate(&self, path: &str, size: u64) -> FsResult<FileAttr> {
        let path = normalize_path(path);
        debug!("TRUNCATE: {} to {}", path, size);
        let ino = self.resolve(&path).await?;
        self.tree.truncate(ino, size).await?;
        self.attr_of(ino).await
    }

    /// Schedule the upload of a dirty file without waiting for it
    pub async fn flush(&self, fh: u64) -> FsResult<Option<JoinHandle<()>>> {
        let ino = self.handle_ino(fh)?;
        debug!("FLUSH: fh={} ino={}", fh, ino);
        self.tree.flush(ino).await
    }

    pub fn release(&self, fh: u64) {
        self.file_handle_manager.close(fh);
    }

    pub async fn utimens(&self, path: &str, mtime: SystemTime) -> FsResult<FileAttr> {
        let path = normalize_path(path);
        debug!("UTIMENS: {}", path);
        let ino = self.resolve(&path).await?;
        self.tree.set_modified(ino, mtime).await?;
        self.attr_of(ino).await
    }

    pub fn chmod(&self, path: &str, _mode: u32) -> FsResult<()> {
        Err(FsError::PermissionDenied(normalize_path(path)))
    }

    pub fn chown(&self, path: &str, _uid: Option<u32>, _gid: Option<u32>) -> FsResult<()> {
        Err(FsError::PermissionDenied(normalize_path(path)))
    }
}
