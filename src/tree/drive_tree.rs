//! Arena of cached items and the operations that fill and mutate it

use crate::error::{FsError, FsResult};
use crate::onedrive_service::onedrive_models::DriveItem;
use crate::onedrive_service::path_utils::join_path;
use crate::onedrive_service::OneDriveClientTrait;
use crate::tree::item::{ChildRef, Item, SyncStatus, UploadJob, FILE_MODE, ROOT_INO};
use crate::tree::upload_worker::UploadWorker;
use anyhow::Context;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub type ItemRef = Arc<Mutex<Item>>;

/// When a cached directory listing must be fetched again
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    /// None keeps a listing for the lifetime of the mount
    pub children_ttl: Option<Duration>,
}

/// The cached drive: every known item keyed by inode number.
///
/// Locks are always taken parent before child, and no arena lock is held
/// across an await.
pub struct DriveTree {
    client: Arc<dyn OneDriveClientTrait>,
    policy: CachePolicy,
    uploader: UploadWorker,
    nodes: RwLock<HashMap<u64, ItemRef>>,
    next_ino: AtomicU64,
}

fn remote_error(context: &str, e: anyhow::Error) -> FsError {
    error!("{}: {:#}", context, e);
    FsError::Remote(e.context(context.to_string()))
}

impl DriveTree {
    pub fn new(
        client: Arc<dyn OneDriveClientTrait>,
        root: DriveItem,
        policy: CachePolicy,
        uploader: UploadWorker,
    ) -> Arc<Self> {
        let root = Item::from_drive_item(ROOT_INO, root, None);
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INO, Arc::new(Mutex::new(root)));

        Arc::new(Self {
            client,
            policy,
            uploader,
            nodes: RwLock::new(nodes),
            next_ino: AtomicU64::new(ROOT_INO + 1),
        })
    }

    /// Fetch the drive root and build a tree around it
    pub async fn load(
        client: Arc<dyn OneDriveClientTrait>,
        policy: CachePolicy,
        uploader: UploadWorker,
    ) -> anyhow::Result<Arc<Self>> {
        let root = client
            .get_root()
            .await
            .context("Failed to fetch the drive root")?;
        info!("Drive root is {}", root.id);
        Ok(Self::new(client, root, policy, uploader))
    }

    pub fn client(&self) -> &Arc<dyn OneDriveClientTrait> {
        &self.client
    }

    pub fn node(&self, ino: u64) -> FsResult<ItemRef> {
        self.nodes
            .read()
            .unwrap()
            .get(&ino)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("inode {}", ino)))
    }

    /// Number of items currently in the arena
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::SeqCst)
    }

    fn register(&self, item: Item) {
        let ino = item.ino();
        self.nodes
            .write()
            .unwrap()
            .insert(ino, Arc::new(Mutex::new(item)));
    }

    /// Run `f` against the item under its lock
    pub async fn with_item<R>(&self, ino: u64, f: impl FnOnce(&Item) -> R) -> FsResult<R> {
        let node = self.node(ino)?;
        let item = node.lock().await;
        Ok(f(&item))
    }

    pub async fn path_of(&self, ino: u64) -> FsResult<String> {
        self.with_item(ino, Item::path).await
    }

    pub async fn sync_status(&self, ino: u64) -> FsResult<SyncStatus> {
        self.with_item(ino, |item| item.sync_status().clone()).await
    }

    /// Fill or refresh the children of a locked directory
    async fn ensure_children(&self, item: &mut Item) -> FsResult<()> {
        if !item.is_dir() || item.children_fresh(self.policy.children_ttl) {
            return Ok(());
        }

        let path = item.path();
        debug!("📂 Listing children of {}", path);
        let listing = match self.client.list_children(&path).await {
            Ok(listing) => listing,
            Err(e) if item.children().is_some() => {
                warn!("Refreshing {} failed, serving cached entries: {:#}", path, e);
                return Ok(());
            }
            Err(e) => return Err(remote_error("Failed to list children", e)),
        };

        let merged = self.merge_children(item, listing).await;
        item.set_children(merged);
        Ok(())
    }

    /// Merge a fresh listing into what is cached, by name. Known children keep
    /// their inode; local-only and dirty children survive even when the
    /// listing does not know them yet.
    async fn merge_children(
        &self,
        item: &mut Item,
        listing: Vec<DriveItem>,
    ) -> HashMap<String, ChildRef> {
        let link = item.child_link();
        let mut previous = item.take_children();
        let mut merged = HashMap::with_capacity(listing.len());

        for drive_item in listing {
            let Some(name) = drive_item.name.clone() else {
                continue;
            };
            match previous.remove(&name) {
                Some(existing) if existing.is_dir == drive_item.is_folder() => {
                    if let Ok(node) = self.node(existing.ino) {
                        let mut child = node.lock().await;
                        if !child.is_dirty() && child.apply_remote(drive_item) {
                            child.invalidate_content();
                        }
                    }
                    merged.insert(name, existing);
                }
                replaced => {
                    if let Some(old) = replaced {
                        self.forget_subtree(old.ino).await;
                    }
                    let ino = self.alloc_ino();
                    let child = Item::from_drive_item(ino, drive_item, Some(link.clone()));
                    merged.insert(
                        name,
                        ChildRef {
                            ino,
                            is_dir: child.is_dir(),
                        },
                    );
                    self.register(child);
                }
            }
        }

        for (name, leftover) in previous {
            let keep = match self.node(leftover.ino) {
                Ok(node) => {
                    let child = node.lock().await;
                    child.is_local_only() || child.is_dirty()
                }
                Err(_) => false,
            };
            if keep {
                merged.insert(name, leftover);
            } else {
                self.forget_subtree(leftover.ino).await;
            }
        }

        merged
    }

    /// Drop an item and all its descendants from the arena
    async fn forget_subtree(&self, ino: u64) {
        let mut pending = vec![ino];
        let mut removed = Vec::new();
        while let Some(ino) = pending.pop() {
            if let Ok(node) = self.node(ino) {
                let item = node.lock().await;
                if let Some(children) = item.children() {
                    pending.extend(children.values().map(|c| c.ino));
                }
            }
            removed.push(ino);
        }

        let mut nodes = self.nodes.write().unwrap();
        for ino in removed {
            nodes.remove(&ino);
        }
    }

    /// Children of a directory, fetched on first use, sorted by name.
    /// A file has none.
    pub async fn children(&self, ino: u64) -> FsResult<Vec<(String, ChildRef)>> {
        let node = self.node(ino)?;
        let mut item = node.lock().await;
        self.ensure_children(&mut item).await?;

        let mut entries: Vec<(String, ChildRef)> = item
            .children()
            .map(|children| children.iter().map(|(n, c)| (n.clone(), *c)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Find `name` inside the directory `parent`
    pub async fn lookup(&self, parent: u64, name: &str) -> FsResult<u64> {
        let node = self.node(parent)?;
        let mut item = node.lock().await;
        if !item.is_dir() {
            return Err(FsError::NotADirectory(item.path()));
        }
        self.ensure_children(&mut item).await?;
        item.child(name)
            .map(|c| c.ino)
            .ok_or_else(|| FsError::NotFound(join_path(&item.path(), name)))
    }

    async fn fill_content(&self, item: &mut Item) -> FsResult<()> {
        if item.is_dir() {
            return Err(FsError::IsADirectory(item.path()));
        }
        if item.is_dirty() {
            return Err(FsError::UnflushedChanges(item.path()));
        }
        if item.is_local_only() {
            return Ok(());
        }
        debug!("Downloading {}", item.path());
        let data = self
            .client
            .download_content(&item.id)
            .await
            .map_err(|e| remote_error("Failed to download content", e))?;
        item.set_fetched_content(data)
    }

    /// Replace the buffer with the remote content. Refused while dirty.
    pub async fn fetch_content(&self, ino: u64) -> FsResult<()> {
        let node = self.node(ino)?;
        let mut item = node.lock().await;
        self.fill_content(&mut item).await
    }

    /// Prepare a file for reading: fetch the remote content unless the
    /// buffer holds changes that were not uploaded
    pub async fn open_file(&self, ino: u64) -> FsResult<()> {
        let node = self.node(ino)?;
        let mut item = node.lock().await;
        if item.is_dir() {
            return Err(FsError::IsADirectory(item.path()));
        }
        if item.is_dirty() || item.is_local_only() {
            return Ok(());
        }
        self.fill_content(&mut item).await
    }

    pub async fn read(&self, ino: u64, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        self.with_item(ino, |item| item.read(offset, size).to_vec())
            .await
    }

    pub async fn write(&self, ino: u64, offset: u64, data: &[u8]) -> FsResult<usize> {
        let node = self.node(ino)?;
        let mut item = node.lock().await;
        if item.is_dir() {
            return Err(FsError::IsADirectory(item.path()));
        }
        item.write(offset, data)
    }

    pub async fn truncate(&self, ino: u64, size: u64) -> FsResult<()> {
        let node = self.node(ino)?;
        let mut item = node.lock().await;
        if item.is_dir() {
            return Err(FsError::IsADirectory(item.path()));
        }
        item.check_buffer_size(size)?;
        // Keep the bytes below the cut when they were never downloaded
        if size > 0 && !item.content_state().is_fetched() {
            self.fill_content(&mut item).await?;
        }
        item.truncate(size)
    }

    pub async fn set_modified(&self, ino: u64, modified: SystemTime) -> FsResult<()> {
        let node = self.node(ino)?;
        node.lock().await.set_modified(modified);
        Ok(())
    }

    fn check_name(name: &str) -> FsResult<()> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(FsError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Locked, filled parent directory that does not contain `name` yet
    async fn lock_parent_for_new(
        &self,
        parent: u64,
        name: &str,
    ) -> FsResult<tokio::sync::OwnedMutexGuard<Item>> {
        Self::check_name(name)?;
        let node = self.node(parent)?;
        let mut item = node.lock_owned().await;
        if !item.is_dir() {
            return Err(FsError::NotADirectory(item.path()));
        }
        self.ensure_children(&mut item).await?;
        if item.child(name).is_some() {
            return Err(FsError::AlreadyExists(join_path(&item.path(), name)));
        }
        Ok(item)
    }

    /// New empty file, local until its first upload
    pub async fn create_file(&self, parent: u64, name: &str) -> FsResult<u64> {
        let mut parent_item = self.lock_parent_for_new(parent, name).await?;

        let ino = self.alloc_ino();
        let child = Item::new_local(ino, name, FILE_MODE, parent_item.child_link());
        debug!("Created local file {}", child.path());
        self.register(child);
        parent_item.insert_child(name, ChildRef { ino, is_dir: false });
        Ok(ino)
    }

    /// Create a folder remotely and register it as an empty, filled directory
    pub async fn create_dir(&self, parent: u64, name: &str) -> FsResult<u64> {
        let mut parent_item = self.lock_parent_for_new(parent, name).await?;

        let created = self
            .client
            .create_folder(&parent_item.path(), name)
            .await
            .map_err(|e| remote_error("Failed to create folder", e))?;

        let ino = self.alloc_ino();
        let mut child = Item::from_drive_item(ino, created, Some(parent_item.child_link()));
        child.set_children(HashMap::new());
        info!("📁 Created folder {}", child.path());
        self.register(child);
        parent_item.insert_child(name, ChildRef { ino, is_dir: true });
        Ok(ino)
    }

    /// Delete an empty directory remotely, then locally
    pub async fn remove_dir(&self, parent: u64, name: &str) -> FsResult<()> {
        self.remove_child(parent, name, true).await
    }

    /// Delete a file remotely (when it exists there), then locally
    pub async fn remove_file(&self, parent: u64, name: &str) -> FsResult<()> {
        self.remove_child(parent, name, false).await
    }

    async fn remove_child(&self, parent: u64, name: &str, want_dir: bool) -> FsResult<()> {
        let node = self.node(parent)?;
        let mut parent_item = node.lock().await;
        if !parent_item.is_dir() {
            return Err(FsError::NotADirectory(parent_item.path()));
        }
        self.ensure_children(&mut parent_item).await?;

        let path = join_path(&parent_item.path(), name);
        let target = parent_item
            .child(name)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        match (want_dir, target.is_dir) {
            (true, false) => return Err(FsError::NotADirectory(path)),
            (false, true) => return Err(FsError::IsADirectory(path)),
            _ => {}
        }

        let id = {
            let child_node = self.node(target.ino)?;
            let mut child = child_node.lock().await;
            if want_dir {
                self.ensure_children(&mut child).await?;
                if child.children().is_some_and(|c| !c.is_empty()) {
                    return Err(FsError::NotEmpty(path));
                }
            }
            if child.is_local_only() {
                child.mark_removed();
            }
            child.id.clone()
        };

        if !id.is_empty() {
            self.client
                .delete_item(&id)
                .await
                .map_err(|e| remote_error("Failed to delete item", e))?;
        }
        info!("🗑️ Removed {}", path);
        parent_item.remove_child(name);
        self.forget_subtree(target.ino).await;
        Ok(())
    }

    /// Schedule an upload if the item is dirty. Returns without waiting; the
    /// handle lets callers observe completion.
    pub async fn flush(self: &Arc<Self>, ino: u64) -> FsResult<Option<JoinHandle<()>>> {
        let node = self.node(ino)?;
        if !node.lock().await.request_upload() {
            return Ok(None);
        }
        debug!("Scheduling upload of inode {}", ino);
        Ok(Some(self.uploader.spawn(Arc::clone(self), ino)))
    }

    pub(crate) async fn begin_upload(&self, ino: u64) -> FsResult<Option<UploadJob>> {
        let node = self.node(ino)?;
        let job = node.lock().await.prepare_upload();
        Ok(job)
    }

    /// Returns true when the buffer changed during the upload and must be sent
    /// again. Fails once the item was removed.
    pub(crate) async fn finish_upload(
        &self,
        ino: u64,
        revision: u64,
        response: DriveItem,
    ) -> FsResult<bool> {
        let node = self.node(ino)?;
        let mut item = node.lock().await;
        if item.is_removed() {
            return Err(FsError::NotFound(item.path()));
        }
        Ok(item.complete_upload(revision, response))
    }

    pub(crate) async fn fail_upload(&self, ino: u64, reason: String) -> FsResult<()> {
        let node = self.node(ino)?;
        node.lock().await.fail_upload(reason);
        Ok(())
    }
}
