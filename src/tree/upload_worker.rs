//! Detached uploads triggered by flush

use crate::onedrive_service::onedrive_models::DriveItem;
use crate::onedrive_service::OneDriveClientTrait;
use crate::tree::drive_tree::DriveTree;
use crate::tree::item::UploadJob;
use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;

/// Retry configuration for uploads
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay_ms: RETRY_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based), doubling each time
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.delay_ms.saturating_mul(factor))
    }
}

/// Runs uploads on the tokio runtime, off the calling kernel thread
pub struct UploadWorker {
    runtime: Handle,
    config: RetryConfig,
}

impl UploadWorker {
    pub fn new(runtime: Handle, config: RetryConfig) -> Self {
        Self { runtime, config }
    }

    /// Start uploading `ino`; the returned handle resolves once the item is
    /// clean, failed, or gone
    pub fn spawn(&self, tree: Arc<DriveTree>, ino: u64) -> JoinHandle<()> {
        let config = self.config.clone();
        self.runtime
            .spawn(async move { run_uploads(tree, ino, config).await })
    }
}

async fn run_uploads(tree: Arc<DriveTree>, ino: u64, config: RetryConfig) {
    loop {
        let job = match tree.begin_upload(ino).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                debug!("Upload of inode {} dropped: {}", ino, e);
                return;
            }
        };

        let response = match upload_with_retry(tree.client().as_ref(), &job, &config).await {
            Ok(response) => response,
            Err(e) => {
                error!("Giving up on upload of {}: {:#}", job.name, e);
                if let Err(e) = tree.fail_upload(ino, format!("{:#}", e)).await {
                    debug!("Could not record failed upload of inode {}: {}", ino, e);
                }
                return;
            }
        };

        let created_id = response.id.clone();
        match tree.finish_upload(ino, job.revision, response).await {
            Ok(true) => {
                debug!("Inode {} changed during upload, sending it again", ino);
            }
            Ok(false) => {
                info!("Uploaded {} ({} bytes)", job.name, job.data.len());
                return;
            }
            Err(e) => {
                debug!("Uploaded {} but inode {} is gone: {}", job.name, ino, e);
                // Removed while its first upload ran; the remote copy must go too
                if job.id.is_empty() && !created_id.is_empty() {
                    discard_orphan(tree.client().as_ref(), &job.name, &created_id).await;
                }
                return;
            }
        }
    }
}

/// Delete a file that an upload created after it was removed locally
async fn discard_orphan(client: &dyn OneDriveClientTrait, name: &str, id: &str) {
    match client.delete_item(id).await {
        Ok(()) => info!("🗑️ Removed {} uploaded after its deletion", name),
        Err(e) => error!("Failed to remove {} uploaded after its deletion: {:#}", name, e),
    }
}

/// Upload a snapshot, retrying with exponential backoff
pub async fn upload_with_retry(
    client: &dyn OneDriveClientTrait,
    job: &UploadJob,
    config: &RetryConfig,
) -> Result<DriveItem> {
    let mut attempt = 0;
    loop {
        match upload_once(client, job).await {
            Ok(item) => return Ok(item),
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for(attempt);
                warn!(
                    "Upload of {} failed, retrying in {}ms (attempt {}/{}): {:#}",
                    job.name,
                    delay.as_millis(),
                    attempt,
                    config.max_retries,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e.context(format!(
                    "Upload of {} failed after {} attempts",
                    job.name,
                    attempt + 1
                )))
            }
        }
    }
}

async fn upload_once(client: &dyn OneDriveClientTrait, job: &UploadJob) -> Result<DriveItem> {
    if !job.id.is_empty() {
        return client.upload_updated_file(&job.id, &job.data).await;
    }
    if job.parent_id.is_empty() {
        return Err(anyhow!("Parent of {} does not exist remotely", job.name));
    }
    client
        .upload_new_file(&job.parent_id, &job.name, &job.data)
        .await
}
