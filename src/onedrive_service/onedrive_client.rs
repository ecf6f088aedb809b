use crate::auth::AccessTokenProvider;
use crate::onedrive_service::http_client::HttpClient;
use crate::onedrive_service::onedrive_models::{DriveItem, DriveItemCollection, NewFolderRequest};
use crate::onedrive_service::path_utils::{children_url, escape_path, item_url};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

/// Remote operations the filesystem tree depends on.
///
/// Paths are absolute mount paths (`/`, `/Documents/a.txt`); IDs are Graph item IDs.
#[async_trait]
pub trait OneDriveClientTrait: Send + Sync {
    /// Fetch the drive root item
    async fn get_root(&self) -> Result<DriveItem>;

    /// List every child of the folder at `path`, following pagination
    async fn list_children(&self, path: &str) -> Result<Vec<DriveItem>>;

    /// Download the full content of a file
    async fn download_content(&self, item_id: &str) -> Result<Vec<u8>>;

    /// Create a folder named `name` inside the folder at `parent_path`
    async fn create_folder(&self, parent_path: &str, name: &str) -> Result<DriveItem>;

    /// Delete an item (recursively for folders)
    async fn delete_item(&self, item_id: &str) -> Result<()>;

    /// Upload content as a new file `name` inside the folder `parent_id`
    async fn upload_new_file(&self, parent_id: &str, name: &str, data: &[u8]) -> Result<DriveItem>;

    /// Replace the content of an existing file
    async fn upload_updated_file(&self, item_id: &str, data: &[u8]) -> Result<DriveItem>;
}

/// Graph API client backed by reqwest
#[derive(Clone)]
pub struct OneDriveClient {
    http_client: HttpClient,
    auth: Arc<dyn AccessTokenProvider>,
}

impl OneDriveClient {
    pub fn new(auth: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http_client: HttpClient::new(),
            auth,
        }
    }

    /// Get authorization header with valid token
    async fn auth_header(&self) -> Result<String> {
        let token = self
            .auth
            .access_token()
            .await
            .context("Failed to get valid token")?;
        Ok(format!("Bearer {}", token))
    }
}

#[async_trait]
impl OneDriveClientTrait for OneDriveClient {
    async fn get_root(&self) -> Result<DriveItem> {
        let auth_header = self.auth_header().await?;
        self.http_client
            .get(&item_url("/"), &auth_header)
            .await
            .context("Failed to get drive root")
    }

    async fn list_children(&self, path: &str) -> Result<Vec<DriveItem>> {
        let auth_header = self.auth_header().await?;
        let mut items = Vec::new();
        let mut next = Some(children_url(path));

        while let Some(url) = next {
            let page: DriveItemCollection = self
                .http_client
                .get(&url, &auth_header)
                .await
                .with_context(|| format!("Failed to list children of {}", path))?;
            items.extend(page.value);
            next = page.next_link;
        }

        debug!("Listed {} children of {}", items.len(), path);
        Ok(items)
    }

    async fn download_content(&self, item_id: &str) -> Result<Vec<u8>> {
        let auth_header = self.auth_header().await?;
        let url = format!("/me/drive/items/{}/content", item_id);
        self.http_client
            .get_bytes(&url, &auth_header)
            .await
            .with_context(|| format!("Failed to download content of {}", item_id))
    }

    async fn create_folder(&self, parent_path: &str, name: &str) -> Result<DriveItem> {
        let auth_header = self.auth_header().await?;
        let item: DriveItem = self
            .http_client
            .post(&children_url(parent_path), &NewFolderRequest::new(name), &auth_header)
            .await
            .context("Failed to create folder")?;

        info!("Created folder: {} in {} -> {}", name, parent_path, item.id);
        Ok(item)
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        let auth_header = self.auth_header().await?;
        let url = format!("/me/drive/items/{}", item_id);
        self.http_client
            .delete(&url, &auth_header)
            .await
            .context("Failed to delete item")?;

        info!("Deleted item: {}", item_id);
        Ok(())
    }

    async fn upload_new_file(&self, parent_id: &str, name: &str, data: &[u8]) -> Result<DriveItem> {
        let auth_header = self.auth_header().await?;
        let url = format!(
            "/me/drive/items/{}:/{}:/content",
            parent_id,
            escape_path(name)
        );
        let item: DriveItem = self
            .http_client
            .put_bytes(&url, data, &auth_header)
            .await
            .context("Failed to upload file")?;

        info!("Uploaded file: {} to parent {} -> {}", name, parent_id, item.id);
        Ok(item)
    }

    async fn upload_updated_file(&self, item_id: &str, data: &[u8]) -> Result<DriveItem> {
        let auth_header = self.auth_header().await?;
        let url = format!("/me/drive/items/{}/content", item_id);
        let item: DriveItem = self
            .http_client
            .put_bytes(&url, data, &auth_header)
            .await
            .context("Failed to update file")?;

        info!("Updated file: {} -> {}", item_id, item.id);
        Ok(item)
    }
}
