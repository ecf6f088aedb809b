//! OAuth2 authentication against the Microsoft identity platform

pub mod onedrive_auth;
pub mod token_store;

use anyhow::Result;
use async_trait::async_trait;

pub use onedrive_auth::OneDriveAuth;

/// Source of bearer tokens for Graph requests
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// A currently valid access token, refreshed if it is about to expire
    async fn access_token(&self) -> Result<String>;
}
