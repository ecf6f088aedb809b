use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// HTTP client for Microsoft Graph API operations
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Get full URL by prepending Graph API base if needed
    pub fn get_full_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", GRAPH_API_BASE, url)
        }
    }

    /// GET a JSON document
    pub async fn get<T>(&self, url: &str, auth_header: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.get_full_url(url);
        debug!("GET {}", url);

        self.client
            .get(&url)
            .header("Authorization", auth_header)
            .send()
            .await
            .context("Failed to get response")?
            .error_for_status()
            .context("Not a success status")?
            .json::<T>()
            .await
            .context("Failed to deserialize response")
    }

    /// GET raw bytes; redirects to the pre-authenticated download URL are followed
    pub async fn get_bytes(&self, url: &str, auth_header: &str) -> Result<Vec<u8>> {
        let url = self.get_full_url(url);
        debug!("GET (bytes) {}", url);

        let bytes = self
            .client
            .get(&url)
            .header("Authorization", auth_header)
            .send()
            .await
            .context("Failed to get response for download")?
            .error_for_status()
            .context("Not a success status")?
            .bytes()
            .await
            .context("Failed to read response bytes")?;
        Ok(bytes.to_vec())
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post<T, B>(&self, url: &str, body: &B, auth_header: &str) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = self.get_full_url(url);
        debug!("POST {}", url);

        self.client
            .post(&url)
            .header("Authorization", auth_header)
            .json(body)
            .send()
            .await
            .context("Failed to get response for post")?
            .error_for_status()
            .context("Not a success status")?
            .json::<T>()
            .await
            .context("Failed to deserialize response")
    }

    /// DELETE a resource
    pub async fn delete(&self, url: &str, auth_header: &str) -> Result<()> {
        let url = self.get_full_url(url);
        debug!("DELETE {}", url);

        self.client
            .delete(&url)
            .header("Authorization", auth_header)
            .send()
            .await
            .context("Failed to get response for delete")?
            .error_for_status()
            .context("Not a success status")?;
        Ok(())
    }

    /// PUT raw bytes and decode the JSON response
    pub async fn put_bytes<T>(&self, url: &str, data: &[u8], auth_header: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.get_full_url(url);
        debug!("PUT {} ({} bytes)", url, data.len());

        self.client
            .put(&url)
            .header("Authorization", auth_header)
            .header("Content-Type", "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await
            .context("Failed to get response for upload")?
            .error_for_status()
            .context("Not a success status")?
            .json::<T>()
            .await
            .context("Failed to deserialize upload response")
    }
}
