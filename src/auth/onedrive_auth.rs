use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use log::{info, warn};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tiny_http::{Header, Response, Server};
use tokio::sync::Mutex;
use url::Url;

use crate::auth::token_store::{AuthConfig, TokenStore};
use crate::auth::AccessTokenProvider;

/// Azure application client ID
const CLIENT_ID: &str = "95367b4f-624c-452c-b099-bfc9c27b69b9";

const CALLBACK_ADDRESS: &str = "127.0.0.1:8080";
const REDIRECT_URI: &str = "http://localhost:8080/callback";

const SCOPES: &str = "https://graph.microsoft.com/Files.ReadWrite offline_access";

const AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Refresh this many seconds before the token actually expires
const TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

const PKCE_CODE_VERIFIER_LENGTH: usize = 128;
const PKCE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

const SUCCESS_HTML: &str =
    "<html><body><h2>onedrive-fuse is authorized.</h2>You can close this window.</body></html>";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

/// Outcome of the browser redirect
enum CallbackOutcome {
    Code(String),
    Denied(String),
}

/// Token manager: browser-based PKCE login, persisted tokens, transparent refresh
pub struct OneDriveAuth {
    client: Client,
    token_store: TokenStore,
    cached: Mutex<Option<AuthConfig>>,
}

impl OneDriveAuth {
    pub fn new(config_dir: &Path) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            token_store: TokenStore::new(config_dir)?,
            cached: Mutex::new(None),
        })
    }

    /// True when tokens from an earlier login are on disk
    pub fn has_stored_tokens(&self) -> bool {
        self.token_store.load_tokens().is_ok()
    }

    fn generate_pkce() -> (String, String) {
        let mut rng = rand::rng();
        let code_verifier: String = (0..PKCE_CODE_VERIFIER_LENGTH)
            .map(|_| PKCE_CHARS[rng.random_range(0..PKCE_CHARS.len())] as char)
            .collect();

        let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
        (code_verifier, code_challenge)
    }

    fn build_auth_url(code_challenge: &str) -> Result<Url> {
        let mut auth_url = Url::parse(AUTH_URL)?;
        auth_url
            .query_pairs_mut()
            .append_pair("client_id", CLIENT_ID)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", REDIRECT_URI)
            .append_pair("scope", SCOPES)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("response_mode", "query");
        Ok(auth_url)
    }

    fn parse_callback(request_url: &str) -> Result<Option<CallbackOutcome>> {
        let url = Url::parse(&format!("http://localhost{}", request_url))?;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => return Ok(Some(CallbackOutcome::Code(value.into_owned()))),
                "error" => return Ok(Some(CallbackOutcome::Denied(value.into_owned()))),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Block until the browser hits the redirect URI
    fn wait_for_callback(server: Server) -> Result<String> {
        for request in server.incoming_requests() {
            let outcome = match Self::parse_callback(request.url())? {
                Some(outcome) => outcome,
                None => continue,
            };
            let header = Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..])
                .map_err(|_| anyhow!("Failed to create content-type header"))?;
            return match outcome {
                CallbackOutcome::Code(code) => {
                    request
                        .respond(Response::from_string(SUCCESS_HTML).with_header(header))
                        .context("Failed to answer the browser")?;
                    Ok(code)
                }
                CallbackOutcome::Denied(reason) => {
                    request
                        .respond(Response::from_string("Authorization failed!").with_header(header))
                        .context("Failed to answer the browser")?;
                    Err(anyhow!("Authorization was denied: {}", reason))
                }
            };
        }
        Err(anyhow!("Authorization flow incomplete"))
    }

    /// Interactive login: opens the browser and stores the resulting tokens
    pub async fn authorize(&self) -> Result<()> {
        let (code_verifier, code_challenge) = Self::generate_pkce();
        let auth_url = Self::build_auth_url(&code_challenge)?;

        let server = Server::http(CALLBACK_ADDRESS)
            .map_err(|e| anyhow!("Failed to start local server: {}", e))?;

        info!("Opening browser for authentication: {}", auth_url);
        if let Err(e) = webbrowser::open(auth_url.as_str()) {
            warn!("Could not open a browser ({}); visit the URL above manually", e);
        }

        let code = tokio::task::spawn_blocking(move || Self::wait_for_callback(server))
            .await
            .context("Authorization callback task failed")??;

        let tokens = self
            .request_tokens(&[
                ("client_id", CLIENT_ID),
                ("code", code.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("grant_type", "authorization_code"),
                ("code_verifier", code_verifier.as_str()),
            ])
            .await?;
        self.store(tokens, None).await?;
        info!("Tokens saved to {}", self.token_store.path().display());
        Ok(())
    }

    async fn request_tokens(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(params)
            .send()
            .await
            .context("Failed to send token request")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token request failed: {}", error_text));
        }

        response
            .json()
            .await
            .context("Failed to parse token response")
    }

    /// Persist a token response; Microsoft may omit the refresh token on refresh
    async fn store(&self, tokens: TokenResponse, previous_refresh: Option<&str>) -> Result<AuthConfig> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let config = AuthConfig {
            access_token: tokens.access_token,
            refresh_token: tokens
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string))
                .unwrap_or_default(),
            expires_at: now + tokens.expires_in,
        };
        self.token_store.save_tokens(&config)?;
        *self.cached.lock().await = Some(config.clone());
        Ok(config)
    }

    async fn refresh(&self, current: &AuthConfig) -> Result<AuthConfig> {
        warn!("Access token about to expire, refreshing");
        let tokens = self
            .request_tokens(&[
                ("client_id", CLIENT_ID),
                ("refresh_token", current.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        self.store(tokens, Some(&current.refresh_token)).await
    }
}

#[async_trait]
impl AccessTokenProvider for OneDriveAuth {
    async fn access_token(&self) -> Result<String> {
        let current = {
            let mut cached = self.cached.lock().await;
            if cached.is_none() {
                *cached = Some(self.token_store.load_tokens()?);
            }
            cached.clone()
        };
        let current = current.ok_or_else(|| anyhow!("No tokens available"))?;

        if current.expires_within(TOKEN_REFRESH_BUFFER_SECS) {
            Ok(self.refresh(&current).await?.access_token)
        } else {
            Ok(current.access_token)
        }
    }
}
