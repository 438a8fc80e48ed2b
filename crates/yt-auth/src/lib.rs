//! OAuth 2.0 credential handling for the YouTube Data API.
//!
//! One [`CredentialStore`] owns the token file on disk, one [`Authenticator`]
//! owns the client credentials and the current token. Every path that obtains
//! a token (code exchange, refresh) goes through [`Authenticator::store_token`]
//! so the file and the in-memory handle never diverge.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Read-only scope: enough to list playlists and their items, nothing more.
pub const YOUTUBE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// The persisted credential bundle issued by the authorization server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Access token attached to API requests
    pub access_token: String,
    /// Refresh token, absent when the provider did not grant offline access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Granted scope as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expiry time as Unix timestamp (seconds since epoch)
    pub expires_at: u64,
}

impl TokenRecord {
    /// Check if the token is expired or will expire soon (within 60 seconds).
    pub fn is_expired(&self) -> bool {
        unix_now() + 60 >= self.expires_at
    }
}

/// Wire shape of Google's token and refresh responses.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    expires_in: u64,
}

impl TokenResponse {
    fn into_record(self, fallback_refresh: Option<String>) -> TokenRecord {
        TokenRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(fallback_refresh),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: self.scope,
            expires_at: unix_now() + self.expires_in,
        }
    }
}

/// Owns the token file. At most one record lives at the configured path;
/// every save replaces it wholesale.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record. A missing file is not an error, it just means
    /// nobody has authorized yet; malformed contents are.
    pub fn load(&self) -> Result<Option<TokenRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read token file '{}'", self.path.display()));
            }
        };
        let record: TokenRecord = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse token file '{}'", self.path.display()))?;
        Ok(Some(record))
    }

    /// Write `record` to the configured path, replacing any existing content.
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create token directory '{}'", parent.display())
                })?;
            }
        }

        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write token file '{}'", self.path.display()))?;

        // Owner read/write only on Unix-like systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, permissions).with_context(|| {
                format!(
                    "failed to set permissions on token file '{}'",
                    self.path.display()
                )
            })?;
        }

        Ok(())
    }
}

/// OAuth client configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI for the OAuth callback
    pub redirect_uri: String,
    /// OAuth scope(s)
    pub scope: String,
}

impl OAuthConfig {
    /// Create a configuration with the fixed read-only YouTube scope.
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            scope: YOUTUBE_READONLY_SCOPE.to_string(),
        }
    }
}

/// The authorization handle: client credentials plus the current token,
/// backed by a [`CredentialStore`].
pub struct Authenticator {
    config: OAuthConfig,
    store: CredentialStore,
    token: Option<TokenRecord>,
    http: reqwest::Client,
    auth_endpoint: String,
    token_endpoint: String,
}

impl Authenticator {
    pub fn new(config: OAuthConfig, store: CredentialStore) -> Self {
        Self {
            config,
            store,
            token: None,
            http: reqwest::Client::new(),
            auth_endpoint: AUTH_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Point the handle at a different token endpoint (tests use an
    /// in-process server here).
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Whether a token record is currently applied to the handle.
    pub fn is_authorized(&self) -> bool {
        self.token.is_some()
    }

    /// Read the store and apply the record, if any. Returns whether one was
    /// present.
    pub fn load_stored(&mut self) -> Result<bool> {
        match self.store.load()? {
            Some(record) => {
                self.token = Some(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persist `record` and apply it to the handle.
    pub fn store_token(&mut self, record: TokenRecord) -> Result<()> {
        self.store.save(&record)?;
        self.token = Some(record);
        Ok(())
    }

    /// Build the consent URL for the fixed read-only scope. Returns the URL
    /// together with the PKCE verifier the callback must present on exchange.
    pub fn authorize_url(&self) -> (String, String) {
        let (verifier, challenge) = generate_pkce();

        let url = format!(
            "{}?\
            client_id={}&\
            redirect_uri={}&\
            response_type=code&\
            scope={}&\
            code_challenge={}&\
            code_challenge_method=S256&\
            access_type=offline&\
            prompt=consent",
            self.auth_endpoint,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scope),
            urlencoding::encode(&challenge),
        );

        (url, verifier)
    }

    /// Exchange a one-time authorization code for a token record, persisting
    /// and applying it.
    pub async fn exchange_code(&mut self, code: &str, verifier: &str) -> Result<()> {
        tracing::info!("exchanging authorization code for tokens");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self.request_token(&params).await?;
        let record = response.into_record(None);
        self.store_token(record)?;

        tracing::info!("obtained and stored OAuth tokens");
        Ok(())
    }

    /// Refresh the access token using the stored refresh token. The existing
    /// refresh token is kept; the rest of the record is overwritten.
    pub async fn refresh(&mut self) -> Result<()> {
        let current = self.token.as_ref().context("no OAuth token loaded")?;
        let refresh_token = current
            .refresh_token
            .clone()
            .context("no refresh token available, re-authorization required")?;

        tracing::info!("refreshing OAuth token");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self.request_token(&params).await?;
        let record = response.into_record(Some(refresh_token));
        self.store_token(record)?;

        tracing::info!("OAuth token refreshed");
        Ok(())
    }

    /// Get a usable access token, refreshing first when the current one is
    /// expired.
    pub async fn access_token(&mut self) -> Result<String> {
        let token = self.token.as_ref().context("no OAuth token loaded")?;

        if token.is_expired() {
            tracing::info!("access token expired");
            self.refresh().await?;
        }

        Ok(self
            .token
            .as_ref()
            .expect("token present after refresh")
            .access_token
            .clone())
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(params)
            .send()
            .await
            .context("token endpoint request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("token endpoint returned status {status}: {body}");
        }

        response
            .json::<TokenResponse>()
            .await
            .context("failed to decode token response")
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}

/// Generate PKCE verifier and challenge
fn generate_pkce() -> (String, String) {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use rand::Rng;
    use rand::distributions::Alphanumeric;
    use sha2::{Digest, Sha256};

    // Random verifier (43-128 characters) from a cryptographically secure RNG
    let verifier: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();

    // Challenge: base64url(SHA256(verifier))
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let hash = hasher.finalize();
    let challenge = URL_SAFE_NO_PAD.encode(hash);

    (verifier, challenge)
}
