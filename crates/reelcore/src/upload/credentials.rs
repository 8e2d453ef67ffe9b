//! Google OAuth for the upload scope.
//!
//! `token.json` uses the authorized-user layout written by Google's client
//! libraries, so a token produced elsewhere keeps working here.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::UploadError;
use crate::config;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Treat tokens this close to expiry as already expired
const EXPIRY_SKEW_SECS: i64 = 60;

/// Contents of `token.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Token endpoint response for both code exchange and refresh.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl AuthorizedUserToken {
    /// Reads the token file; `Ok(None)` when it does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>, UploadError> {
        match fs_err::tokio::read_to_string(path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), UploadError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::tokio::create_dir_all(parent).await?;
        }
        fs_err::tokio::write(path, serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }

    /// Has an access token that is not about to expire.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (Some(_), Some(expiry)) => expiry - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now,
            (Some(_), None) => true,
            _ => false,
        }
    }

    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.token = Some(response.access_token);
        self.expiry = response.expires_in.map(|secs| now + ChronoDuration::seconds(secs));
        if let Some(refresh) = response.refresh_token {
            self.refresh_token = Some(refresh);
        }
    }

    /// Exchanges the refresh token for a new access token.
    pub async fn refresh(&mut self, http: &reqwest::Client) -> Result<(), UploadError> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or_else(|| UploadError::Unauthorized("token has no refresh_token".to_string()))?;

        log::info!("Refreshing YouTube access token");
        let response = http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Refresh token rejected ({}): {}", status, body);
            return Err(UploadError::Unauthorized(format!("refresh rejected: {}", body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status { status, body });
        }

        let parsed: TokenResponse = response.json().await?;
        self.apply(parsed, Utc::now());
        log::info!("✅ Token refreshed successfully");
        Ok(())
    }
}

/// One entry of `client_secrets.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum SecretsFile {
    Installed(OAuthClientSecrets),
    Web(OAuthClientSecrets),
}

impl OAuthClientSecrets {
    /// Accepts both the "installed" and "web" layouts.
    pub fn from_json(raw: &str) -> Result<Self, UploadError> {
        let file: SecretsFile = serde_json::from_str(raw)?;
        Ok(match file {
            SecretsFile::Installed(s) | SecretsFile::Web(s) => s,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, UploadError> {
        let raw = fs_err::tokio::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    /// Consent URL for the out-of-band code flow.
    pub fn authorization_url(&self) -> Result<String, UploadError> {
        let url = url::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", config::upload::REDIRECT_URI),
                ("scope", config::upload::SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| UploadError::Protocol(format!("invalid auth_uri: {}", e)))?;
        Ok(url.into())
    }

    /// Trades the code the user pasted for an authorized-user token.
    pub async fn exchange_code(&self, http: &reqwest::Client, code: &str) -> Result<AuthorizedUserToken, UploadError> {
        let response = http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.trim()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", config::upload::REDIRECT_URI),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Authorization code exchange failed ({}): {}", status, body);
            return Err(UploadError::Status { status, body });
        }

        let parsed: TokenResponse = response.json().await?;
        let mut token = AuthorizedUserToken {
            token: None,
            refresh_token: None,
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: vec![config::upload::SCOPE.to_string()],
            expiry: None,
        };
        token.apply(parsed, Utc::now());
        Ok(token)
    }
}

/// Token file plus client secrets: everything the uploader needs to get a bearer token.
#[derive(Debug, Clone)]
pub struct YouTubeAuth {
    http: reqwest::Client,
    token_file: PathBuf,
    secrets_file: PathBuf,
}

impl YouTubeAuth {
    pub fn new(http: reqwest::Client, token_file: impl Into<PathBuf>, secrets_file: impl Into<PathBuf>) -> Self {
        Self {
            http,
            token_file: token_file.into(),
            secrets_file: secrets_file.into(),
        }
    }

    pub fn from_env(http: reqwest::Client) -> Self {
        Self::new(
            http,
            config::upload::TOKEN_FILE.as_str(),
            config::upload::CLIENT_SECRETS_FILE.as_str(),
        )
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// Valid access token, refreshing and rewriting `token.json` when needed.
    pub async fn access_token(&self) -> Result<SecretString, UploadError> {
        self.bearer(false).await
    }

    /// Refreshes even a token that looks valid; used after the API rejected it.
    pub async fn refreshed_token(&self) -> Result<SecretString, UploadError> {
        self.bearer(true).await
    }

    async fn bearer(&self, force_refresh: bool) -> Result<SecretString, UploadError> {
        let mut token = AuthorizedUserToken::load(&self.token_file)
            .await?
            .ok_or_else(|| UploadError::Unauthorized(format!("{} not found", self.token_file.display())))?;

        if force_refresh || !token.is_valid_at(Utc::now()) {
            token.refresh(&self.http).await?;
            token.save(&self.token_file).await?;
        }

        token
            .token
            .map(SecretString::from)
            .ok_or_else(|| UploadError::Unauthorized("token has no access token".to_string()))
    }

    /// True when a token exists and can be used or refreshed.
    pub async fn is_authorized(&self) -> bool {
        match self.access_token().await {
            Ok(_) => true,
            Err(e) => {
                log::info!("YouTube is not authorized: {}", e);
                false
            }
        }
    }

    pub async fn authorization_url(&self) -> Result<String, UploadError> {
        OAuthClientSecrets::load(&self.secrets_file).await?.authorization_url()
    }

    /// Finishes the code flow and stores the new token.
    pub async fn complete_authorization(&self, code: &str) -> Result<(), UploadError> {
        let secrets = OAuthClientSecrets::load(&self.secrets_file).await?;
        let token = secrets.exchange_code(&self.http, code).await?;
        token.save(&self.token_file).await?;
        log::info!("✅ YouTube token saved to {}", self.token_file.display());
        Ok(())
    }
}
