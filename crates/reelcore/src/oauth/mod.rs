//! Bearer tokens for the Sber APIs (GigaChat, SaluteSpeech).
//!
//! A [`TokenProvider`] owns a background task that keeps one access token
//! fresh and publishes it through a `watch` channel. Readers never wait on
//! the network: [`TokenProvider::get_token`] either returns the current
//! token or fails immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config;
use crate::core::error::AppResult;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token was not received within {0:?}")]
    NotReady(Duration),

    #[error("no valid access token")]
    NoValidToken,

    #[error("credentials are not configured: {0}")]
    MissingCredentials(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OAuth endpoint returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
}

/// A bearer token with its expiry
#[derive(Debug)]
pub struct AccessToken {
    pub value: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl Clone for AccessToken {
    fn clone(&self) -> Self {
        Self::new(self.value.expose_secret(), self.expires_at)
    }
}

/// Obtains a fresh token from an OAuth endpoint.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken, TokenError>;
}

/// How long to wait before the next refresh.
///
/// One minute before expiry, but never sooner than a minute from now.
/// An already expired token is retried quickly.
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = (expires_at - now).num_seconds();
    if remaining <= 0 {
        return Duration::from_secs(config::sber::TOKEN_RETRY_SECS);
    }
    let secs = (remaining as u64)
        .saturating_sub(config::sber::TOKEN_REFRESH_MARGIN_SECS)
        .max(config::sber::TOKEN_MIN_REFRESH_SECS);
    Duration::from_secs(secs)
}

/// Keeps a token fresh in the background.
///
/// The refresh task stops on [`TokenProvider::shutdown`] or when the provider is dropped.
pub struct TokenProvider {
    name: String,
    rx: watch::Receiver<Option<AccessToken>>,
    task: JoinHandle<()>,
}

impl TokenProvider {
    /// Spawns the refresh task. Must be called inside a tokio runtime.
    pub fn spawn(name: impl Into<String>, fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self::spawn_with_retry(name, fetcher, Duration::from_secs(config::sber::TOKEN_RETRY_SECS))
    }

    /// Same as [`TokenProvider::spawn`] with a custom pause after failures.
    pub fn spawn_with_retry(name: impl Into<String>, fetcher: Arc<dyn TokenFetcher>, retry_delay: Duration) -> Self {
        let name = name.into();
        let (tx, rx) = watch::channel(None);
        let task_name = name.clone();

        let task = tokio::spawn(async move {
            loop {
                let delay = match fetcher.fetch().await {
                    Ok(token) => {
                        let delay = refresh_delay(token.expires_at, Utc::now());
                        log::info!("🔑 {} token received. Next refresh in {}s", task_name, delay.as_secs());
                        tx.send_replace(Some(token));
                        delay
                    }
                    Err(e) => {
                        log::error!("{} token refresh failed: {}", task_name, e);
                        retry_delay
                    }
                };

                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
            log::debug!("{} token refresh task stopped", task_name);
        });

        Self { name, rx, task }
    }

    /// Waits until the first token arrives.
    ///
    /// Logs an error and returns [`TokenError::NotReady`] on timeout; the
    /// refresh task keeps trying in the background.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), TokenError> {
        let mut rx = self.rx.clone();
        let result = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => {
                log::error!("Initial {} token not received within {:?}", self.name, timeout);
                Err(TokenError::NotReady(timeout))
            }
        };
        result
    }

    /// Current token, or [`TokenError::NoValidToken`] if none is valid right now.
    pub fn get_token(&self) -> Result<SecretString, TokenError> {
        match &*self.rx.borrow() {
            Some(token) if token.is_valid_at(Utc::now()) => Ok(SecretString::from(token.value.expose_secret().to_string())),
            _ => Err(TokenError::NoValidToken),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.get_token().is_ok()
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for TokenProvider {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Deserialize)]
struct OAuthResponse {
    access_token: String,
    /// Milliseconds since the epoch
    expires_at: i64,
}

/// Sber NGW OAuth: `Basic` authorization key plus scope, answers with a 30 min token.
pub struct SberOAuthFetcher {
    http: reqwest::Client,
    url: String,
    credentials: SecretString,
    scope: String,
}

impl SberOAuthFetcher {
    pub fn new(http: reqwest::Client, url: impl Into<String>, credentials: SecretString, scope: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            credentials,
            scope: scope.into(),
        }
    }

    /// Fetcher for SaluteSpeech using `SALUT_CREDENTIALS`.
    pub fn salute_from_env(http: reqwest::Client) -> Result<Self, TokenError> {
        let credentials = config::sber::SALUT_CREDENTIALS
            .as_ref()
            .ok_or(TokenError::MissingCredentials("SALUT_CREDENTIALS"))?;
        Ok(Self::new(
            http,
            config::sber::OAUTH_URL.as_str(),
            SecretString::from(credentials.expose_secret().to_string()),
            config::sber::SALUT_SCOPE,
        ))
    }

    /// Fetcher for GigaChat using `GIGACHAT_CREDENTIALS`.
    pub fn gigachat_from_env(http: reqwest::Client) -> Result<Self, TokenError> {
        let credentials = config::sber::GIGACHAT_CREDENTIALS
            .as_ref()
            .ok_or(TokenError::MissingCredentials("GIGACHAT_CREDENTIALS"))?;
        Ok(Self::new(
            http,
            config::sber::OAUTH_URL.as_str(),
            SecretString::from(credentials.expose_secret().to_string()),
            config::sber::GIGACHAT_SCOPE,
        ))
    }
}

#[async_trait]
impl TokenFetcher for SberOAuthFetcher {
    async fn fetch(&self) -> Result<AccessToken, TokenError> {
        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Basic {}", self.credentials.expose_secret()))
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Status { status, body });
        }

        let data: OAuthResponse = response.json().await?;
        let expires_at = Utc
            .timestamp_millis_opt(data.expires_at)
            .single()
            .unwrap_or_else(Utc::now);
        log::debug!("Successfully obtained new bearer token for scope {}", self.scope);
        Ok(AccessToken::new(data.access_token, expires_at))
    }
}

/// HTTP client for the Sber endpoints, trusting `CA_BUNDLE_FILE` when set.
///
/// The Russian trusted root CA is distributed as a separate certificate
/// (PEM or DER); without it TLS to the Sber hosts fails.
pub fn sber_http_client() -> AppResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(config::sber::http_timeout());

    if let Some(path) = config::CA_BUNDLE_FILE.as_deref() {
        let bytes = fs_err::read(path)?;
        let cert = reqwest::Certificate::from_pem(&bytes).or_else(|_| reqwest::Certificate::from_der(&bytes))?;
        builder = builder.add_root_certificate(cert);
        log::info!("Trusting extra root certificate from {}", path);
    }

    Ok(builder.build()?)
}
