use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const MAX_PROFILE_BYTES: usize = 16 * 1024;

/// Authoritative identity record for a player.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CanonicalUser {
    pub name: String,
    #[serde(rename = "id")]
    pub canonical_id: String,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("not found")]
    NotFound,
    #[error("upstream returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("upstream response too large from {url}")]
    TooLarge { url: String },
    #[error("upstream request failed for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("invalid upstream response from {url}")]
    InvalidResponse { url: String },
}

impl UpstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Remote store of raw skin textures, keyed by player name.
#[async_trait]
pub trait SkinStore: Send + Sync {
    async fn fetch_skin(&self, name: &str) -> Result<Bytes, UpstreamError>;
}

/// Remote identity service mapping a requested name to its canonical user.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn resolve_user(&self, name: &str) -> Result<CanonicalUser, UpstreamError>;
}

#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    skin_store_url: Url,
    profile_api_url: Url,
    max_skin_bytes: usize,
}

impl HttpUpstream {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .user_agent(concat!("head-renderer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            client,
            skin_store_url: parse_base(&config.skin_store_url)?,
            profile_api_url: parse_base(&config.profile_api_url)?,
            max_skin_bytes: config.max_skin_bytes,
        })
    }

    fn skin_url(&self, name: &str) -> Url {
        endpoint(&self.skin_store_url, &format!("{name}.png"))
    }

    fn profile_url(&self, name: &str) -> Url {
        endpoint(&self.profile_api_url, name)
    }

    async fn get_bytes(&self, url: &str, max_bytes: usize) -> Result<Bytes, UpstreamError> {
        let transport = |err: reqwest::Error| UpstreamError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        };
        let mut response = self.client.get(url).send().await.map_err(transport)?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Err(UpstreamError::NotFound),
            status => {
                return Err(UpstreamError::Status {
                    status,
                    url: url.to_string(),
                });
            }
        }
        if let Some(length) = response.content_length() {
            if length > max_bytes as u64 {
                return Err(UpstreamError::TooLarge {
                    url: url.to_string(),
                });
            }
        }
        let mut buffer = BytesMut::with_capacity(max_bytes.min(16 * 1024));
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if buffer.len().saturating_add(chunk.len()) > max_bytes {
                return Err(UpstreamError::TooLarge {
                    url: url.to_string(),
                });
            }
            buffer.extend_from_slice(&chunk);
        }
        debug!(url = %url, size = buffer.len(), "fetched upstream bytes");
        Ok(buffer.freeze())
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid upstream url {raw}"))?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("upstream url {raw} cannot take a path"));
    }
    Ok(url)
}

/// Appends `segment` as one percent-encoded path segment.
fn endpoint(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(segment);
    }
    url
}

#[async_trait]
impl SkinStore for HttpUpstream {
    async fn fetch_skin(&self, name: &str) -> Result<Bytes, UpstreamError> {
        self.get_bytes(self.skin_url(name).as_str(), self.max_skin_bytes)
            .await
    }
}

#[async_trait]
impl ProfileLookup for HttpUpstream {
    async fn resolve_user(&self, name: &str) -> Result<CanonicalUser, UpstreamError> {
        let url = self.profile_url(name).to_string();
        let bytes = self.get_bytes(&url, MAX_PROFILE_BYTES).await?;
        let user: CanonicalUser =
            serde_json::from_slice(&bytes).map_err(|_| UpstreamError::InvalidResponse {
                url: url.clone(),
            })?;
        if user.name.is_empty() || user.canonical_id.is_empty() {
            return Err(UpstreamError::InvalidResponse { url });
        }
        Ok(user)
    }
}
