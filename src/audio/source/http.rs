use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::AssetFetcher;
use crate::{
    audio::constants::{HTTP_KEEPALIVE_SECS, HTTP_USER_AGENT},
    common::{AnyResult, AssetError},
};

/// Build the `reqwest::Client` used for loop downloads.
///
/// No request or connect timeout is set: a slow download leaves its channel
/// silent until it resolves or fails on its own.
pub fn create_client(user_agent: &str) -> AnyResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        // Disable Nagle's algorithm; loops are fetched in one burst.
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(HTTP_KEEPALIVE_SECS))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(70))
        .build()?;
    Ok(client)
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> AnyResult<Self> {
        Ok(Self {
            client: create_client(HTTP_USER_AGENT)?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, AssetError> {
        let fail = |reason: String| AssetError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status)));
        }

        response.bytes().await.map_err(|e| fail(e.to_string()))
    }
}
