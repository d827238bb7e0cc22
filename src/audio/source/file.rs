use async_trait::async_trait;
use bytes::Bytes;

use super::AssetFetcher;
use crate::common::AssetError;

/// Reads loops from the local filesystem. Accepts plain paths and `file://` URLs.
pub struct FileFetcher;

#[async_trait]
impl AssetFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, AssetError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| AssetError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}
