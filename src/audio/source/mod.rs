//! Where loop bytes come from.
//!
//! ```text
//! src/audio/source/
//! ├── mod.rs    ← AssetFetcher trait + AssetLoader scheme dispatch
//! ├── http.rs   ← HttpFetcher (reqwest)
//! └── file.rs   ← FileFetcher (tokio::fs)
//! ```

pub mod file;
pub mod http;

pub use file::FileFetcher;
pub use http::{HttpFetcher, create_client};

use async_trait::async_trait;
use bytes::Bytes;

use crate::common::{AnyResult, AssetError};

/// Retrieves the raw, still-encoded bytes of one loop variant.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, AssetError>;
}

/// Routes `http(s)://` URLs to the network and everything else to disk.
pub struct AssetLoader {
    http: HttpFetcher,
    file: FileFetcher,
}

impl AssetLoader {
    pub fn new() -> AnyResult<Self> {
        Ok(Self {
            http: HttpFetcher::new()?,
            file: FileFetcher,
        })
    }
}

#[async_trait]
impl AssetFetcher for AssetLoader {
    async fn fetch(&self, url: &str) -> Result<Bytes, AssetError> {
        if is_remote(url) {
            self.http.fetch(url).await
        } else {
            self.file.fetch(url).await
        }
    }
}

fn is_remote(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
