//! Coalescing decode cache.
//!
//! One entry per [`AssetId`]. The first request stores a shared in-flight
//! future; concurrent requests for the same id await that same future, so an
//! asset is fetched at most once while its decode is pending. Failed decodes
//! are dropped from the map so the next request retries.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::pcm::DecodedBuffer;
use crate::{
    audio::{pipeline::PcmDecoder, source::AssetFetcher},
    common::{AssetError, AssetId},
};

type PendingDecode = Shared<BoxFuture<'static, Result<DecodedBuffer, AssetError>>>;

pub struct BufferCache {
    fetcher: Arc<dyn AssetFetcher>,
    decoder: Arc<dyn PcmDecoder>,
    entries: Mutex<HashMap<AssetId, PendingDecode>>,
    fetches: Arc<AtomicU64>,
}

impl BufferCache {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, decoder: Arc<dyn PcmDecoder>) -> Self {
        Self {
            fetcher,
            decoder,
            entries: Mutex::new(HashMap::new()),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Resolve the decoded buffer for `id`, fetching `url` on first use.
    pub async fn get(&self, id: &AssetId, url: &str) -> Result<DecodedBuffer, AssetError> {
        let pending = {
            let mut entries = self.entries.lock();
            entries
                .entry(id.clone())
                .or_insert_with(|| self.load(id.clone(), url.to_string()))
                .clone()
        };

        let result = pending.clone().await;

        if let Err(e) = &result {
            let mut entries = self.entries.lock();
            // A retry may already have replaced the failed entry.
            if entries.get(id).is_some_and(|current| current.ptr_eq(&pending)) {
                entries.remove(id);
                debug!("Dropped failed cache entry for {}: {}", id, e);
            }
        }

        result
    }

    fn load(&self, id: AssetId, url: String) -> PendingDecode {
        let fetcher = self.fetcher.clone();
        let decoder = self.decoder.clone();
        let fetches = self.fetches.clone();

        async move {
            fetches.fetch_add(1, Ordering::Relaxed);
            debug!("Fetching {} from {}", id, url);
            let bytes = fetcher.fetch(&url).await?;

            let asset = id.clone();
            let buffer = tokio::task::spawn_blocking(move || decoder.decode(&asset, &url, bytes))
                .await
                .map_err(|e| AssetError::Decode {
                    asset: id.clone(),
                    reason: e.to_string(),
                })??;

            if buffer.is_empty() {
                warn!("{} decoded to an empty buffer", id);
            }
            debug!(
                "Decoded {}: {} frames @ {} Hz",
                id,
                buffer.frames(),
                buffer.sample_rate()
            );
            Ok(Arc::new(buffer))
        }
        .boxed()
        .shared()
    }

    /// The decoded buffer for `id` if its decode already finished successfully.
    pub fn peek(&self, id: &AssetId) -> Option<DecodedBuffer> {
        let entries = self.entries.lock();
        entries
            .get(id)
            .and_then(|pending| pending.peek())
            .and_then(|result| result.as_ref().ok().cloned())
    }

    /// Forget `id`. Voices already holding the buffer keep playing it.
    pub fn evict(&self, id: &AssetId) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of network/file fetches issued since creation.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}
