//! Test doubles shared by unit tests across the crate.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::{
    audio::{AssetFetcher, BufferCache, PcmBuffer, PcmDecoder},
    catalog::{SoundCatalog, TierThresholds},
    common::{AssetError, AssetId, SurfaceError},
    configs::MixerConfig,
    player::ChannelPlayer,
    secondary::{CombinedStream, PlaybackSurface},
    session::{EventBus, MixSession},
};

pub const CHANNELS: [&str; 3] = ["rain", "wind", "birds"];

/// Keeps a fetch in flight until released.
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn release(&self) {
        self.0.close();
    }
}

/// In-memory fetcher. Unknown URLs fail with [`AssetError::Fetch`].
#[derive(Default)]
pub struct MemoryFetcher {
    assets: Mutex<HashMap<String, Bytes>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `samples` as raw little-endian PCM.
    pub fn insert(&self, url: &str, samples: Vec<i16>) {
        let mut raw = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            raw.write_i16::<LittleEndian>(s).unwrap();
        }
        self.assets.lock().insert(url.to_string(), Bytes::from(raw));
    }

    pub fn remove(&self, url: &str) {
        self.assets.lock().remove(url);
    }

    pub fn hold(&self, url: &str) -> Gate {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(url.to_string(), gate.clone());
        Gate(gate)
    }

    pub fn fetches(&self, url: &str) -> usize {
        self.fetches.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, AssetError> {
        *self.fetches.lock().entry(url.to_string()).or_default() += 1;

        let gate = self.gates.lock().get(url).cloned();
        if let Some(gate) = gate {
            // Closed on release, which wakes every waiter.
            let _ = gate.acquire().await;
        }

        self.assets
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| AssetError::Fetch {
                url: url.to_string(),
                reason: "not found".into(),
            })
    }
}

/// Interprets bytes as interleaved stereo s16le at 48 kHz.
pub struct RawDecoder;

impl PcmDecoder for RawDecoder {
    fn decode(&self, _asset: &AssetId, _url: &str, bytes: Bytes) -> Result<PcmBuffer, AssetError> {
        let samples = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(PcmBuffer::new(samples, 48_000, 2))
    }
}

/// A minimal PCM WAV file.
pub fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_len).unwrap();
    out.extend_from_slice(b"WAVEfmt ");
    out.write_u32::<LittleEndian>(16).unwrap();
    out.write_u16::<LittleEndian>(1).unwrap();
    out.write_u16::<LittleEndian>(channels).unwrap();
    out.write_u32::<LittleEndian>(sample_rate).unwrap();
    out.write_u32::<LittleEndian>(sample_rate * channels as u32 * 2).unwrap();
    out.write_u16::<LittleEndian>(channels * 2).unwrap();
    out.write_u16::<LittleEndian>(16).unwrap();
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_len).unwrap();
    for &s in samples {
        out.write_i16::<LittleEndian>(s).unwrap();
    }
    out
}

pub fn offline_config() -> MixerConfig {
    MixerConfig {
        render_clock: false,
        tier_hysteresis: 0.02,
        ..Default::default()
    }
}

pub fn test_catalog() -> SoundCatalog {
    let mut catalog = SoundCatalog::default();
    for channel in CHANNELS {
        let urls = ["soft", "moderate", "strong"].map(|tier| format!("mem://{}/{}", channel, tier));
        catalog
            .insert(channel, [&urls[0], &urls[1], &urls[2]])
            .unwrap();
    }
    catalog
}

/// A session, cache and player wired over an in-memory fetcher.
pub struct Rig {
    pub fetcher: Arc<MemoryFetcher>,
    pub cache: Arc<BufferCache>,
    pub session: Arc<MixSession>,
    pub player: Arc<ChannelPlayer>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(MemoryFetcher::new()))
    }

    pub fn with_fetcher(fetcher: Arc<MemoryFetcher>) -> Self {
        Self::with_config(fetcher, offline_config())
    }

    pub fn with_config(fetcher: Arc<MemoryFetcher>, config: MixerConfig) -> Self {
        for channel in CHANNELS {
            for tier in ["soft", "moderate", "strong"] {
                fetcher.insert(&format!("mem://{}/{}", channel, tier), vec![100; 1_920]);
            }
        }

        let thresholds = TierThresholds::from_config(&config);
        let cache = Arc::new(BufferCache::new(fetcher.clone(), Arc::new(RawDecoder)));
        let session = Arc::new(MixSession::new(config, EventBus::default()));
        let player = Arc::new(ChannelPlayer::new(
            Arc::new(test_catalog()),
            cache.clone(),
            session.clone(),
            thresholds,
        ));
        Self {
            fetcher,
            cache,
            session,
            player,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.session
            .context()
            .map_or(0, |ctx| ctx.graph().voice_count())
    }

    pub fn voice_gains(&self) -> Vec<f32> {
        self.session.context().map_or_else(Vec::new, |ctx| {
            ctx.graph().voices().iter().map(|v| v.gain).collect()
        })
    }
}

/// A surface whose behaviour tests steer directly.
pub struct ScriptedSurface {
    stream: Mutex<Option<CombinedStream>>,
    paused: AtomicBool,
    reject: AtomicBool,
    frames: AtomicU64,
    attaches: AtomicUsize,
    plays: AtomicUsize,
}

impl Default for ScriptedSurface {
    fn default() -> Self {
        Self {
            stream: Mutex::new(None),
            paused: AtomicBool::new(true),
            reject: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            attaches: AtomicUsize::new(0),
            plays: AtomicUsize::new(0),
        }
    }
}

impl ScriptedSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_play(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Pause as the environment would, without going through the output.
    pub fn force_pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn consume(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::SeqCst);
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stream(&self) -> Option<CombinedStream> {
        self.stream.lock().clone()
    }
}

#[async_trait]
impl PlaybackSurface for ScriptedSurface {
    fn attach(&self, stream: CombinedStream) {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        *self.stream.lock() = Some(stream);
        self.paused.store(true, Ordering::SeqCst);
    }

    fn detach(&self) -> Option<CombinedStream> {
        self.paused.store(true, Ordering::SeqCst);
        self.stream.lock().take()
    }

    async fn play(&self) -> Result<(), SurfaceError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.stream.lock().is_none() {
            return Err(SurfaceError::Detached);
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(SurfaceError::PlaybackRejected("not allowed".into()));
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn frames_consumed(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}
