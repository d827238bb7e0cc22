//! The consumer end of the secondary route: a picture-in-picture surface
//! that plays a [`CombinedStream`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::bridge::CombinedStream;
use crate::{audio::MediaTrack, common::SurfaceError};

#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Bind a new stream, replacing (not releasing) the previous one.
    fn attach(&self, stream: CombinedStream);

    fn detach(&self) -> Option<CombinedStream>;

    async fn play(&self) -> Result<(), SurfaceError>;

    fn pause(&self);

    fn is_paused(&self) -> bool;

    /// Audio frames taken off the stream while playing.
    fn frames_consumed(&self) -> u64;
}

#[derive(Default)]
struct Binding {
    stream: Option<CombinedStream>,
    pump: Option<CancellationToken>,
}

/// In-process surface that drains the audio track of its stream.
pub struct PipSurface {
    binding: Mutex<Binding>,
    paused: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
}

impl Default for PipSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PipSurface {
    pub fn new() -> Self {
        Self {
            binding: Mutex::new(Binding::default()),
            paused: Arc::new(AtomicBool::new(true)),
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn stream(&self) -> Option<CombinedStream> {
        self.binding.lock().stream.clone()
    }

    fn spawn_pump(&self, track: Arc<MediaTrack>) -> CancellationToken {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let paused = self.paused.clone();
        let frames = self.frames.clone();

        tokio::spawn(async move {
            let Some(rx) = track.frames() else {
                return;
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = rx.recv_async() => match frame {
                        Ok(_) if !paused.load(Ordering::Acquire) => {
                            frames.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    },
                }
            }
            trace!("surface pump for {} exited", track.id());
        });
        token
    }
}

#[async_trait]
impl PlaybackSurface for PipSurface {
    fn attach(&self, stream: CombinedStream) {
        let mut binding = self.binding.lock();
        if let Some(pump) = binding.pump.take() {
            pump.cancel();
        }
        debug!("surface bound to {} tracks", stream.tracks().len());
        binding.stream = Some(stream);
        self.paused.store(true, Ordering::Release);
    }

    fn detach(&self) -> Option<CombinedStream> {
        let mut binding = self.binding.lock();
        if let Some(pump) = binding.pump.take() {
            pump.cancel();
        }
        self.paused.store(true, Ordering::Release);
        binding.stream.take()
    }

    async fn play(&self) -> Result<(), SurfaceError> {
        let mut binding = self.binding.lock();
        let stream = binding.stream.as_ref().ok_or(SurfaceError::Detached)?;
        if binding.pump.is_none() {
            if let Some(track) = stream.audio_track() {
                let pump = self.spawn_pump(track);
                binding.pump = Some(pump);
            }
        }
        self.paused.store(false, Ordering::Release);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn frames_consumed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}
