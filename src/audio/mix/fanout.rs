//! Media tracks and the fan-out that feeds them.
//!
//! Every output of the graph (the normal output and each secondary
//! destination) pushes its rendered quanta into a [`FrameFanout`]. Consumers
//! subscribe and receive a [`MediaTrack`] carrying a bounded frame receiver.
//! A [`TrackRegistry`] counts live tracks so leaks are observable.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use flume::{Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::trace;

use crate::{
    audio::constants::TRACK_QUEUE_FRAMES,
    common::{PooledBuffer, TrackId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Default)]
pub struct TrackRegistry {
    next_id: AtomicU64,
    live: AtomicUsize,
}

impl TrackRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Tracks created and not yet stopped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn open(self: &Arc<Self>, kind: TrackKind, label: String, frames: Option<Receiver<PooledBuffer>>) -> MediaTrack {
        self.live.fetch_add(1, Ordering::AcqRel);
        MediaTrack {
            id: TrackId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            kind,
            label,
            ended: Arc::new(AtomicBool::new(false)),
            registry: self.clone(),
            frames,
        }
    }

    /// A frameless video track, as produced by a visual capture.
    pub fn video_track(self: &Arc<Self>, label: impl Into<String>) -> MediaTrack {
        self.open(TrackKind::Video, label.into(), None)
    }
}

/// A live media track. Stopping is idempotent; dropping stops.
#[derive(Debug)]
pub struct MediaTrack {
    id: TrackId,
    kind: TrackKind,
    label: String,
    ended: Arc<AtomicBool>,
    registry: Arc<TrackRegistry>,
    frames: Option<Receiver<PooledBuffer>>,
}

impl MediaTrack {
    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        !self.ended.load(Ordering::Acquire)
    }

    /// Rendered frames, for audio tracks.
    pub fn frames(&self) -> Option<&Receiver<PooledBuffer>> {
        self.frames.as_ref()
    }

    pub fn stop(&self) {
        if !self.ended.swap(true, Ordering::AcqRel) {
            self.registry.live.fetch_sub(1, Ordering::AcqRel);
            trace!("{} ({}) stopped", self.id, self.label);
        }
    }
}

impl Drop for MediaTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Subscriber {
    tx: Sender<PooledBuffer>,
    ended: Arc<AtomicBool>,
}

/// Broadcasts rendered quanta to every live subscriber.
pub struct FrameFanout {
    name: String,
    registry: Arc<TrackRegistry>,
    subscribers: Vec<Subscriber>,
    dropped: u64,
}

impl FrameFanout {
    pub fn new(name: impl Into<String>, registry: Arc<TrackRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            subscribers: Vec::new(),
            dropped: 0,
        }
    }

    pub fn subscribe(&mut self) -> MediaTrack {
        let (tx, rx) = flume::bounded(TRACK_QUEUE_FRAMES);
        let track = self
            .registry
            .open(TrackKind::Audio, self.name.clone(), Some(rx));
        self.subscribers.push(Subscriber {
            tx,
            ended: track.ended.clone(),
        });
        track
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| !s.ended.load(Ordering::Acquire))
            .count()
    }

    /// Frames discarded because a subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn push(&mut self, frame: &[i16]) {
        let mut dropped = 0;
        self.subscribers.retain(|sub| {
            if sub.ended.load(Ordering::Acquire) {
                return false;
            }
            match sub.tx.try_send(frame.to_vec()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        self.dropped += dropped;
    }

    /// Detach every subscriber. Their tracks see a disconnected receiver.
    pub fn close(&mut self) {
        self.subscribers.clear();
    }
}
