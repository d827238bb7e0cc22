//! Joins the visual capture and the mixed audio into one stream.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    audio::{MediaTrack, TrackKind, TrackRegistry},
    common::RoutingError,
};

/// Video tracks produced by a visual capture.
pub type VisualStream = Vec<MediaTrack>;

/// Something the secondary surface can show.
pub trait VisualSource: Send + Sync {
    fn capture(&self, registry: &Arc<TrackRegistry>) -> VisualStream;
}

/// A single still/animated canvas.
#[derive(Debug, Clone)]
pub struct CanvasCapture {
    label: String,
}

impl CanvasCapture {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl Default for CanvasCapture {
    fn default() -> Self {
        Self::new("canvas")
    }
}

impl VisualSource for CanvasCapture {
    fn capture(&self, registry: &Arc<TrackRegistry>) -> VisualStream {
        vec![registry.video_track(self.label.clone())]
    }
}

/// Tracks handed to the surface. Clones share the same tracks.
#[derive(Debug, Clone)]
pub struct CombinedStream {
    tracks: Arc<Vec<Arc<MediaTrack>>>,
}

impl CombinedStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            tracks: Arc::new(tracks.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn audio_track(&self) -> Option<Arc<MediaTrack>> {
        self.tracks
            .iter()
            .find(|t| t.kind() == TrackKind::Audio)
            .cloned()
    }

    pub fn video_tracks(&self) -> usize {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .count()
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    fn stop(&self) -> usize {
        let live = self.tracks.iter().filter(|t| t.is_live()).count();
        for track in self.tracks.iter() {
            track.stop();
        }
        live
    }
}

/// Owns the current [`CombinedStream`] so it can be released before a new
/// one is built.
#[derive(Default)]
pub struct StreamBridge {
    current: Mutex<Option<CombinedStream>>,
}

impl StreamBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the previous stream, then combine `visual` and `audio`.
    /// Either side may be missing, but not both.
    pub fn combine(
        &self,
        visual: VisualStream,
        audio: Option<MediaTrack>,
    ) -> Result<CombinedStream, RoutingError> {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            let stopped = previous.stop();
            debug!("released {} tracks of previous stream", stopped);
        }

        if visual.is_empty() && audio.is_none() {
            return Err(RoutingError::NoTracks);
        }
        if audio.is_none() {
            warn!("secondary stream has no audio track");
        }
        if visual.is_empty() {
            debug!("secondary stream is audio-only");
        }

        let mut tracks = visual;
        tracks.extend(audio);
        let stream = CombinedStream::new(tracks);
        *current = Some(stream.clone());
        Ok(stream)
    }

    /// Stop every track of the current stream. Returns how many were live.
    pub fn release(&self) -> usize {
        self.current.lock().take().map_or(0, |s| s.stop())
    }

    pub fn current(&self) -> Option<CombinedStream> {
        self.current.lock().clone()
    }
}
