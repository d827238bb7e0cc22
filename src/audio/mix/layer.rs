//! External producers mixed into a secondary destination.
//!
//! An external source (e.g. a companion music player) pushes PCM at its own
//! cadence; the layer buffers it in a [`SampleRing`] and drains one quantum
//! per render.

use flume::Receiver;

use crate::{
    audio::{buffer::SampleRing, constants::LAYER_BUFFER_SAMPLES},
    common::{ContextId, PooledBuffer, SourceId},
};

/// Handle to a producer registered with a mix context. Cheap to clone; every
/// clone reads from the same queue.
#[derive(Clone, Debug)]
pub struct ExternalSource {
    id: SourceId,
    context: ContextId,
    label: String,
    rx: Receiver<PooledBuffer>,
}

impl ExternalSource {
    pub(crate) fn new(id: SourceId, context: ContextId, label: String, rx: Receiver<PooledBuffer>) -> Self {
        Self {
            id,
            context,
            label,
            rx,
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Every sender was dropped, so nothing more will ever arrive.
    pub fn is_hung_up(&self) -> bool {
        self.rx.is_disconnected()
    }
}

pub struct ExternalLayer {
    source: SourceId,
    rx: Receiver<PooledBuffer>,
    ring: SampleRing,
    gain: f32,
    finished: bool,
}

impl ExternalLayer {
    pub fn new(source: &ExternalSource, gain: f32) -> Self {
        Self {
            source: source.id,
            rx: source.rx.clone(),
            ring: SampleRing::new(LAYER_BUFFER_SAMPLES),
            gain: gain.clamp(0.0, 1.0),
            finished: false,
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Drain queued frames into the ring.
    pub fn fill(&mut self) {
        while let Ok(frame) = self.rx.try_recv() {
            self.ring.write(&frame);
        }
        if self.rx.is_disconnected() {
            self.finished = true;
        }
    }

    /// The producer hung up and everything it sent has been mixed.
    pub fn is_dead(&self) -> bool {
        self.finished && self.ring.is_empty()
    }

    pub fn accumulate(&mut self, acc: &mut [i32]) {
        self.ring.accumulate_into(acc, self.gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_queue_then_dies_after_hangup() {
        let (tx, rx) = flume::unbounded();
        let source = ExternalSource::new(SourceId(1), ContextId::generate(), "player".into(), rx);
        let mut layer = ExternalLayer::new(&source, 1.0);
        drop(source);

        tx.send(vec![10, 20, 30, 40]).unwrap();
        drop(tx);

        layer.fill();
        assert!(!layer.is_dead());

        let mut acc = vec![0i32; 4];
        layer.accumulate(&mut acc);
        assert_eq!(acc, vec![10, 20, 30, 40]);
        assert!(layer.is_dead());
    }
}
