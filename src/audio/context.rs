//! `MixContext`: the shared processing context.
//!
//! Owns the [`MixGraph`] and its lifecycle. Rendering only happens while the
//! context is `Running`; the environment can suspend it at any time and an
//! OS-level interruption additionally blocks `resume` until it is lifted.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
};

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    clock,
    constants::TRACK_QUEUE_FRAMES,
    mix::{ExternalSource, MixGraph, TrackRegistry},
};
use crate::{
    common::{ContextError, ContextId, PooledBuffer, SourceId},
    configs::MixerConfig,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ContextState {
    Running = 0,
    Suspended = 1,
    Closed = 2,
}

impl ContextState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Suspended,
            _ => Self::Closed,
        }
    }
}

pub struct MixContext {
    id: ContextId,
    state: AtomicU8,
    interrupted: AtomicBool,
    graph: Mutex<MixGraph>,
    registry: Arc<TrackRegistry>,
    config: MixerConfig,
    next_source: AtomicU64,
    cancel: CancellationToken,
}

impl MixContext {
    /// Create a running context and, when enabled and a runtime is present,
    /// start its render clock.
    pub fn new(config: &MixerConfig) -> Arc<Self> {
        let id = ContextId::generate();
        let registry = TrackRegistry::new();
        let ctx = Arc::new(Self {
            id,
            state: AtomicU8::new(ContextState::Running as u8),
            interrupted: AtomicBool::new(false),
            graph: Mutex::new(MixGraph::new(id, registry.clone(), config.frames_per_quantum())),
            registry,
            config: config.clone(),
            next_source: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });

        if config.render_clock {
            match tokio::runtime::Handle::try_current() {
                Ok(_) => clock::spawn_render_clock(
                    Arc::downgrade(&ctx),
                    std::time::Duration::from_millis(config.quantum_ms.max(1)),
                    ctx.cancel.child_token(),
                ),
                Err(_) => warn!("{}: no async runtime, render clock not started", id),
            }
        }

        info!(
            "{} created ({} Hz, {} ms quantum)",
            id, config.sample_rate, config.quantum_ms
        );
        ctx
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContextState::Running
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Resume rendering. Fails while interrupted or once closed.
    pub async fn resume(&self) -> Result<(), ContextError> {
        match self.state() {
            ContextState::Closed => return Err(ContextError::Closed(self.id)),
            _ if self.is_interrupted() => return Err(ContextError::Interrupted(self.id)),
            ContextState::Running => return Ok(()),
            ContextState::Suspended => {}
        }

        // Resuming is a suspension point; the environment may close or
        // interrupt the context meanwhile.
        tokio::task::yield_now().await;

        if self.is_interrupted() {
            return Err(ContextError::Interrupted(self.id));
        }
        match self.state.compare_exchange(
            ContextState::Suspended as u8,
            ContextState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                info!("{} resumed", self.id);
                Ok(())
            }
            Err(current) if current == ContextState::Running as u8 => Ok(()),
            Err(_) => Err(ContextError::Closed(self.id)),
        }
    }

    /// Returns `true` if the context was running.
    pub fn suspend(&self) -> bool {
        let suspended = self
            .state
            .compare_exchange(
                ContextState::Running as u8,
                ContextState::Suspended as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if suspended {
            debug!("{} suspended", self.id);
        }
        suspended
    }

    /// An interruption suspends the context and blocks `resume` until lifted.
    pub fn set_interrupted(&self, interrupted: bool) {
        let was = self.interrupted.swap(interrupted, Ordering::AcqRel);
        if interrupted {
            self.suspend();
        }
        if was != interrupted {
            info!(
                "{} interruption {}",
                self.id,
                if interrupted { "began" } else { "ended" }
            );
        }
    }

    pub fn close(&self) {
        let previous = self.state.swap(ContextState::Closed as u8, Ordering::AcqRel);
        self.cancel.cancel();
        if previous != ContextState::Closed as u8 {
            info!("{} closed", self.id);
        }
    }

    pub fn graph(&self) -> MutexGuard<'_, MixGraph> {
        self.graph.lock()
    }

    pub fn registry(&self) -> &Arc<TrackRegistry> {
        &self.registry
    }

    /// Render one quantum if running. Returns whether anything was rendered.
    pub fn render_quantum(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.graph.lock().render();
        true
    }

    /// Register an external producer bound to this context. The sender
    /// takes interleaved stereo frames at the mix rate; producers should use
    /// `try_send` so an unconnected source never blocks them.
    pub fn create_external_source(&self, label: impl Into<String>) -> (flume::Sender<PooledBuffer>, ExternalSource) {
        let (tx, rx) = flume::bounded(TRACK_QUEUE_FRAMES);
        let id = SourceId(self.next_source.fetch_add(1, Ordering::Relaxed) + 1);
        (tx, ExternalSource::new(id, self.id, label.into(), rx))
    }
}

impl Drop for MixContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> MixerConfig {
        MixerConfig {
            render_clock: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn suspend_and_resume() {
        let ctx = MixContext::new(&offline());
        assert!(ctx.suspend());
        assert!(!ctx.render_quantum());

        ctx.resume().await.unwrap();
        assert!(ctx.render_quantum());
        assert_eq!(ctx.graph().quanta_rendered(), 1);
    }

    #[tokio::test]
    async fn interruption_blocks_resume_until_lifted() {
        let ctx = MixContext::new(&offline());
        ctx.set_interrupted(true);
        assert_eq!(ctx.state(), ContextState::Suspended);
        assert_eq!(ctx.resume().await, Err(ContextError::Interrupted(ctx.id())));

        ctx.set_interrupted(false);
        ctx.resume().await.unwrap();
        assert!(ctx.is_running());
    }

    #[tokio::test]
    async fn closed_contexts_stay_closed() {
        let ctx = MixContext::new(&offline());
        ctx.close();
        assert_eq!(ctx.resume().await, Err(ContextError::Closed(ctx.id())));
        assert!(!ctx.suspend());
    }

    #[tokio::test]
    async fn render_clock_advances_the_graph() {
        let config = MixerConfig {
            quantum_ms: 5,
            ..Default::default()
        };
        let ctx = MixContext::new(&config);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(ctx.graph().quanta_rendered() > 0);
        ctx.close();
    }

    #[test]
    fn external_sources_carry_the_context() {
        let ctx = MixContext::new(&offline());
        let (_tx, a) = ctx.create_external_source("player");
        let (_tx2, b) = ctx.create_external_source("player");
        assert_eq!(a.context(), ctx.id());
        assert_ne!(a.id(), b.id());
    }
}
