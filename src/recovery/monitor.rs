//! Health checks for an active secondary route.
//!
//! ```text
//!            activate                 resume failed / stalled / unusual transition
//!   Idle ───────────────► ActiveHealthy ─────────────────────────────────────► Recovering
//!    ▲                        ▲                                                   │
//!    │ deactivate             └──────────────── re-established ◄──────────────────┘
//!    └──────────────────────── (any state)
//! ```
//!
//! The monitor never touches the graph itself; it only drives a
//! [`RecoveryTarget`], so it can be ticked by hand in tests.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::{
    audio::ContextState,
    common::{ContextError, RoutingError, SurfaceError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorState {
    Idle,
    ActiveHealthy,
    Recovering,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle,
    Healthy,
    /// The suspended context was resumed.
    ContextResumed,
    /// The consumer surface was paused and has been told to play again.
    SurfaceResumed,
    /// Something is wrong; the route is rebuilt on the next tick.
    Degraded(String),
    Reestablished,
    ReestablishFailed(String),
    /// Too many consecutive recoveries. The caller must close the route.
    Exhausted,
}

/// What the monitor observes and repairs.
#[async_trait]
pub trait RecoveryTarget: Send + Sync {
    fn context_state(&self) -> Option<ContextState>;
    async fn resume_context(&self) -> Result<(), ContextError>;
    fn surface_paused(&self) -> bool;
    async fn resume_surface(&self) -> Result<(), SurfaceError>;
    /// `(quanta rendered by the context, frames consumed by the surface)`.
    fn progress(&self) -> (u64, u64);
    /// Full teardown and re-establishment of the route.
    async fn reestablish(&self, attempt: u32) -> Result<(), RoutingError>;
}

pub struct RecoveryMonitor {
    state: MonitorState,
    max_consecutive: u32,
    attempts: u32,
    last_progress: Option<(u64, u64)>,
    unusual_transition: bool,
}

impl RecoveryMonitor {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            state: MonitorState::Idle,
            max_consecutive: max_consecutive.max(1),
            attempts: 0,
            last_progress: None,
            unusual_transition: false,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn activate(&mut self) {
        self.state = MonitorState::ActiveHealthy;
        self.attempts = 0;
        self.last_progress = None;
        self.unusual_transition = false;
    }

    pub fn deactivate(&mut self) {
        self.state = MonitorState::Idle;
        self.attempts = 0;
        self.last_progress = None;
        self.unusual_transition = false;
    }

    /// The environment did something that warrants a full rebuild.
    pub fn flag_unusual_transition(&mut self) {
        if self.state == MonitorState::ActiveHealthy {
            self.unusual_transition = true;
        }
    }

    pub async fn tick(&mut self, target: &dyn RecoveryTarget) -> TickOutcome {
        match self.state {
            MonitorState::Idle => TickOutcome::Idle,
            MonitorState::Recovering => self.recover(target).await,
            MonitorState::ActiveHealthy => self.check(target).await,
        }
    }

    async fn recover(&mut self, target: &dyn RecoveryTarget) -> TickOutcome {
        self.attempts += 1;
        if self.attempts > self.max_consecutive {
            warn!(
                "Giving up after {} consecutive recoveries",
                self.max_consecutive
            );
            self.deactivate();
            return TickOutcome::Exhausted;
        }

        info!("Re-establishing secondary route (attempt {})", self.attempts);
        match target.reestablish(self.attempts).await {
            Ok(()) => {
                self.state = MonitorState::ActiveHealthy;
                self.last_progress = None;
                TickOutcome::Reestablished
            }
            Err(e) => {
                warn!("Re-establish attempt {} failed: {}", self.attempts, e);
                TickOutcome::ReestablishFailed(e.to_string())
            }
        }
    }

    fn degrade(&mut self, reason: String) -> TickOutcome {
        info!("Secondary route degraded: {}", reason);
        self.state = MonitorState::Recovering;
        self.last_progress = None;
        TickOutcome::Degraded(reason)
    }

    async fn check(&mut self, target: &dyn RecoveryTarget) -> TickOutcome {
        if std::mem::take(&mut self.unusual_transition) {
            return self.degrade("unusual environment transition".into());
        }

        let mut outcome = TickOutcome::Healthy;

        match target.context_state() {
            Some(ContextState::Running) => {}
            Some(ContextState::Suspended) => match target.resume_context().await {
                Ok(()) => {
                    debug!("Context resumed by monitor");
                    outcome = TickOutcome::ContextResumed;
                }
                Err(e) => return self.degrade(format!("resume failed: {}", e)),
            },
            Some(ContextState::Closed) | None => return self.degrade("context is gone".into()),
        }

        if target.surface_paused() {
            match target.resume_surface().await {
                Ok(()) => {
                    debug!("Surface resumed by monitor");
                    outcome = TickOutcome::SurfaceResumed;
                }
                // Retried next tick.
                Err(e) => warn!("Surface refused to resume: {}", e),
            }
            self.last_progress = None;
            return outcome;
        }

        let progress = target.progress();
        let stalled = self
            .last_progress
            .is_some_and(|(quanta, frames)| progress.0 > quanta && progress.1 == frames);
        self.last_progress = Some(progress);
        if stalled {
            return self.degrade("surface stopped consuming frames".into());
        }

        if outcome == TickOutcome::Healthy {
            trace!("Secondary route healthy {:?}", progress);
            self.attempts = 0;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    };

    use super::*;
    use crate::common::ContextId;

    struct FakeTarget {
        state: Mutex<Option<ContextState>>,
        resume_ok: AtomicBool,
        paused: AtomicBool,
        quanta: AtomicU64,
        frames: AtomicU64,
        reestablish_ok: AtomicBool,
        reestablished: AtomicU32,
    }

    impl FakeTarget {
        fn healthy() -> Self {
            Self {
                state: Mutex::new(Some(ContextState::Running)),
                resume_ok: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                quanta: AtomicU64::new(0),
                frames: AtomicU64::new(0),
                reestablish_ok: AtomicBool::new(true),
                reestablished: AtomicU32::new(0),
            }
        }

        fn advance(&self, consumed: bool) {
            self.quanta.fetch_add(50, Ordering::SeqCst);
            if consumed {
                self.frames.fetch_add(50, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl RecoveryTarget for FakeTarget {
        fn context_state(&self) -> Option<ContextState> {
            *self.state.lock().unwrap()
        }

        async fn resume_context(&self) -> Result<(), ContextError> {
            if self.resume_ok.load(Ordering::SeqCst) {
                *self.state.lock().unwrap() = Some(ContextState::Running);
                Ok(())
            } else {
                Err(ContextError::Interrupted(ContextId(uuid::Uuid::nil())))
            }
        }

        fn surface_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }

        async fn resume_surface(&self) -> Result<(), SurfaceError> {
            self.paused.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn progress(&self) -> (u64, u64) {
            (
                self.quanta.load(Ordering::SeqCst),
                self.frames.load(Ordering::SeqCst),
            )
        }

        async fn reestablish(&self, _attempt: u32) -> Result<(), RoutingError> {
            self.reestablished.fetch_add(1, Ordering::SeqCst);
            if self.reestablish_ok.load(Ordering::SeqCst) {
                *self.state.lock().unwrap() = Some(ContextState::Running);
                Ok(())
            } else {
                Err(RoutingError::DestinationGone)
            }
        }
    }

    fn active() -> RecoveryMonitor {
        let mut monitor = RecoveryMonitor::new(3);
        monitor.activate();
        monitor
    }

    #[tokio::test]
    async fn idle_monitor_does_nothing() {
        let target = FakeTarget::healthy();
        let mut monitor = RecoveryMonitor::new(3);
        assert_eq!(monitor.tick(&target).await, TickOutcome::Idle);
        assert_eq!(target.reestablished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn suspended_context_is_resumed_in_place() {
        let target = FakeTarget::healthy();
        *target.state.lock().unwrap() = Some(ContextState::Suspended);
        let mut monitor = active();

        assert_eq!(monitor.tick(&target).await, TickOutcome::ContextResumed);
        assert_eq!(monitor.state(), MonitorState::ActiveHealthy);
    }

    #[tokio::test]
    async fn failed_resume_rebuilds_on_the_next_tick() {
        let target = FakeTarget::healthy();
        *target.state.lock().unwrap() = Some(ContextState::Suspended);
        target.resume_ok.store(false, Ordering::SeqCst);
        let mut monitor = active();

        assert!(matches!(monitor.tick(&target).await, TickOutcome::Degraded(_)));
        assert_eq!(monitor.state(), MonitorState::Recovering);
        assert_eq!(target.reestablished.load(Ordering::SeqCst), 0);

        assert_eq!(monitor.tick(&target).await, TickOutcome::Reestablished);
        assert_eq!(monitor.state(), MonitorState::ActiveHealthy);
        assert_eq!(target.reestablished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn paused_surface_is_told_to_play() {
        let target = FakeTarget::healthy();
        target.paused.store(true, Ordering::SeqCst);
        let mut monitor = active();

        assert_eq!(monitor.tick(&target).await, TickOutcome::SurfaceResumed);
        assert!(!target.surface_paused());
    }

    #[tokio::test]
    async fn starved_surface_triggers_recovery() {
        let target = FakeTarget::healthy();
        let mut monitor = active();

        target.advance(true);
        assert_eq!(monitor.tick(&target).await, TickOutcome::Healthy);
        target.advance(false);
        assert!(matches!(monitor.tick(&target).await, TickOutcome::Degraded(_)));
    }

    #[tokio::test]
    async fn idle_graph_is_not_starvation() {
        let target = FakeTarget::healthy();
        let mut monitor = active();

        for _ in 0..5 {
            assert_eq!(monitor.tick(&target).await, TickOutcome::Healthy);
        }
    }

    #[tokio::test]
    async fn unusual_transition_forces_a_rebuild() {
        let target = FakeTarget::healthy();
        let mut monitor = active();
        monitor.flag_unusual_transition();

        assert!(matches!(monitor.tick(&target).await, TickOutcome::Degraded(_)));
        assert_eq!(monitor.tick(&target).await, TickOutcome::Reestablished);
    }

    #[tokio::test]
    async fn gives_up_after_repeated_failures() {
        let target = FakeTarget::healthy();
        target.reestablish_ok.store(false, Ordering::SeqCst);
        let mut monitor = active();
        monitor.flag_unusual_transition();
        monitor.tick(&target).await;

        for _ in 0..3 {
            assert!(matches!(
                monitor.tick(&target).await,
                TickOutcome::ReestablishFailed(_)
            ));
        }
        assert_eq!(monitor.tick(&target).await, TickOutcome::Exhausted);
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn a_healthy_tick_resets_the_budget() {
        let target = FakeTarget::healthy();
        let mut monitor = active();

        for _ in 0..5 {
            monitor.flag_unusual_transition();
            monitor.tick(&target).await;
            assert_eq!(monitor.tick(&target).await, TickOutcome::Reestablished);
            assert_eq!(monitor.tick(&target).await, TickOutcome::Healthy);
        }
        assert_eq!(monitor.state(), MonitorState::ActiveHealthy);
    }
}
