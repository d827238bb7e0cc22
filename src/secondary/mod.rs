//! `SecondaryOutput`: the picture-in-picture output and its recovery.
//!
//! Opening establishes the secondary route, combines its audio with a visual
//! capture and plays the result on a [`PlaybackSurface`]. While open, a
//! [`RecoveryMonitor`] checks the route on a fixed interval. Every way the
//! output can end goes through [`SecondaryOutput::close`].

pub mod bridge;
pub mod surface;

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use bridge::{CanvasCapture, CombinedStream, StreamBridge, VisualSource, VisualStream};
pub use surface::{PipSurface, PlaybackSurface};

use crate::{
    audio::ContextState,
    common::{ContextError, RouteId, RoutingError, SurfaceError},
    configs::RecoveryConfig,
    recovery::{MonitorState, RecoveryMonitor, RecoveryTarget, TickOutcome},
    session::{
        CloseReason, EnvironmentEvent, MixSession, PipSupport, PlatformCapabilities,
        SecondaryRoute, SessionEvent,
    },
};

struct MonitorSlot {
    monitor: RecoveryMonitor,
    epoch: u64,
}

pub struct SecondaryOutput {
    session: Arc<MixSession>,
    platform: Arc<dyn PlatformCapabilities>,
    surface: Arc<dyn PlaybackSurface>,
    bridge: StreamBridge,
    recovery: RecoveryConfig,
    mute_normal: bool,

    /// Serialises open, close and re-establish.
    op: tokio::sync::Mutex<()>,
    monitor: tokio::sync::Mutex<MonitorSlot>,
    monitor_task: parking_lot::Mutex<Option<CancellationToken>>,
    visual: parking_lot::Mutex<Option<Arc<dyn VisualSource>>>,
    route: parking_lot::Mutex<Option<RouteId>>,

    active: AtomicBool,
    epoch: AtomicU64,
    unusual: AtomicBool,
    backgrounded: AtomicBool,
    muted_by_us: AtomicBool,
}

impl SecondaryOutput {
    pub fn new(
        session: Arc<MixSession>,
        platform: Arc<dyn PlatformCapabilities>,
        surface: Arc<dyn PlaybackSurface>,
        recovery: RecoveryConfig,
    ) -> Arc<Self> {
        let mute_normal = session.config().mute_normal_output_in_pip;
        Arc::new(Self {
            session,
            platform,
            surface,
            bridge: StreamBridge::new(),
            monitor: tokio::sync::Mutex::new(MonitorSlot {
                monitor: RecoveryMonitor::new(recovery.max_consecutive_recoveries),
                epoch: 0,
            }),
            recovery,
            mute_normal,
            op: tokio::sync::Mutex::new(()),
            monitor_task: parking_lot::Mutex::new(None),
            visual: parking_lot::Mutex::new(None),
            route: parking_lot::Mutex::new(None),
            active: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            unusual: AtomicBool::new(false),
            backgrounded: AtomicBool::new(false),
            muted_by_us: AtomicBool::new(false),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn route(&self) -> Option<RouteId> {
        *self.route.lock()
    }

    pub fn surface(&self) -> &Arc<dyn PlaybackSurface> {
        &self.surface
    }

    pub async fn monitor_state(&self) -> MonitorState {
        self.monitor.lock().await.monitor.state()
    }

    /// Open (or rebuild) the secondary output.
    pub async fn open(
        self: &Arc<Self>,
        visual: Option<Arc<dyn VisualSource>>,
    ) -> Result<RouteId, RoutingError> {
        let op = self.op.lock().await;
        let support = self.platform.pip_support();
        if support == PipSupport::Unsupported {
            return Err(RoutingError::Unsupported);
        }
        *self.visual.lock() = visual;

        let route = match self.build().await {
            Ok(route) => route,
            Err(e) => {
                warn!("secondary output failed to open: {}", e);
                if !self.is_active() {
                    self.release();
                }
                return Err(e);
            }
        };

        let first = !self.active.swap(true, Ordering::AcqRel);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.unusual.store(false, Ordering::Release);
        if first && self.mute_normal && !self.session.normal_output_muted() {
            self.session.set_normal_output_muted(true);
            self.muted_by_us.store(true, Ordering::Release);
        }
        drop(op);

        if first {
            self.spawn_monitor();
        }
        info!("secondary output open on {} ({:?})", route.id, support);
        Ok(route.id)
    }

    /// Establish the route and bind a fresh combined stream to the surface.
    async fn build(&self) -> Result<Arc<SecondaryRoute>, RoutingError> {
        let route = self.session.establish_secondary_route().await?;
        let ctx = self
            .session
            .context()
            .filter(|ctx| ctx.id() == route.context)
            .ok_or(RoutingError::DestinationGone)?;

        let visual = self.visual.lock().clone();
        let video = visual
            .map(|v| v.capture(ctx.registry()))
            .unwrap_or_default();
        let audio = match self.session.capture_secondary_track() {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("{} has no audio track: {}", route.id, e);
                None
            }
        };

        let stream = self.bridge.combine(video, audio)?;
        self.surface.attach(stream);
        self.surface.play().await?;
        *self.route.lock() = Some(route.id);
        Ok(route)
    }

    fn release(&self) -> Option<RouteId> {
        self.surface.pause();
        self.surface.detach();
        let released = self.bridge.release();
        let torn_down = self.session.teardown_secondary_route();
        debug!("released {} secondary tracks", released);
        self.route.lock().take().or(torn_down)
    }

    /// The single cleanup routine for every way the output ends.
    /// Returns the closed route, or `None` if nothing was open.
    pub async fn close(&self, reason: CloseReason) -> Option<RouteId> {
        let _op = self.op.lock().await;
        if !self.active.swap(false, Ordering::AcqRel) {
            return None;
        }

        if let Some(task) = self.monitor_task.lock().take() {
            task.cancel();
        }
        self.unusual.store(false, Ordering::Release);

        let route = self.release();
        if self.muted_by_us.swap(false, Ordering::AcqRel) {
            self.session.set_normal_output_muted(false);
        }

        if let Some(route) = route {
            info!("{} closed ({:?})", route, reason);
            self.session
                .events()
                .emit(SessionEvent::RouteClosed { route, reason });
        }
        route
    }

    /// The consuming surface left its special mode on its own.
    pub async fn notify_route_closed(&self) -> Option<RouteId> {
        self.close(CloseReason::ConsumerClosed).await
    }

    pub async fn on_environment(&self, event: EnvironmentEvent) {
        debug!("environment: {:?}", event);
        match event {
            EnvironmentEvent::Backgrounded => {
                self.backgrounded.store(true, Ordering::Release);
            }
            EnvironmentEvent::Foregrounded => {
                let was_background = self.backgrounded.swap(false, Ordering::AcqRel);
                if self.is_active() {
                    let stalled = self.session.context().is_none_or(|ctx| !ctx.is_running());
                    let native = self.platform.pip_support() == PipSupport::Native;
                    // Standard PiP keeps rendering in the background; a running
                    // context there is left to the regular health checks.
                    if was_background && (native || stalled) {
                        self.unusual.store(true, Ordering::Release);
                    }
                } else {
                    self.resume_normal_output().await;
                }
            }
            EnvironmentEvent::InterruptionBegan => {
                if let Some(ctx) = self.session.context() {
                    ctx.set_interrupted(true);
                }
            }
            EnvironmentEvent::InterruptionEnded => {
                if let Some(ctx) = self.session.context() {
                    ctx.set_interrupted(false);
                }
                if self.is_active() {
                    self.unusual.store(true, Ordering::Release);
                } else {
                    self.resume_normal_output().await;
                }
            }
            EnvironmentEvent::SurfaceLeftPip => {
                self.close(CloseReason::ConsumerClosed).await;
            }
        }
    }

    async fn resume_normal_output(&self) {
        let suspended = self
            .session
            .context()
            .is_some_and(|ctx| ctx.state() == ContextState::Suspended);
        if suspended {
            if let Err(e) = self.session.initialize().await {
                warn!("could not resume after returning: {}", e);
            }
        }
    }

    /// One health check. Closes the output with `RecoveryFailed` when the
    /// monitor gives up.
    pub async fn monitor_tick(&self) -> TickOutcome {
        let outcome = {
            let mut slot = self.monitor.lock().await;
            if !self.is_active() {
                slot.monitor.deactivate();
                return TickOutcome::Idle;
            }
            let epoch = self.epoch.load(Ordering::Acquire);
            if slot.epoch != epoch {
                slot.monitor.activate();
                slot.epoch = epoch;
            }
            if self.unusual.swap(false, Ordering::AcqRel) {
                slot.monitor.flag_unusual_transition();
            }
            slot.monitor.tick(self).await
        };

        if outcome == TickOutcome::Exhausted {
            self.close(CloseReason::RecoveryFailed).await;
        }
        outcome
    }

    fn spawn_monitor(self: &Arc<Self>) {
        if self.recovery.interval_ms == 0 || tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let token = CancellationToken::new();
        if let Some(previous) = self.monitor_task.lock().replace(token.clone()) {
            previous.cancel();
        }

        let output: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_millis(self.recovery.interval_ms);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(output) = output.upgrade() else { break };
                        if output.monitor_tick().await == TickOutcome::Exhausted {
                            break;
                        }
                    }
                }
            }
            debug!("recovery monitor stopped");
        });
    }
}

#[async_trait]
impl RecoveryTarget for SecondaryOutput {
    fn context_state(&self) -> Option<ContextState> {
        self.session.context().map(|ctx| ctx.state())
    }

    async fn resume_context(&self) -> Result<(), ContextError> {
        self.session.resume_current().await.map(|_| ())
    }

    fn surface_paused(&self) -> bool {
        self.surface.is_paused()
    }

    async fn resume_surface(&self) -> Result<(), SurfaceError> {
        self.surface.play().await
    }

    fn progress(&self) -> (u64, u64) {
        let quanta = self
            .session
            .context()
            .map_or(0, |ctx| ctx.graph().quanta_rendered());
        (quanta, self.surface.frames_consumed())
    }

    async fn reestablish(&self, attempt: u32) -> Result<(), RoutingError> {
        let _op = self.op.lock().await;
        if !self.is_active() {
            return Err(RoutingError::NoActiveRoute);
        }
        if let Some(route) = self.route() {
            self.session
                .events()
                .emit(SessionEvent::RecoveryStarted { route, attempt });
        }
        self.build().await.map(|_| ())
    }
}
