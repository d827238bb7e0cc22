//! `MixSession`: lifecycle of the shared mix context and its outputs.
//!
//! An explicitly constructed object (no globals): owns the current
//! [`MixContext`], the single [`RouteSlot`], the normal-output mute and the
//! external producers waiting to be captured.

pub mod events;
pub mod platform;
pub mod route;

#[cfg(test)]
mod tests;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use events::{CloseReason, EventBus, SessionEvent};
pub use platform::{EnvironmentEvent, PipSupport, PlatformCapabilities, StaticPlatform};
pub use route::{RouteSlot, SecondaryRoute};

use crate::{
    audio::{
        ContextState, DecodedBuffer, ExternalSource, GainNode, MediaTrack, MixContext,
        mix::{KeepAliveTone, SourceKey, VoiceInfo},
    },
    common::{
        AssetId, ChannelName, ContextError, ContextId, PooledBuffer, RouteId, RoutingError, SourceId,
        VoiceId,
    },
    configs::MixerConfig,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub id: ContextId,
    pub state: ContextState,
    pub interrupted: bool,
    pub quanta_rendered: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub context: Option<ContextSnapshot>,
    pub route: Option<RouteId>,
    pub route_sources: Vec<SourceKey>,
    pub normal_muted: bool,
    pub live_tracks: usize,
    pub voices: Vec<VoiceInfo>,
}

pub struct MixSession {
    config: MixerConfig,
    context: Mutex<Option<Arc<MixContext>>>,
    route: RouteSlot,
    external: Mutex<Vec<ExternalSource>>,
    normal_muted: AtomicBool,
    events: EventBus,
}

impl MixSession {
    pub fn new(config: MixerConfig, events: EventBus) -> Self {
        Self {
            config,
            context: Mutex::new(None),
            route: RouteSlot::default(),
            external: Mutex::new(Vec::new()),
            normal_muted: AtomicBool::new(false),
            events,
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Create the context on first use (or after it was closed) and resume it.
    ///
    /// Safe to call from any number of entry points: creation happens under
    /// the context lock, so only one context ever exists at a time. A failed
    /// resume is returned and retried by the next call.
    pub async fn initialize(&self) -> Result<Arc<MixContext>, ContextError> {
        let ctx = {
            let mut slot = self.context.lock();
            match slot.as_ref() {
                Some(ctx) if ctx.state() != ContextState::Closed => ctx.clone(),
                _ => {
                    let ctx = MixContext::new(&self.config);
                    ctx.graph()
                        .set_normal_muted(self.normal_muted.load(Ordering::Acquire));
                    *slot = Some(ctx.clone());
                    ctx
                }
            }
        };

        self.resume(&ctx).await?;
        Ok(ctx)
    }

    /// Resume the current context without creating one.
    pub async fn resume_current(&self) -> Result<Arc<MixContext>, ContextError> {
        let ctx = self.context().ok_or(ContextError::Uninitialized)?;
        self.resume(&ctx).await?;
        Ok(ctx)
    }

    async fn resume(&self, ctx: &MixContext) -> Result<(), ContextError> {
        let was_suspended = ctx.state() == ContextState::Suspended;
        if let Err(e) = ctx.resume().await {
            warn!("{}: resume failed: {}", ctx.id(), e);
            return Err(e);
        }
        if was_suspended {
            self.events
                .emit(SessionEvent::ContextResumed { context: ctx.id() });
        }
        Ok(())
    }

    /// The current context, if one was created and not torn down.
    pub fn context(&self) -> Option<Arc<MixContext>> {
        self.context.lock().clone()
    }

    pub fn route(&self) -> Option<Arc<SecondaryRoute>> {
        self.route.get()
    }

    pub fn has_route(&self) -> bool {
        self.route.is_set()
    }

    // ── voices ──────────────────────────────────────────────────────────────

    /// Add a voice to `ctx` and, if a route is live, fan it into the route.
    ///
    /// A failed secondary connection is logged and skipped; the voice still
    /// plays on the normal output.
    pub fn start_voice(
        &self,
        ctx: &MixContext,
        channel: ChannelName,
        asset: AssetId,
        buffer: DecodedBuffer,
        gain: GainNode,
    ) -> VoiceId {
        let route = self.route.lock();
        let mut graph = ctx.graph();
        let voice = graph.add_voice(channel.clone(), asset, buffer, gain);

        if let Some(route) = route.current() {
            let connected = if route.context != ctx.id() {
                Err(RoutingError::ContextMismatch {
                    expected: route.context,
                    found: ctx.id(),
                })
            } else {
                graph.connect_voice(voice, route.destination)
            };
            match connected {
                Ok(_) => debug!("[{}] {} joined {}", channel, voice, route.id),
                Err(e) => warn!("[{}] {} not captured by {}: {}", channel, voice, route.id, e),
            }
        }
        voice
    }

    pub fn stop_voice(&self, ctx: &MixContext, voice: VoiceId) -> bool {
        ctx.graph().remove_voice(voice)
    }

    // ── secondary route ─────────────────────────────────────────────────────

    /// Capture the live mix into a fresh secondary destination.
    ///
    /// Everything after the context is ready happens under the slot and
    /// graph locks with no await in between: the previous route is torn
    /// down, every active voice and registered producer is connected to the
    /// new destination, and the new route is installed. With nothing to
    /// connect, an inaudible keep-alive tone is injected instead.
    pub async fn establish_secondary_route(&self) -> Result<Arc<SecondaryRoute>, RoutingError> {
        let ctx = self.initialize().await?;

        let mut slot = self.route.lock();
        let mut graph = ctx.graph();

        if let Some(old) = slot.clear() {
            if old.context == ctx.id() {
                graph.stop_keep_alive(old.destination);
                graph.remove_destination(old.destination);
            }
            debug!("{} replaced", old.id);
        }

        let destination = graph.create_destination();
        let mut voices = 0;
        for voice in graph.voice_ids() {
            match graph.connect_voice(voice, destination) {
                Ok(_) => voices += 1,
                Err(e) => warn!("{} not captured: {}", voice, e),
            }
        }

        let mut producers = 0;
        let mut external = self.external.lock();
        prune_hung_up(&mut external);
        for source in external.iter() {
            match graph.connect_external(source, destination) {
                Ok(_) => producers += 1,
                Err(e) => warn!("{} ({}) not captured: {}", source.id(), source.label(), e),
            }
        }
        drop(external);

        let keep_alive = voices == 0 && producers == 0;
        if keep_alive {
            graph.start_keep_alive(
                destination,
                KeepAliveTone::new(
                    self.config.keep_alive_frequency_hz,
                    self.config.keep_alive_gain,
                    self.config.sample_rate,
                ),
            )?;
        }

        let route = Arc::new(SecondaryRoute {
            id: RouteId::generate(),
            context: ctx.id(),
            destination,
            voices_at_establish: voices,
            keep_alive,
        });
        if let Err(e) = slot.set(route.clone()) {
            graph.remove_destination(destination);
            return Err(e);
        }
        drop(graph);
        drop(slot);

        info!(
            "{} established on {} ({} voices, {} producers{})",
            route.id,
            ctx.id(),
            voices,
            producers,
            if keep_alive { ", keep-alive" } else { "" }
        );
        self.events.emit(SessionEvent::RouteEstablished {
            route: route.id,
            voices,
            keep_alive,
        });
        Ok(route)
    }

    /// Disconnect the route and stop its keep-alive tone. No-op without a route.
    pub fn teardown_secondary_route(&self) -> Option<RouteId> {
        let mut slot = self.route.lock();
        let route = slot.clear()?;

        if let Some(ctx) = self.context() {
            if ctx.id() == route.context {
                let mut graph = ctx.graph();
                graph.stop_keep_alive(route.destination);
                graph.remove_destination(route.destination);
            }
        }
        drop(slot);

        info!("{} torn down", route.id);
        Some(route.id)
    }

    /// A new audio track on the live route's destination stream.
    pub fn capture_secondary_track(&self) -> Result<MediaTrack, RoutingError> {
        let slot = self.route.lock();
        let route = slot.current().ok_or(RoutingError::NoActiveRoute)?;
        let ctx = self
            .context()
            .filter(|ctx| ctx.id() == route.context)
            .ok_or(RoutingError::DestinationGone)?;
        let mut graph = ctx.graph();
        graph.subscribe_destination(route.destination)
    }

    /// Register a producer to be captured by the secondary output, connecting
    /// it now if a route is live. Returns whether it was connected now.
    pub fn connect_external_source(&self, source: &ExternalSource) -> Result<bool, RoutingError> {
        let ctx = self.context().ok_or(ContextError::Uninitialized)?;
        if source.context() != ctx.id() {
            return Err(RoutingError::ContextMismatch {
                expected: ctx.id(),
                found: source.context(),
            });
        }

        let slot = self.route.lock();
        {
            let mut external = self.external.lock();
            prune_hung_up(&mut external);
            if !external.iter().any(|s| s.id() == source.id()) {
                external.push(source.clone());
            }
        }

        let Some(route) = slot.current() else {
            debug!("{} ({}) registered, no live route", source.id(), source.label());
            return Ok(false);
        };
        let mut graph = ctx.graph();
        graph.connect_external(source, route.destination)?;
        info!("{} ({}) joined {}", source.id(), source.label(), route.id);
        Ok(true)
    }

    /// A PCM sender plus an [`ExternalSource`] bound to the current context,
    /// creating the context if needed.
    pub async fn create_external_source(
        &self,
        label: String,
    ) -> Result<(flume::Sender<PooledBuffer>, ExternalSource), ContextError> {
        let ctx = self.initialize().await?;
        Ok(ctx.create_external_source(label))
    }

    pub fn disconnect_external_source(&self, source: SourceId) {
        self.external.lock().retain(|s| s.id() != source);
        if let Some(ctx) = self.context() {
            ctx.graph().disconnect_external(source);
        }
    }

    // ── normal output ───────────────────────────────────────────────────────

    /// Master mute on the normal output only. Survives context re-creation.
    pub fn set_normal_output_muted(&self, muted: bool) {
        let was = self.normal_muted.swap(muted, Ordering::AcqRel);
        if let Some(ctx) = self.context() {
            ctx.graph().set_normal_muted(muted);
        }
        if was != muted {
            info!("normal output {}", if muted { "muted" } else { "unmuted" });
        }
    }

    pub fn normal_output_muted(&self) -> bool {
        self.normal_muted.load(Ordering::Acquire)
    }

    pub async fn subscribe_normal_output(&self) -> Result<MediaTrack, ContextError> {
        let ctx = self.initialize().await?;
        let track = ctx.graph().subscribe_normal();
        Ok(track)
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    /// Tear down the route, stop every voice and close the context.
    pub fn teardown(&self) {
        self.teardown_secondary_route();
        let ctx = self.context.lock().take();
        if let Some(ctx) = ctx {
            {
                let mut graph = ctx.graph();
                for voice in graph.voice_ids() {
                    graph.remove_voice(voice);
                }
            }
            ctx.close();
        }
        self.external.lock().clear();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let route = self.route.get();
        let ctx = self.context();

        let (context, route_sources, voices, live_tracks) = match &ctx {
            Some(ctx) => {
                let graph = ctx.graph();
                let sources = route
                    .as_ref()
                    .and_then(|r| graph.destination_sources(r.destination))
                    .unwrap_or_default();
                (
                    Some(ContextSnapshot {
                        id: ctx.id(),
                        state: ctx.state(),
                        interrupted: ctx.is_interrupted(),
                        quanta_rendered: graph.quanta_rendered(),
                    }),
                    sources,
                    graph.voices(),
                    ctx.registry().live(),
                )
            }
            None => (None, Vec::new(), Vec::new(), 0),
        };

        SessionSnapshot {
            context,
            route: route.map(|r| r.id),
            route_sources,
            normal_muted: self.normal_output_muted(),
            live_tracks,
            voices,
        }
    }
}

/// Forget producers whose sender is gone. Their layers die on the next render.
fn prune_hung_up(external: &mut Vec<ExternalSource>) {
    external.retain(|source| {
        let live = !source.is_hung_up();
        if !live {
            debug!("{} ({}) hung up", source.id(), source.label());
        }
        live
    });
}
