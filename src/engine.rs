//! `SoundscapeEngine`: the whole mixer behind one handle.
//!
//! UI input enters through [`SoundscapeEngine::on_level_change`], which only
//! latches a target. A frame loop smooths the targets, forwards throttled
//! levels to per-channel dispatchers and, once input has been quiet for the
//! debounce window, republishes the active set and the matching forest.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    audio::{AssetFetcher, AssetLoader, BufferCache, ExternalSource, MediaTrack, PcmDecoder, SymphoniaDecoder},
    catalog::{SoundCatalog, TierThresholds},
    common::{AnyResult, ChannelName, ContextError, MixError, PooledBuffer, RouteId, RoutingError},
    configs::{Config, MixerConfig, RecoveryConfig},
    forest::{ForestMatch, ForestMatcher, ProfileMatcher},
    player::{ChannelPlayer, ChannelSnapshot},
    recovery::MonitorState,
    secondary::{CanvasCapture, PipSurface, PlaybackSurface, SecondaryOutput, VisualSource},
    session::{
        CloseReason, EnvironmentEvent, EventBus, MixSession, PlatformCapabilities, SessionEvent,
        SessionSnapshot, StaticPlatform,
    },
    smoothing::{ActiveChannels, ChannelDispatcher, LevelDriver},
};

/// Collaborators the engine is assembled from.
pub struct EngineParts {
    pub mixer: MixerConfig,
    pub recovery: RecoveryConfig,
    pub catalog: SoundCatalog,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub decoder: Arc<dyn PcmDecoder>,
    pub platform: Arc<dyn PlatformCapabilities>,
    pub surface: Arc<dyn PlaybackSurface>,
    pub matcher: Arc<dyn ForestMatcher>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondarySnapshot {
    pub active: bool,
    pub route: Option<RouteId>,
    pub monitor: MonitorState,
    pub surface_paused: bool,
    pub frames_consumed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub session: SessionSnapshot,
    pub channels: Vec<ChannelSnapshot>,
    pub targets: BTreeMap<ChannelName, f32>,
    pub active: ActiveChannels,
    pub forest: Option<ForestMatch>,
    pub secondary: SecondarySnapshot,
    pub cached_assets: usize,
    pub asset_fetches: u64,
}

#[derive(Default)]
struct Published {
    active: ActiveChannels,
    forest: Option<ForestMatch>,
}

pub struct SoundscapeEngine {
    session: Arc<MixSession>,
    player: Arc<ChannelPlayer>,
    cache: Arc<BufferCache>,
    secondary: Arc<SecondaryOutput>,
    matcher: Arc<dyn ForestMatcher>,
    driver: Mutex<LevelDriver>,
    dispatcher: ChannelDispatcher,
    published: Mutex<Published>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl SoundscapeEngine {
    /// Build the engine from configuration with the production collaborators.
    pub fn from_config(config: &Config) -> AnyResult<Arc<Self>> {
        let catalog = SoundCatalog::from_config(&config.catalog)?;
        if catalog.is_empty() {
            warn!("catalog has no channels; every level change will be rejected");
        }

        Ok(Self::assemble(EngineParts {
            mixer: config.mixer.clone(),
            recovery: config.recovery.clone(),
            catalog,
            fetcher: Arc::new(AssetLoader::new()?),
            decoder: Arc::new(SymphoniaDecoder::new(config.mixer.sample_rate)),
            platform: Arc::new(StaticPlatform::from_config(&config.platform)),
            surface: Arc::new(PipSurface::new()),
            matcher: Arc::new(ProfileMatcher::new(config.forests.clone())),
        }))
    }

    /// Wire the collaborators together. Must run inside a tokio runtime.
    pub fn assemble(parts: EngineParts) -> Arc<Self> {
        let tiers = TierThresholds::from_config(&parts.mixer);
        let driver = LevelDriver::new(&parts.mixer);
        let session = Arc::new(MixSession::new(parts.mixer, EventBus::default()));
        let cache = Arc::new(BufferCache::new(parts.fetcher, parts.decoder));
        let player = Arc::new(ChannelPlayer::new(
            Arc::new(parts.catalog),
            cache.clone(),
            session.clone(),
            tiers,
        ));
        let secondary = SecondaryOutput::new(
            session.clone(),
            parts.platform,
            parts.surface,
            parts.recovery,
        );
        let cancel = CancellationToken::new();
        let dispatcher = ChannelDispatcher::spawn(player.clone(), cancel.child_token());
        player.follow_resumes(cancel.child_token());

        Arc::new(Self {
            session,
            player,
            cache,
            secondary,
            matcher: parts.matcher,
            driver: Mutex::new(driver),
            dispatcher,
            published: Mutex::new(Published::default()),
            wake: Arc::new(Notify::new()),
            cancel,
        })
    }

    /// Spawn the frame loop. It sleeps while nothing is animating.
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        let wake = self.wake.clone();
        let cancel = self.cancel.child_token();
        let period = self.session.config().frame_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                let idle = match engine.upgrade() {
                    Some(this) => this.driver.lock().is_idle(),
                    None => break,
                };
                if idle {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = wake.notified() => {}
                    }
                    interval.reset();
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(this) = engine.upgrade() else { break };
                this.tick(Instant::now());
            }
            debug!("frame loop stopped");
        });
        info!("frame loop running at {:?}", period);
    }

    pub fn session(&self) -> &Arc<MixSession> {
        &self.session
    }

    pub fn player(&self) -> &Arc<ChannelPlayer> {
        &self.player
    }

    pub fn secondary(&self) -> &Arc<SecondaryOutput> {
        &self.secondary
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.events().subscribe()
    }

    // ── level input ─────────────────────────────────────────────────────────

    /// Latch a new target for `channel`. Out-of-range values are clamped;
    /// the audio follows through the smoothing and throttle layers.
    pub fn on_level_change(&self, channel: &str, value: f32) -> Result<(), MixError> {
        if !value.is_finite() {
            return Err(MixError::InvalidLevel(value));
        }
        let name = ChannelName::from(channel);
        if !self.player.contains(channel) {
            return Err(MixError::NoSuchChannel(name));
        }

        trace!("[{}] target {:.3}", name, value);
        self.driver.lock().set_target(&name, value);
        self.wake.notify_one();
        Ok(())
    }

    /// Advance the level pipeline by one frame.
    pub fn tick(&self, now: Instant) {
        let out = self.driver.lock().tick(now);

        for (channel, level) in out.audio {
            if let Err(e) = self.dispatcher.dispatch(&channel, level) {
                warn!("[{}] level {:.3} dropped: {}", channel, level, e);
            }
        }
        if let Some(active) = out.rematch {
            self.publish(active);
        }
    }

    fn publish(&self, active: ActiveChannels) {
        let forest = self.matcher.best_match(&active.levels);
        let events = self.session.events();

        let mut published = self.published.lock();
        if published.active != active {
            debug!("active channels: {:?}", active.top_channels);
            events.emit(SessionEvent::ActiveChannelsChanged {
                top_channels: active.top_channels.clone(),
                levels: active.levels.clone(),
            });
            published.active = active;
        }

        let renamed = published.forest.as_ref().map(|f| &f.name) != forest.as_ref().map(|f| &f.name);
        if renamed {
            info!(
                "forest match: {}",
                forest.as_ref().map_or("none", |f| f.name.as_str())
            );
            events.emit(SessionEvent::ForestMatched {
                forest: forest.clone(),
            });
        }
        published.forest = forest;
    }

    // ── secondary output ────────────────────────────────────────────────────

    pub async fn open_secondary(&self, video: bool) -> Result<RouteId, RoutingError> {
        let visual = video.then(|| Arc::new(CanvasCapture::default()) as Arc<dyn VisualSource>);
        self.secondary.open(visual).await
    }

    pub async fn close_secondary(&self) -> Option<RouteId> {
        self.secondary.close(CloseReason::UserClosed).await
    }

    pub async fn notify_route_closed(&self) -> Option<RouteId> {
        self.secondary.notify_route_closed().await
    }

    pub async fn on_environment(&self, event: EnvironmentEvent) {
        self.secondary.on_environment(event).await;
    }

    // ── external producers and outputs ──────────────────────────────────────

    pub async fn create_external_source(
        &self,
        label: String,
    ) -> Result<(flume::Sender<PooledBuffer>, ExternalSource), ContextError> {
        self.session.create_external_source(label).await
    }

    pub fn connect_external_source(&self, source: &ExternalSource) -> Result<bool, RoutingError> {
        self.session.connect_external_source(source)
    }

    pub fn set_normal_output_muted(&self, muted: bool) {
        self.session.set_normal_output_muted(muted);
    }

    pub async fn subscribe_normal_output(&self) -> Result<MediaTrack, ContextError> {
        self.session.subscribe_normal_output().await
    }

    pub fn subscribe_secondary_output(&self) -> Result<MediaTrack, RoutingError> {
        self.session.capture_secondary_track()
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> EngineSnapshot {
        let (targets, active) = {
            let driver = self.driver.lock();
            let targets = driver
                .levels()
                .keys()
                .filter_map(|name| driver.target(name).map(|t| (name.clone(), t)))
                .collect();
            (targets, driver.active())
        };
        let forest = self.published.lock().forest.clone();
        let surface = self.secondary.surface();

        EngineSnapshot {
            session: self.session.snapshot(),
            channels: self.player.snapshot(),
            targets,
            active,
            forest,
            secondary: SecondarySnapshot {
                active: self.secondary.is_active(),
                route: self.secondary.route(),
                monitor: self.secondary.monitor_state().await,
                surface_paused: surface.is_paused(),
                frames_consumed: surface.frames_consumed(),
            },
            cached_assets: self.cache.len(),
            asset_fetches: self.cache.fetch_count(),
        }
    }

    /// Close the secondary output, stop every channel and close the context.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        self.secondary.close(CloseReason::Teardown).await;
        self.player.stop_all();
        self.session.teardown();
        info!("engine torn down");
    }
}

impl Drop for SoundscapeEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
