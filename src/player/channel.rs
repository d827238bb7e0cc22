//! `ChannelPlayer`: one sounding loop per channel, picked by level.
//!
//! Each channel carries a generation counter and the latest requested level.
//! A call that had to wait for a decode re-checks both before starting
//! anything, so a stale request can never overwrite a newer one and a
//! channel stopped mid-decode stays silent.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::state::{ChannelSnapshot, ChannelState, LevelOutcome, PlayingInstance};
use crate::{
    audio::{BufferCache, ContextState, GainNode, MixContext},
    catalog::{SoundCatalog, TierThresholds},
    common::{ChannelName, MixError},
    session::{MixSession, SessionEvent},
};

struct ChannelSlot {
    state: Mutex<ChannelState>,
    /// Latest requested level, as `f32` bits.
    latest: AtomicU32,
    generation: AtomicU64,
}

impl ChannelSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            latest: AtomicU32::new(0f32.to_bits()),
            generation: AtomicU64::new(0),
        }
    }

    fn latest(&self) -> f32 {
        f32::from_bits(self.latest.load(Ordering::Acquire))
    }
}

pub struct ChannelPlayer {
    catalog: Arc<SoundCatalog>,
    cache: Arc<BufferCache>,
    session: Arc<MixSession>,
    tiers: TierThresholds,
    channels: BTreeMap<ChannelName, ChannelSlot>,
}

impl ChannelPlayer {
    pub fn new(
        catalog: Arc<SoundCatalog>,
        cache: Arc<BufferCache>,
        session: Arc<MixSession>,
        tiers: TierThresholds,
    ) -> Self {
        let channels = catalog
            .channels()
            .map(|name| (name.clone(), ChannelSlot::new()))
            .collect();
        Self {
            catalog,
            cache,
            session,
            tiers,
            channels,
        }
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    pub fn session(&self) -> &Arc<MixSession> {
        &self.session
    }

    /// Apply `value` to `channel`: stop at 0, otherwise play the variant for
    /// its tier at gain `value`.
    pub async fn set_level(&self, channel: &str, value: f32) -> Result<LevelOutcome, MixError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(MixError::InvalidLevel(value));
        }
        let (name, slot) = self
            .channels
            .get_key_value(channel)
            .ok_or_else(|| MixError::NoSuchChannel(ChannelName::from(channel)))?;

        let generation = slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
        slot.latest.store(value.to_bits(), Ordering::Release);

        if value == 0.0 {
            let mut state = slot.state.lock();
            self.stop_locked(name, &mut state);
            return Ok(LevelOutcome::Stopped);
        }

        // Gain on a live voice needs no running context.
        if let Some(ctx) = self.session.context() {
            if self.update_gain(slot, &ctx, value) {
                if !ctx.is_running() {
                    if let Err(e) = self.session.initialize().await {
                        debug!("[{}] gain set on a stopped context: {}", name, e);
                    }
                }
                return Ok(LevelOutcome::GainUpdated);
            }
        }

        // On failure the target stays latched for `reapply_latest`.
        let ctx = self.session.initialize().await?;

        let tier = {
            let mut state = slot.state.lock();
            let live = self.is_live(&state, &ctx);
            if !live && state.playing.take().is_some() {
                debug!("[{}] previous voice belonged to a closed context", name);
            }

            let tier = self.tiers.select(value, live.then_some(state.last_tier).flatten());
            if let Some(playing) = state.playing.as_ref().filter(|p| p.tier == tier) {
                playing.gain.set(value);
                state.level = value;
                return Ok(LevelOutcome::GainUpdated);
            }
            tier
        };

        let asset = match self.catalog.get(channel) {
            Some(loops) => loops.get(tier).clone(),
            None => return Err(MixError::NoSuchChannel(name.clone())),
        };

        let buffer = match self.cache.peek(&asset.id) {
            Some(buffer) => buffer,
            None => match self.cache.get(&asset.id, &asset.url).await {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("[{}] {} unavailable: {}", name, asset.id, e);
                    self.session.events().emit(SessionEvent::ChannelUnavailable {
                        channel: name.clone(),
                        asset: asset.id.clone(),
                        reason: e.to_string(),
                    });

                    let mut state = slot.state.lock();
                    state.unavailable += 1;
                    if slot.generation.load(Ordering::Acquire) == generation {
                        if let Some(playing) = state.playing.as_ref() {
                            playing.gain.set(value);
                            state.level = value;
                        }
                    }
                    return Ok(LevelOutcome::Unavailable);
                }
            },
        };

        let mut state = slot.state.lock();

        // Re-read at the moment of starting, not at schedule time.
        if slot.generation.load(Ordering::Acquire) != generation || slot.latest() <= 0.0 {
            debug!("[{}] {} ready but superseded", name, asset.id);
            return Ok(LevelOutcome::Superseded);
        }
        if ctx.state() == ContextState::Closed {
            return Ok(LevelOutcome::Superseded);
        }

        self.stop_locked(name, &mut state);

        let gain = GainNode::new(value);
        let voice = self.session.start_voice(
            &ctx,
            name.clone(),
            asset.id.clone(),
            buffer,
            gain.clone(),
        );
        state.record_start(PlayingInstance {
            voice,
            context: ctx.id(),
            asset: asset.id.clone(),
            tier,
            gain,
            started_at: Instant::now(),
        });
        debug!("[{}] started {} ({}) at {:.3}", name, asset.id, tier, value);

        Ok(LevelOutcome::Started {
            asset: asset.id,
            tier,
        })
    }

    /// Record `value` as the channel's newest target without applying it.
    /// Any start still waiting on a decode for an older value gives up.
    pub fn note_target(&self, channel: &str, value: f32) -> Result<(), MixError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(MixError::InvalidLevel(value));
        }
        let slot = self
            .channels
            .get(channel)
            .ok_or_else(|| MixError::NoSuchChannel(ChannelName::from(channel)))?;
        slot.generation.fetch_add(1, Ordering::AcqRel);
        slot.latest.store(value.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Apply every channel's latest non-zero target again. Starts that gave
    /// up on an unavailable context are retried this way once it is back.
    pub async fn reapply_latest(&self) -> usize {
        let mut applied = 0;
        for (name, slot) in &self.channels {
            let target = slot.latest();
            if target <= 0.0 {
                continue;
            }
            match self.set_level(name, target).await {
                Ok(outcome) => {
                    trace!("[{}] reapplied {:.3} -> {:?}", name, target, outcome);
                    applied += 1;
                }
                Err(e) => warn!("[{}] {:.3} still not applied: {}", name, target, e),
            }
        }
        applied
    }

    /// Re-apply latched targets whenever the session reports a resumed context.
    pub fn follow_resumes(self: &Arc<Self>, cancel: CancellationToken) {
        let player = Arc::downgrade(self);
        let mut events = self.session.events().subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let resumed = match event {
                    Ok(SessionEvent::ContextResumed { .. }) => true,
                    Ok(_) => false,
                    Err(broadcast::error::RecvError::Lagged(_)) => true,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !resumed {
                    continue;
                }
                let Some(player) = player.upgrade() else { break };
                let applied = player.reapply_latest().await;
                debug!("context resumed, {} channel targets reapplied", applied);
            }
        });
    }

    pub async fn stop(&self, channel: &str) -> Result<LevelOutcome, MixError> {
        self.set_level(channel, 0.0).await
    }

    /// Silence every channel and invalidate in-flight starts.
    pub fn stop_all(&self) {
        for (name, slot) in &self.channels {
            slot.generation.fetch_add(1, Ordering::AcqRel);
            slot.latest.store(0f32.to_bits(), Ordering::Release);
            let mut state = slot.state.lock();
            self.stop_locked(name, &mut state);
        }
    }

    /// Set the gain of a live voice whose tier still fits `value`.
    fn update_gain(&self, slot: &ChannelSlot, ctx: &MixContext, value: f32) -> bool {
        let mut state = slot.state.lock();
        if ctx.state() == ContextState::Closed || !self.is_live(&state, ctx) {
            return false;
        }
        let tier = self.tiers.select(value, state.last_tier);
        match state.playing.as_ref().filter(|p| p.tier == tier) {
            Some(playing) => {
                playing.gain.set(value);
                state.level = value;
                true
            }
            None => false,
        }
    }

    fn is_live(&self, state: &ChannelState, ctx: &MixContext) -> bool {
        state
            .playing
            .as_ref()
            .is_some_and(|p| p.context == ctx.id() && ctx.graph().contains_voice(p.voice))
    }

    fn stop_locked(&self, name: &ChannelName, state: &mut ChannelState) {
        state.level = 0.0;
        let Some(playing) = state.playing.take() else {
            return;
        };
        if let Some(ctx) = self.session.context().filter(|c| c.id() == playing.context) {
            self.session.stop_voice(&ctx, playing.voice);
        }
        state.stops += 1;
        debug!(
            "[{}] stopped {} after {:.1}s",
            name,
            playing.asset,
            playing.started_at.elapsed().as_secs_f32()
        );
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &ChannelName> {
        self.channels.keys()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn channel(&self, channel: &str) -> Option<ChannelSnapshot> {
        let (name, slot) = self.channels.get_key_value(channel)?;
        Some(slot.state.lock().snapshot(name))
    }

    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        self.channels
            .iter()
            .map(|(name, slot)| slot.state.lock().snapshot(name))
            .collect()
    }
}
