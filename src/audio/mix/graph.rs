//! The processing graph of one mix context.
//!
//! Each voice renders once per quantum into scratch space. The result is
//! added to the normal bus and, when the voice is connected to a secondary
//! destination, to that destination's bus as well. Muting only zeroes the
//! normal bus.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::Serialize;

use super::{
    fanout::{FrameFanout, MediaTrack, TrackRegistry},
    layer::{ExternalLayer, ExternalSource},
    tone::KeepAliveTone,
    voice::{GainNode, LoopVoice},
};
use crate::{
    audio::{buffer::DecodedBuffer, constants::MIXER_CHANNELS},
    common::{AssetId, ChannelName, ContextId, DestinationId, RoutingError, SourceId, VoiceId},
};

/// A producer feeding a secondary destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum SourceKey {
    Voice(VoiceId),
    External(SourceId),
    KeepAlive,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceInfo {
    pub id: VoiceId,
    pub channel: ChannelName,
    pub asset: AssetId,
    pub gain: f32,
    pub secondary: Option<DestinationId>,
    pub frames_rendered: u64,
}

struct VoiceEntry {
    channel: ChannelName,
    voice: LoopVoice,
    secondary: Option<DestinationId>,
}

struct SecondaryDestination {
    fanout: FrameFanout,
    voices: BTreeSet<VoiceId>,
    layers: Vec<ExternalLayer>,
    keep_alive: Option<KeepAliveTone>,
    connects: u64,
    bus: Vec<i32>,
}

impl SecondaryDestination {
    fn sources(&self) -> Vec<SourceKey> {
        let mut sources: Vec<SourceKey> = self.voices.iter().copied().map(SourceKey::Voice).collect();
        sources.extend(self.layers.iter().map(|l| SourceKey::External(l.source())));
        if self.keep_alive.is_some() {
            sources.push(SourceKey::KeepAlive);
        }
        sources
    }
}

pub struct MixGraph {
    context: ContextId,
    registry: Arc<TrackRegistry>,
    frames_per_quantum: usize,
    voices: BTreeMap<VoiceId, VoiceEntry>,
    destinations: BTreeMap<DestinationId, SecondaryDestination>,
    next_id: u64,
    normal_muted: bool,
    normal_out: FrameFanout,
    scratch: Vec<i32>,
    normal_bus: Vec<i32>,
    frame: Vec<i16>,
    quanta: u64,
}

impl MixGraph {
    pub fn new(context: ContextId, registry: Arc<TrackRegistry>, frames_per_quantum: usize) -> Self {
        let samples = frames_per_quantum.max(1) * MIXER_CHANNELS;
        Self {
            context,
            normal_out: FrameFanout::new("normal", registry.clone()),
            registry,
            frames_per_quantum: frames_per_quantum.max(1),
            voices: BTreeMap::new(),
            destinations: BTreeMap::new(),
            next_id: 0,
            normal_muted: false,
            scratch: vec![0; samples],
            normal_bus: vec![0; samples],
            frame: vec![0; samples],
            quanta: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn registry(&self) -> &Arc<TrackRegistry> {
        &self.registry
    }

    // ── voices ──────────────────────────────────────────────────────────────

    /// Start a looping voice. It is connected to the normal output only.
    pub fn add_voice(
        &mut self,
        channel: ChannelName,
        asset: AssetId,
        buffer: DecodedBuffer,
        gain: GainNode,
    ) -> VoiceId {
        let id = VoiceId(self.next_id());
        let voice = LoopVoice::new(id, asset, buffer, gain);
        self.voices.insert(
            id,
            VoiceEntry {
                channel,
                voice,
                secondary: None,
            },
        );
        id
    }

    /// Stop a voice and disconnect it from every output.
    pub fn remove_voice(&mut self, id: VoiceId) -> bool {
        let Some(entry) = self.voices.remove(&id) else {
            return false;
        };
        if let Some(dest) = entry
            .secondary
            .and_then(|d| self.destinations.get_mut(&d))
        {
            dest.voices.remove(&id);
        }
        true
    }

    pub fn contains_voice(&self, id: VoiceId) -> bool {
        self.voices.contains_key(&id)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn voice_ids(&self) -> Vec<VoiceId> {
        self.voices.keys().copied().collect()
    }

    pub fn voice(&self, id: VoiceId) -> Option<VoiceInfo> {
        self.voices.get(&id).map(|entry| VoiceInfo {
            id,
            channel: entry.channel.clone(),
            asset: entry.voice.asset().clone(),
            gain: entry.voice.gain().get(),
            secondary: entry.secondary,
            frames_rendered: entry.voice.frames_rendered(),
        })
    }

    pub fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.keys().filter_map(|&id| self.voice(id)).collect()
    }

    // ── secondary destinations ──────────────────────────────────────────────

    pub fn create_destination(&mut self) -> DestinationId {
        let id = DestinationId(self.next_id());
        let samples = self.frames_per_quantum * MIXER_CHANNELS;
        self.destinations.insert(
            id,
            SecondaryDestination {
                fanout: FrameFanout::new(format!("secondary-{}", id.0), self.registry.clone()),
                voices: BTreeSet::new(),
                layers: Vec::new(),
                keep_alive: None,
                connects: 0,
                bus: vec![0; samples],
            },
        );
        id
    }

    /// Drop a destination, disconnecting every producer and subscriber.
    pub fn remove_destination(&mut self, id: DestinationId) -> bool {
        let Some(mut dest) = self.destinations.remove(&id) else {
            return false;
        };
        for voice in &dest.voices {
            if let Some(entry) = self.voices.get_mut(voice) {
                entry.secondary = None;
            }
        }
        dest.fanout.close();
        true
    }

    pub fn has_destination(&self, id: DestinationId) -> bool {
        self.destinations.contains_key(&id)
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Fan a voice into `dest`. Returns `false` when it already was.
    pub fn connect_voice(&mut self, voice: VoiceId, dest: DestinationId) -> Result<bool, RoutingError> {
        if !self.destinations.contains_key(&dest) {
            return Err(RoutingError::DestinationGone);
        }
        let Some(entry) = self.voices.get_mut(&voice) else {
            return Ok(false);
        };
        if entry.secondary == Some(dest) {
            return Ok(false);
        }
        if let Some(previous) = entry.secondary.replace(dest) {
            if let Some(old) = self.destinations.get_mut(&previous) {
                old.voices.remove(&voice);
            }
        }

        let Some(target) = self.destinations.get_mut(&dest) else {
            return Err(RoutingError::DestinationGone);
        };
        target.voices.insert(voice);
        target.connects += 1;
        Ok(true)
    }

    /// Mix an external producer into `dest`. Returns `false` when it already was.
    pub fn connect_external(
        &mut self,
        source: &ExternalSource,
        dest: DestinationId,
    ) -> Result<bool, RoutingError> {
        if source.context() != self.context {
            return Err(RoutingError::ContextMismatch {
                expected: self.context,
                found: source.context(),
            });
        }
        let target = self
            .destinations
            .get_mut(&dest)
            .ok_or(RoutingError::DestinationGone)?;
        if target.layers.iter().any(|l| l.source() == source.id()) {
            return Ok(false);
        }
        target.layers.push(ExternalLayer::new(source, 1.0));
        target.connects += 1;
        Ok(true)
    }

    pub fn disconnect_external(&mut self, source: SourceId) {
        for dest in self.destinations.values_mut() {
            dest.layers.retain(|l| l.source() != source);
        }
    }

    pub fn start_keep_alive(&mut self, dest: DestinationId, tone: KeepAliveTone) -> Result<(), RoutingError> {
        let target = self
            .destinations
            .get_mut(&dest)
            .ok_or(RoutingError::DestinationGone)?;
        target.keep_alive = Some(tone);
        Ok(())
    }

    pub fn stop_keep_alive(&mut self, dest: DestinationId) -> bool {
        self.destinations
            .get_mut(&dest)
            .and_then(|d| d.keep_alive.take())
            .is_some()
    }

    pub fn destination_sources(&self, dest: DestinationId) -> Option<Vec<SourceKey>> {
        self.destinations.get(&dest).map(SecondaryDestination::sources)
    }

    /// Connect operations performed on `dest` since it was created.
    pub fn destination_connects(&self, dest: DestinationId) -> Option<u64> {
        self.destinations.get(&dest).map(|d| d.connects)
    }

    pub fn subscribe_destination(&mut self, dest: DestinationId) -> Result<MediaTrack, RoutingError> {
        self.destinations
            .get_mut(&dest)
            .map(|d| d.fanout.subscribe())
            .ok_or(RoutingError::DestinationGone)
    }

    // ── normal output ───────────────────────────────────────────────────────

    pub fn subscribe_normal(&mut self) -> MediaTrack {
        self.normal_out.subscribe()
    }

    pub fn set_normal_muted(&mut self, muted: bool) {
        self.normal_muted = muted;
    }

    pub fn normal_muted(&self) -> bool {
        self.normal_muted
    }

    // ── rendering ───────────────────────────────────────────────────────────

    /// Render one quantum into every output.
    pub fn render(&mut self) {
        self.normal_bus.fill(0);
        for dest in self.destinations.values_mut() {
            dest.bus.fill(0);
        }

        for entry in self.voices.values_mut() {
            self.scratch.fill(0);
            entry.voice.render(&mut self.scratch);
            add_into(&mut self.normal_bus, &self.scratch);

            if let Some(dest) = entry
                .secondary
                .and_then(|d| self.destinations.get_mut(&d))
            {
                add_into(&mut dest.bus, &self.scratch);
            }
        }

        for dest in self.destinations.values_mut() {
            dest.layers.retain_mut(|layer| {
                layer.fill();
                !layer.is_dead()
            });
            for layer in dest.layers.iter_mut() {
                layer.accumulate(&mut dest.bus);
            }
            if let Some(tone) = dest.keep_alive.as_mut() {
                tone.render(&mut dest.bus);
            }
            clamp_into(&dest.bus, &mut self.frame);
            dest.fanout.push(&self.frame);
        }

        if self.normal_muted {
            self.normal_bus.fill(0);
        }
        clamp_into(&self.normal_bus, &mut self.frame);
        self.normal_out.push(&self.frame);

        self.quanta += 1;
    }

    pub fn quanta_rendered(&self) -> u64 {
        self.quanta
    }
}

fn add_into(acc: &mut [i32], src: &[i32]) {
    for (a, &s) in acc.iter_mut().zip(src) {
        *a += s;
    }
}

fn clamp_into(acc: &[i32], out: &mut [i16]) {
    for (o, &s) in out.iter_mut().zip(acc) {
        *o = s.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}
