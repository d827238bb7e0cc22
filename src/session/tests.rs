use std::sync::Arc;

use tokio::sync::broadcast::{Receiver, error::TryRecvError};

use super::*;
use crate::{
    audio::mix::SourceKey,
    catalog::Intensity,
    common::{MixError, RoutingError},
    configs::{PlatformConfig, RecoveryConfig},
    recovery::{MonitorState, TickOutcome},
    secondary::{CanvasCapture, PlaybackSurface, SecondaryOutput, VisualSource},
    test_support::{Rig, ScriptedSurface},
};

fn drain(rx: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

fn closed(events: &[SessionEvent]) -> Vec<CloseReason> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::RouteClosed { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

fn route_sources(rig: &Rig) -> Vec<SourceKey> {
    rig.session.snapshot().route_sources
}

fn platform(native: bool, standard: bool) -> Arc<dyn PlatformCapabilities> {
    Arc::new(StaticPlatform::from_config(&PlatformConfig {
        native_pip: native,
        standard_pip: standard,
    }))
}

fn output(rig: &Rig, platform: Arc<dyn PlatformCapabilities>) -> (Arc<SecondaryOutput>, Arc<ScriptedSurface>) {
    let surface = ScriptedSurface::new();
    let output = SecondaryOutput::new(
        rig.session.clone(),
        platform,
        surface.clone(),
        RecoveryConfig {
            interval_ms: 0,
            max_consecutive_recoveries: 3,
        },
    );
    (output, surface)
}

fn canvas() -> Option<Arc<dyn VisualSource>> {
    Some(Arc::new(CanvasCapture::default()))
}

// ── routing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn establish_connects_every_active_voice() {
    let rig = Rig::new();
    rig.player.set_level("rain", 0.5).await.unwrap();
    rig.player.set_level("wind", 0.2).await.unwrap();
    rig.player.set_level("birds", 0.9).await.unwrap();

    let route = rig.session.establish_secondary_route().await.unwrap();

    assert_eq!(route.voices_at_establish, 3);
    assert!(!route.keep_alive);
    let sources = route_sources(&rig);
    assert_eq!(sources.len(), 3);
    assert!(sources.iter().all(|s| matches!(s, SourceKey::Voice(_))));
}

#[tokio::test]
async fn empty_mix_gets_exactly_one_keep_alive() {
    let rig = Rig::new();

    let route = rig.session.establish_secondary_route().await.unwrap();

    assert!(route.keep_alive);
    assert_eq!(route_sources(&rig), vec![SourceKey::KeepAlive]);
}

#[tokio::test]
async fn reestablishing_leaves_one_route() {
    let rig = Rig::new();
    rig.player.set_level("rain", 0.5).await.unwrap();

    let first = rig.session.establish_secondary_route().await.unwrap();
    let second = rig.session.establish_secondary_route().await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(rig.session.route().unwrap().id, second.id);
    let ctx = rig.session.context().unwrap();
    assert_eq!(ctx.graph().destination_count(), 1);
    assert!(!ctx.graph().has_destination(first.destination));
}

#[tokio::test]
async fn a_channel_started_later_joins_the_live_route() {
    let rig = Rig::new();
    let route = rig.session.establish_secondary_route().await.unwrap();

    rig.player.set_level("wind", 0.4).await.unwrap();
    let ctx = rig.session.context().unwrap();
    let wind = ctx.graph().voices()[0].clone();
    assert_eq!(wind.secondary, Some(route.destination));
    assert_eq!(ctx.graph().destination_connects(route.destination), Some(1));

    rig.player.set_level("rain", 0.6).await.unwrap();

    let graph = ctx.graph();
    let rain = graph
        .voices()
        .into_iter()
        .find(|v| v.channel.0 == "rain")
        .unwrap();
    assert_eq!(rain.secondary, Some(route.destination));
    assert_eq!(graph.voice(wind.id).unwrap().secondary, Some(route.destination));
    assert_eq!(graph.destination_connects(route.destination), Some(2));
}

#[tokio::test]
async fn tier_changes_are_recorded_in_order() {
    let rig = Rig::new();

    rig.player.set_level("rain", 0.2).await.unwrap();
    rig.player.set_level("rain", 0.5).await.unwrap();
    rig.player.set_level("rain", 0.0).await.unwrap();

    let rain = rig.player.channel("rain").unwrap();
    assert_eq!(rain.tier_history, vec![Intensity::Soft, Intensity::Moderate]);
    assert!(!rain.active);
    assert_eq!(rig.voice_count(), 0);
}

#[tokio::test]
async fn producers_from_another_context_are_rejected() {
    let rig = Rig::new();
    let (_tx, stale) = rig.session.create_external_source("player".into()).await.unwrap();
    rig.session.teardown();
    rig.session.initialize().await.unwrap();

    let err = rig.session.connect_external_source(&stale).unwrap_err();
    assert!(matches!(err, RoutingError::ContextMismatch { .. }));

    // The rest of the mix is unaffected.
    assert!(matches!(
        rig.player.set_level("rain", 0.5).await,
        Ok(crate::player::LevelOutcome::Started { .. })
    ));
}

#[tokio::test]
async fn registered_producers_join_future_routes() {
    let rig = Rig::new();
    let (_tx, source) = rig.session.create_external_source("player".into()).await.unwrap();

    assert!(!rig.session.connect_external_source(&source).unwrap());
    let route = rig.session.establish_secondary_route().await.unwrap();

    assert!(!route.keep_alive);
    assert_eq!(route_sources(&rig), vec![SourceKey::External(source.id())]);

    rig.session.disconnect_external_source(source.id());
    assert!(route_sources(&rig).is_empty());
}

#[tokio::test]
async fn hung_up_producers_do_not_replace_the_keep_alive() {
    let rig = Rig::new();
    let (tx, source) = rig.session.create_external_source("player".into()).await.unwrap();
    rig.session.connect_external_source(&source).unwrap();
    drop(tx);
    drop(source);

    let route = rig.session.establish_secondary_route().await.unwrap();
    assert!(route.keep_alive);

    assert!(rig.session.context().unwrap().render_quantum());
    assert_eq!(route_sources(&rig), vec![SourceKey::KeepAlive]);
}

#[tokio::test]
async fn resumed_context_is_announced_once() {
    let rig = Rig::new();
    let ctx = rig.session.initialize().await.unwrap();
    let mut events = rig.session.events().subscribe();

    rig.session.initialize().await.unwrap();
    ctx.suspend();
    rig.session.resume_current().await.unwrap();

    let resumed: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::ContextResumed { .. }))
        .collect();
    assert_eq!(resumed, vec![SessionEvent::ContextResumed { context: ctx.id() }]);
}

#[tokio::test]
async fn mute_only_silences_the_normal_output() {
    let rig = Rig::new();
    rig.player.set_level("rain", 0.8).await.unwrap();
    rig.session.establish_secondary_route().await.unwrap();
    let normal = rig.session.subscribe_normal_output().await.unwrap();
    let secondary = rig.session.capture_secondary_track().unwrap();

    rig.session.set_normal_output_muted(true);
    let ctx = rig.session.context().unwrap();
    assert!(ctx.render_quantum());

    let heard = normal.frames().unwrap().try_recv().unwrap();
    let captured = secondary.frames().unwrap().try_recv().unwrap();
    assert!(heard.iter().all(|&s| s == 0));
    assert!(captured.iter().any(|&s| s != 0));
}

#[tokio::test]
async fn mute_survives_a_new_context() {
    let rig = Rig::new();
    rig.session.set_normal_output_muted(true);

    let ctx = rig.session.initialize().await.unwrap();
    assert!(ctx.graph().normal_muted());
    assert!(rig.session.snapshot().normal_muted);
}

#[tokio::test]
async fn teardown_without_a_route_is_safe() {
    let rig = Rig::new();
    assert_eq!(rig.session.teardown_secondary_route(), None);
    rig.session.teardown();
    rig.session.teardown();
    assert!(rig.session.context().is_none());
}

#[tokio::test]
async fn capture_needs_a_route() {
    let rig = Rig::new();
    rig.session.initialize().await.unwrap();
    assert!(matches!(
        rig.session.capture_secondary_track(),
        Err(RoutingError::NoActiveRoute)
    ));
}

#[tokio::test]
async fn unknown_channels_do_not_touch_the_graph() {
    let rig = Rig::new();
    assert!(matches!(
        rig.player.set_level("thunder", 0.4).await,
        Err(MixError::NoSuchChannel(_))
    ));
    assert_eq!(rig.voice_count(), 0);
}

// ── secondary output ─────────────────────────────────────────────────────────

#[tokio::test]
async fn open_plays_the_combined_stream_and_mutes_speakers() {
    let rig = Rig::new();
    rig.player.set_level("rain", 0.5).await.unwrap();
    let (output, surface) = output(&rig, platform(false, true));

    let route = output.open(canvas()).await.unwrap();

    assert!(output.is_active());
    assert_eq!(rig.session.route().unwrap().id, route);
    assert!(!surface.is_paused());
    let stream = surface.stream().unwrap();
    assert_eq!(stream.video_tracks(), 1);
    assert!(stream.audio_track().is_some());
    assert!(rig.session.normal_output_muted());
    assert_eq!(output.monitor_tick().await, TickOutcome::Healthy);
}

#[tokio::test]
async fn rebuilding_twice_leaks_no_tracks() {
    let rig = Rig::new();
    rig.player.set_level("wind", 0.3).await.unwrap();
    let (output, _surface) = output(&rig, platform(false, true));

    output.open(canvas()).await.unwrap();
    let ctx = rig.session.context().unwrap();
    let after_one = ctx.registry().live();

    output.open(canvas()).await.unwrap();
    output.open(canvas()).await.unwrap();

    assert_eq!(ctx.registry().live(), after_one);
    assert_eq!(ctx.graph().destination_count(), 1);

    output.close(CloseReason::UserClosed).await;
    assert_eq!(ctx.registry().live(), 0);
}

#[tokio::test]
async fn close_is_idempotent_and_announced_once() {
    let rig = Rig::new();
    let (output, surface) = output(&rig, platform(false, true));
    let mut events = rig.session.events().subscribe();

    let route = output.open(None).await.unwrap();
    assert_eq!(output.close(CloseReason::UserClosed).await, Some(route));
    assert_eq!(output.close(CloseReason::UserClosed).await, None);
    assert_eq!(output.notify_route_closed().await, None);
    output.on_environment(EnvironmentEvent::SurfaceLeftPip).await;

    assert_eq!(closed(&drain(&mut events)), vec![CloseReason::UserClosed]);
    assert!(!rig.session.has_route());
    assert!(!rig.session.normal_output_muted());
    assert!(surface.stream().is_none());
    assert_eq!(output.monitor_tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn leaving_pip_closes_as_consumer() {
    let rig = Rig::new();
    let (output, _surface) = output(&rig, platform(false, true));
    let mut events = rig.session.events().subscribe();

    output.open(canvas()).await.unwrap();
    output.on_environment(EnvironmentEvent::SurfaceLeftPip).await;

    assert!(!output.is_active());
    assert_eq!(closed(&drain(&mut events)), vec![CloseReason::ConsumerClosed]);
}

#[tokio::test]
async fn externally_requested_mute_is_left_alone() {
    let rig = Rig::new();
    rig.session.set_normal_output_muted(true);
    let (output, _surface) = output(&rig, platform(false, true));

    output.open(None).await.unwrap();
    output.close(CloseReason::UserClosed).await;

    assert!(rig.session.normal_output_muted());
}

#[tokio::test]
async fn unsupported_platform_refuses_to_open() {
    let rig = Rig::new();
    let (output, _surface) = output(&rig, platform(false, false));

    assert!(matches!(output.open(canvas()).await, Err(RoutingError::Unsupported)));
    assert!(!rig.session.has_route());
}

#[tokio::test]
async fn rejected_playback_cleans_up() {
    let rig = Rig::new();
    rig.player.set_level("rain", 0.5).await.unwrap();
    let (output, surface) = output(&rig, platform(false, true));
    surface.reject_play(true);

    assert!(matches!(
        output.open(canvas()).await,
        Err(RoutingError::Surface(_))
    ));
    assert!(!output.is_active());
    assert!(!rig.session.has_route());
    assert_eq!(rig.session.context().unwrap().registry().live(), 0);
    assert!(!rig.session.normal_output_muted());
}

// ── recovery ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn suspended_context_is_resumed_without_a_rebuild() {
    let rig = Rig::new();
    let (output, surface) = output(&rig, platform(false, true));
    let route = output.open(canvas()).await.unwrap();

    rig.session.context().unwrap().suspend();
    surface.force_pause();

    assert_eq!(output.monitor_tick().await, TickOutcome::SurfaceResumed);
    assert!(rig.session.context().unwrap().is_running());
    assert!(!surface.is_paused());
    assert_eq!(output.route(), Some(route));
}

#[tokio::test]
async fn native_return_from_background_rebuilds_the_route() {
    let rig = Rig::new();
    rig.player.set_level("birds", 0.7).await.unwrap();
    let (output, surface) = output(&rig, platform(true, true));
    let first = output.open(canvas()).await.unwrap();
    let mut events = rig.session.events().subscribe();

    output.on_environment(EnvironmentEvent::Backgrounded).await;
    output.on_environment(EnvironmentEvent::Foregrounded).await;

    assert!(matches!(output.monitor_tick().await, TickOutcome::Degraded(_)));
    assert_eq!(output.monitor_state().await, MonitorState::Recovering);
    assert_eq!(output.monitor_tick().await, TickOutcome::Reestablished);

    let second = output.route().unwrap();
    assert_ne!(first, second);
    assert_eq!(surface.attaches(), 2);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        SessionEvent::RecoveryStarted { route, attempt: 1 } if *route == first
    )));
    assert_eq!(rig.session.snapshot().route_sources.len(), 1);
}

#[tokio::test]
async fn standard_platform_ignores_a_harmless_return() {
    let rig = Rig::new();
    let (output, _surface) = output(&rig, platform(false, true));
    output.open(None).await.unwrap();

    output.on_environment(EnvironmentEvent::Backgrounded).await;
    output.on_environment(EnvironmentEvent::Foregrounded).await;

    assert_eq!(output.monitor_tick().await, TickOutcome::Healthy);
}

#[tokio::test]
async fn persistent_interruption_closes_with_recovery_failed() {
    let rig = Rig::new();
    rig.player.set_level("rain", 0.5).await.unwrap();
    let (output, _surface) = output(&rig, platform(false, true));
    output.open(canvas()).await.unwrap();
    let mut events = rig.session.events().subscribe();

    output.on_environment(EnvironmentEvent::InterruptionBegan).await;

    assert!(matches!(output.monitor_tick().await, TickOutcome::Degraded(_)));
    for _ in 0..3 {
        assert!(matches!(
            output.monitor_tick().await,
            TickOutcome::ReestablishFailed(_)
        ));
    }
    assert_eq!(output.monitor_tick().await, TickOutcome::Exhausted);

    assert!(!output.is_active());
    assert!(!rig.session.has_route());
    assert!(!rig.session.normal_output_muted());
    assert_eq!(closed(&drain(&mut events)), vec![CloseReason::RecoveryFailed]);

    // The mix itself survives the lost route.
    assert!(rig.player.channel("rain").unwrap().active);
}

#[tokio::test]
async fn interruption_end_rebuilds_an_active_route() {
    let rig = Rig::new();
    let (output, _surface) = output(&rig, platform(false, true));
    output.open(None).await.unwrap();

    output.on_environment(EnvironmentEvent::InterruptionBegan).await;
    output.on_environment(EnvironmentEvent::InterruptionEnded).await;

    assert!(matches!(output.monitor_tick().await, TickOutcome::Degraded(_)));
    assert_eq!(output.monitor_tick().await, TickOutcome::Reestablished);
    assert!(rig.session.context().unwrap().is_running());
}

#[tokio::test]
async fn returning_without_pip_resumes_the_context() {
    let rig = Rig::new();
    let (output, _surface) = output(&rig, platform(false, true));
    let ctx = rig.session.initialize().await.unwrap();

    output.on_environment(EnvironmentEvent::InterruptionBegan).await;
    assert!(!ctx.is_running());
    output.on_environment(EnvironmentEvent::InterruptionEnded).await;
    assert!(ctx.is_running());
}
