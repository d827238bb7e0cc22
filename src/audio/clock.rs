use std::{sync::Weak, time::Duration};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::context::MixContext;

/// Drive `render_quantum` once per quantum until the context is dropped or
/// the token is cancelled. Holds only a weak reference.
pub(crate) fn spawn_render_clock(ctx: Weak<MixContext>, period: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let Some(ctx) = ctx.upgrade() else {
                        break;
                    };
                    ctx.render_quantum();
                }
            }
        }
        trace!("render clock stopped");
    });
}
