//! Per-channel workers feeding the channel player.
//!
//! Each channel gets a `watch` channel and a task that applies levels in
//! order. While a level is being applied (possibly waiting on a decode),
//! newer values coalesce to the latest one.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::{
    common::{ChannelName, MixError},
    player::ChannelPlayer,
};

pub struct ChannelDispatcher {
    player: Arc<ChannelPlayer>,
    senders: HashMap<ChannelName, watch::Sender<f32>>,
}

impl ChannelDispatcher {
    pub fn spawn(player: Arc<ChannelPlayer>, cancel: CancellationToken) -> Self {
        let mut senders = HashMap::new();

        for name in player.channel_names() {
            let (tx, rx) = watch::channel(0.0f32);
            senders.insert(name.clone(), tx);
            tokio::spawn(channel_worker(
                name.clone(),
                rx,
                player.clone(),
                cancel.child_token(),
            ));
        }

        Self { player, senders }
    }

    /// Queue `value` for `channel`. An in-flight start for an older value is
    /// superseded immediately.
    pub fn dispatch(&self, channel: &str, value: f32) -> Result<(), MixError> {
        let tx = self
            .senders
            .get(channel)
            .ok_or_else(|| MixError::NoSuchChannel(ChannelName::from(channel)))?;
        self.player.note_target(channel, value)?;
        tx.send_replace(value);
        Ok(())
    }
}

async fn channel_worker(
    channel: ChannelName,
    mut rx: watch::Receiver<f32>,
    player: Arc<ChannelPlayer>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *rx.borrow_and_update();
                match player.set_level(&channel, value).await {
                    Ok(outcome) => trace!("[{}] {:.3} -> {:?}", channel, value, outcome),
                    Err(e) => warn!("[{}] level {:.3} not applied: {}", channel, value, e),
                }
            }
        }
    }
    trace!("[{}] dispatcher stopped", channel);
}
