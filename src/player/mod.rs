pub mod channel;
pub mod state;

pub use channel::ChannelPlayer;
pub use state::{ChannelSnapshot, ChannelState, LevelOutcome, PlayingInstance};
