pub mod fanout;
pub mod graph;
pub mod layer;
pub mod tone;
pub mod voice;

pub use fanout::{FrameFanout, MediaTrack, TrackKind, TrackRegistry};
pub use graph::{MixGraph, SourceKey, VoiceInfo};
pub use layer::{ExternalLayer, ExternalSource};
pub use tone::KeepAliveTone;
pub use voice::{GainNode, LoopVoice};
