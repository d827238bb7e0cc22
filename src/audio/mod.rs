pub mod buffer;
pub mod clock;
pub mod constants;
pub mod context;
pub mod mix;
pub mod pipeline;
pub mod source;

pub use buffer::{BufferCache, DecodedBuffer, PcmBuffer};
pub use context::{ContextState, MixContext};
pub use mix::{ExternalSource, GainNode, MediaTrack, MixGraph, TrackKind, TrackRegistry};
pub use pipeline::{PcmDecoder, SymphoniaDecoder};
pub use source::{AssetFetcher, AssetLoader};
