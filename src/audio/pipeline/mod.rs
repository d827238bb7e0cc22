pub mod decoder;
pub mod resampler;

pub use decoder::{PcmDecoder, SymphoniaDecoder};
pub use resampler::Resampler;
