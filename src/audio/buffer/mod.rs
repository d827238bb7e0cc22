pub mod cache;
pub mod pcm;
pub mod ring;

pub use cache::BufferCache;
pub use pcm::{DecodedBuffer, PcmBuffer};
pub use ring::SampleRing;
