pub mod audio;
pub mod catalog;
pub mod common;
pub mod configs;
pub mod engine;
pub mod forest;
pub mod player;
pub mod recovery;
pub mod secondary;
pub mod server;
pub mod session;
pub mod smoothing;
pub mod transport;

#[cfg(test)]
mod test_support;
