pub mod base;
pub mod catalog;
pub mod logging;
pub mod mixer;
pub mod server;

pub use base::*;
pub use catalog::*;
pub use logging::*;
pub use mixer::*;
pub use server::*;
