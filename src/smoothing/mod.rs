pub mod debounce;
pub mod dispatch;
pub mod driver;
pub mod smoother;
pub mod throttle;

pub use debounce::Debouncer;
pub use dispatch::ChannelDispatcher;
pub use driver::{ActiveChannels, LevelDriver, TickOutput};
pub use smoother::{ChannelLevel, SmootherBank};
pub use throttle::Throttle;
