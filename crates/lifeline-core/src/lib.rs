pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::LifelineConfig;
pub use types::*;
