pub mod error;
pub mod factory;
pub mod future_buffer;
pub mod ip;
pub mod progress;
pub mod record;
pub mod route;
pub mod sampling;
pub mod scheduler;
pub mod sink;

pub use error::SynthError;
pub use factory::{FlowRecordFactory, GenerationContext};
pub use record::{FlowRecord, SystemId};
pub use scheduler::{RunStats, SchedulerConfig, StreamScheduler};
