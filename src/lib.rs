pub mod bucket;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observer;
pub mod packet;
pub mod rank;
pub mod scheduler;
pub mod workload;

// Re-export for easier testing
pub use config::{DiagnosticsConfig, QueueConfig, RankScale, SchedulerKind};
pub use error::ConfigError;
pub use rank::Ranked;
pub use scheduler::{Exclusive, PartitionTree, RankScheduler, RotatingArray};
