//! Workload engine.
//!
//! Couples the logical clock, the run coordinator, and a producer — a
//! population of state-machine actors or a replay of an existing event
//! file — into one runnable job.
//!
//! # Example
//!
//! ```ignore
//! use synthload_engine::{JobConfig, JobDriver, Termination, TimeConfig};
//!
//! let workload = serde_json::from_str(workload_json)?;
//! let config = JobConfig::new("smoke", WorkloadConfig::from_value(&workload)?, target)
//!     .with_termination(Termination::Records(10_000))
//!     .with_time(TimeConfig::simulated())
//!     .with_seed(42);
//!
//! let driver = JobDriver::new(config)?;
//! driver.run()?;
//! println!("{:?}", driver.report());
//! ```

pub mod actor;
pub mod config;
mod error;
pub mod lifecycle;
pub mod replay;
pub mod runner;
pub mod spawner;

pub use config::{
    target_from_value, JobConfig, SinkErrorPolicy, TimeConfig, WorkloadConfig,
    DEFAULT_MAX_ENTITIES,
};
pub use error::JobError;
pub use lifecycle::{RunCoordinator, Termination};
pub use runner::{JobDriver, JobReport, JobStatus};
