pub mod config;
pub mod logging;

pub mod algorithm;
pub mod control;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod results;
pub mod scheduler;
pub mod spec;

pub use error::{CoreError, ErrorKind, Result, ValidationError};
pub use scheduler::{Scheduler, SchedulerLimits, Submission};
