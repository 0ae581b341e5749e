//! Shared configuration, error type and timer abstraction for the MIGII
//! realtime gateway crates.

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::MigiiConfig;
pub use error::{MigiiError, Result};
pub use scheduler::{Scheduler, TokioScheduler};
