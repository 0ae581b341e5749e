pub mod error;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod rate_limit;
pub mod support;
pub mod workers;
