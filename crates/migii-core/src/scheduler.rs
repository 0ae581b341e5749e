//! Timer abstraction for poll loops and reconnect backoff.
//!
//! Production code uses [`TokioScheduler`]. Tests inject a
//! [`RecordingScheduler`] (behind the `test-util` feature) so elapsed time is
//! simulated and every requested delay can be asserted.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock scheduler backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use recording::RecordingScheduler;

#[cfg(any(test, feature = "test-util"))]
mod recording {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::Scheduler;

    /// Completes sleeps immediately and records the requested durations.
    ///
    /// With a budget, sleeps beyond the budget never complete, which parks
    /// the caller until it is cancelled by some other branch of a `select!`.
    #[derive(Debug, Default)]
    pub struct RecordingScheduler {
        delays: Mutex<Vec<Duration>>,
        budget: Option<usize>,
    }

    impl RecordingScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_budget(budget: usize) -> Self {
            Self {
                delays: Mutex::new(Vec::new()),
                budget: Some(budget),
            }
        }

        /// Every duration passed to `sleep`, in call order.
        pub fn delays(&self) -> Vec<Duration> {
            self.delays
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        pub fn sleep_count(&self) -> usize {
            self.delays.lock().unwrap_or_else(|e| e.into_inner()).len()
        }
    }

    #[async_trait]
    impl Scheduler for RecordingScheduler {
        async fn sleep(&self, duration: Duration) {
            let calls = {
                let mut delays = self.delays.lock().unwrap_or_else(|e| e.into_inner());
                delays.push(duration);
                delays.len()
            };
            if self.budget.is_some_and(|b| calls > b) {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
        }
    }
}
