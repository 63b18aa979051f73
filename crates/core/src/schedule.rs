//! Delayed tasks with cancellation handles
//!
//! Cleanup after an attach runs on a timer. Timers go through tokio's clock so
//! tests can run with a paused clock and advance time instead of sleeping.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A unit of work scheduled to run after a delay
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `work` after `delay` on the current tokio runtime
    pub fn after<F>(name: impl Into<String>, delay: Duration, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(task = %task_name, "Running scheduled task");
            work();
        });
        Self { name, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancel the task if it has not run yet
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            debug!(task = %self.name, "Cancelling scheduled task");
            self.handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task; `true` if it ran, `false` if it was cancelled
    pub async fn wait(self) -> bool {
        self.handle.await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = ScheduledTask::after("flag", Duration::from_secs(5), move || {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!ran.load(Ordering::SeqCst));

        assert!(task.wait().await);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = ScheduledTask::after("flag", Duration::from_secs(5), move || {
            flag.store(true, Ordering::SeqCst);
        });

        task.cancel();
        assert!(!task.wait().await);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
