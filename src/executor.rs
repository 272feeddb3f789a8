//! Executors driving the periodic reclamation sweep

use std::fmt;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use crossbeam::select;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

use crate::errors::{PoolError, PoolResult};

/// A periodic task; returning `false` stops it.
pub type PeriodicTask = Box<dyn FnMut() -> bool + Send>;

/// Runs tasks at a fixed rate.
pub trait ScheduledExecutor: Send + Sync + fmt::Debug {
    /// Run `task` every `period`, starting one period from now.
    fn schedule_at_fixed_rate(
        &self,
        period: Duration,
        task: PeriodicTask,
    ) -> PoolResult<ScheduledTask>;
}

/// Handle to a scheduled task; cancels the task when dropped.
pub struct ScheduledTask {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduledTask {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("cancelled", &self.cancel.is_none())
            .finish()
    }
}

/// Runs each task on its own background thread.
///
/// # Examples
///
/// ```
/// use objectpool::{ScheduledExecutor, ThreadExecutor};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// let task = ThreadExecutor::default()
///     .schedule_at_fixed_rate(
///         Duration::from_millis(5),
///         Box::new(move || counter.fetch_add(1, Ordering::SeqCst) < 2),
///     )
///     .unwrap();
///
/// std::thread::sleep(Duration::from_millis(100));
/// task.cancel();
/// assert_eq!(runs.load(Ordering::SeqCst), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ThreadExecutor {
    thread_name: String,
}

impl ThreadExecutor {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new("objectpool-sweep")
    }
}

impl ScheduledExecutor for ThreadExecutor {
    fn schedule_at_fixed_rate(
        &self,
        period: Duration,
        mut task: PeriodicTask,
    ) -> PoolResult<ScheduledTask> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(period);
        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if !task() {
                                break;
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .map_err(|e| PoolError::Executor(e.to_string()))?;
        Ok(ScheduledTask::new(move || drop(stop_tx)))
    }
}

/// Runs tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> PoolResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| PoolError::Executor(e.to_string()))
    }
}

impl ScheduledExecutor for TokioExecutor {
    fn schedule_at_fixed_rate(
        &self,
        period: Duration,
        mut task: PeriodicTask,
    ) -> PoolResult<ScheduledTask> {
        let join = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if !task() {
                    break;
                }
            }
        });
        Ok(ScheduledTask::new(move || join.abort()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(runs: &Arc<AtomicUsize>) -> PeriodicTask {
        let runs = Arc::clone(runs);
        Box::new(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            true
        })
    }

    #[test]
    fn test_thread_executor_stops_on_drop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = ThreadExecutor::default()
            .schedule_at_fixed_rate(Duration::from_millis(5), counting(&runs))
            .unwrap();
        thread::sleep(Duration::from_millis(60));
        drop(task);
        thread::sleep(Duration::from_millis(20));
        let after_cancel = runs.load(Ordering::SeqCst);
        assert!(after_cancel > 0);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_tokio_executor_runs_and_aborts() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = TokioExecutor::current()
            .unwrap()
            .schedule_at_fixed_rate(Duration::from_millis(5), counting(&runs))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        task.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_cancel = runs.load(Ordering::SeqCst);
        assert!(after_cancel > 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn test_tokio_executor_needs_a_runtime() {
        assert!(matches!(TokioExecutor::current(), Err(PoolError::Executor(_))));
    }
}
