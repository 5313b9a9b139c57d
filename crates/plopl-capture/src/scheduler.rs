//! Timer and task scheduling seam.
//!
//! The correlator and the emitter only talk to [`Scheduler`]; the tokio
//! implementation is the one used in production and in tests (with paused
//! time).

use futures::future::{AbortHandle, Abortable, BoxFuture};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,
}

/// Cancellable handle for a scheduled task.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    /// Cancel the task if it has not run yet. Idempotent.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

pub trait Scheduler: Send + Sync {
    /// Run a task in the background.
    fn spawn(&self, task: BoxFuture<'static, ()>);

    /// A future that completes after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Run `task` once after `delay` unless the returned handle is cancelled
    /// first.
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let (abort, registration) = AbortHandle::new_pair();
        let sleep = self.sleep(delay);
        let timed = Abortable::new(
            async move {
                sleep.await;
                task.await;
            },
            registration,
        );
        self.spawn(Box::pin(async move {
            let _ = timed.await;
        }));
        TimerHandle { abort }
    }
}

/// Scheduler backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling thread.
    pub fn current() -> Result<Self, SchedulerError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|_| SchedulerError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }

    /// The timer is registered with the bound runtime, so capture threads
    /// outside it can schedule work too.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let _runtime = self.handle.enter();
        Box::pin(tokio::time::sleep(duration))
    }
}
