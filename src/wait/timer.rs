//! Cancellable one-shot timers
//!
//! A single background tokio runtime drives every stable-period and deadline
//! timer of a client. Callbacks run on the runtime's worker thread, so they
//! must not block for long.

use std::io;
use std::time::Duration;

use log::debug;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::AbortHandle;

/// Owns the timer runtime; dropping it cancels every outstanding timer
#[derive(Debug)]
pub struct TimerService {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl TimerService {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("rte-timer")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            handle: self.handle.clone(),
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Drop may run inside a timer callback's thread; don't block there
            runtime.shutdown_background();
            debug!("timer runtime shut down");
        }
    }
}

/// Cheap handle used to schedule timers
#[derive(Debug, Clone)]
pub struct TimerHandle {
    handle: Handle,
}

impl TimerHandle {
    /// Run `callback` once after `delay` unless the returned timer is
    /// cancelled first
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> Timer
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Timer {
            abort: task.abort_handle(),
        }
    }
}

/// A scheduled callback
///
/// Cancelling only prevents callbacks that have not started yet. Callers that
/// race a firing timer must make the callback itself a no-op.
#[derive(Debug)]
pub struct Timer {
    abort: AbortHandle,
}

impl Timer {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_timer_fires() {
        let service = TimerService::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let _timer = service.handle().schedule(Duration::from_millis(10), move || {
            tx.send(()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let service = TimerService::new().unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        let timer = service.handle().schedule(Duration::from_millis(50), move || {
            let _ = tx.send(());
        });
        timer.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
