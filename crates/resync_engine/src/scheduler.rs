//! Debounce timer for scheduled syncs.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A single cancellable delayed task.
///
/// Scheduling replaces (aborts) whatever was pending. The task body runs
/// inside the timer task, so work that must survive cancellation has to be
/// spawned from the body rather than awaited in it.
#[derive(Debug, Default)]
pub(crate) struct DebounceTimer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    /// Runs `task` after `delay`, replacing any pending timer.
    ///
    /// Returns false when called outside a tokio runtime.
    pub(crate) fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        }));
        true
    }

    /// Aborts the pending timer, if any. Returns true if one was pending.
    pub(crate) fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Returns true if a timer is waiting to fire.
    pub(crate) fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn schedule_without_runtime_is_refused() {
        let timer = DebounceTimer::default();
        assert!(!timer.schedule(Duration::from_millis(1), || {}));
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_collapses_into_one_run() {
        let timer = DebounceTimer::default();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            assert!(timer.schedule(Duration::from_millis(100), move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_run() {
        let timer = DebounceTimer::default();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        timer.schedule(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timer.cancel());
        assert!(!timer.cancel());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
