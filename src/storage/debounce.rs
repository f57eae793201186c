//! Trailing-edge debouncer
//!
//! Coalesces a burst of calls into a single invocation carrying the arguments of the
//! last call, fired once the burst has been quiet for the configured wait. The pending
//! argument and the timer task are held explicitly so the coalescing is observable.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

type Action<T> = Box<dyn Fn(T) + Send + Sync>;

struct Inner<T> {
    pending: Mutex<Option<T>>,
    generation: AtomicU64,
    invocations: AtomicUsize,
    action: Action<T>,
}

impl<T> Inner<T> {
    fn fire(&self) {
        let arg = lock(&self.pending).take();
        if let Some(arg) = arg {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            (self.action)(arg);
        }
    }
}

/// Debounced wrapper around an action taking `T`
pub struct Debouncer<T: Send + 'static> {
    wait: Duration,
    inner: Arc<Inner<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(wait: Duration, action: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            wait,
            inner: Arc::new(Inner {
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
                invocations: AtomicUsize::new(0),
                action: Box::new(action),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Replace the pending argument and restart the quiet-period timer.
    ///
    /// Outside a tokio runtime there is nothing to schedule on, so the action runs
    /// immediately.
    pub fn call(&self, arg: T) {
        *lock(&self.inner.pending) = Some(arg);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No runtime available, invoking debounced action immediately");
                self.inner.fire();
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        let wait = self.wait;
        let task = handle.spawn(async move {
            tokio::time::sleep(wait).await;
            // A newer call owns the timer now
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.fire();
            }
        });

        if let Some(previous) = lock(&self.timer).replace(task) {
            previous.abort();
        }
    }

    /// Run the pending action now, if any
    pub fn flush(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
        self.inner.fire();
    }

    /// Drop the pending action without running it
    pub fn cancel(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
        lock(&self.inner.pending).take();
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner.pending).is_some()
    }

    /// Number of times the action has run
    pub fn invocations(&self) -> usize {
        self.inner.invocations.load(Ordering::SeqCst)
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        // Pending writes must not be lost when the owner goes away
        self.flush();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
