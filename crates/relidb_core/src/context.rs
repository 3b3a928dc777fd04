//! Transaction cancellation contexts.
//!
//! Every transaction closure runs under a [`Context`]. The engine checks
//! the context before each backend operation and touches it after each
//! successful one, so cancellation propagates at I/O boundaries without
//! corrupting storage state: the closure sees the error, unwinds, and the
//! transaction rolls back.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TouchState {
    window: Duration,
    last: Mutex<Instant>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    touch: Option<TouchState>,
}

/// A cancellation token scoped to one transaction.
///
/// Three variants beyond the inert [`Context::background`]:
///
/// - [`Context::with_cancel`] - fired explicitly through a
///   [`CancelHandle`]
/// - [`Context::with_timeout`] - absolute deadline
/// - [`Context::with_touch`] - sliding deadline, reset by every
///   successful engine operation ("make forward progress or die")
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    fn from_parts(deadline: Option<Instant>, touch: Option<TouchState>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                touch,
            }),
        }
    }

    /// Returns a context that never fires.
    #[must_use]
    pub fn background() -> Self {
        Self::from_parts(None, None)
    }

    /// Returns a context fired by the paired [`CancelHandle`].
    #[must_use]
    pub fn with_cancel() -> (Self, CancelHandle) {
        let ctx = Self::from_parts(None, None);
        let handle = CancelHandle {
            inner: Arc::clone(&ctx.inner),
        };
        (ctx, handle)
    }

    /// Returns a context that times out `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::from_parts(Some(Instant::now() + timeout), None)
    }

    /// Returns a touch context with the given sliding window.
    ///
    /// The window restarts on every [`Context::touch`]; a gap of `window`
    /// or more between touches times the transaction out at its next
    /// operation.
    #[must_use]
    pub fn with_touch(window: Duration) -> Self {
        Self::from_parts(
            None,
            Some(TouchState {
                window,
                last: Mutex::new(Instant::now()),
            }),
        )
    }

    /// Returns an error if the context has fired.
    ///
    /// # Errors
    ///
    /// [`Error::ContextCancelled`] after [`CancelHandle::cancel`],
    /// [`Error::TransactionTimedOut`] after a deadline or touch window
    /// elapses.
    pub fn check(&self) -> Result<()> {
        if self.inner.cancelled.load(Ordering::Relaxed) {
            return Err(Error::ContextCancelled);
        }
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return Err(Error::TransactionTimedOut);
            }
        }
        if let Some(touch) = &self.inner.touch {
            if touch.last.lock().elapsed() >= touch.window {
                return Err(Error::TransactionTimedOut);
            }
        }
        Ok(())
    }

    /// Restarts the sliding window of a touch context.
    ///
    /// The engine calls this after every successful operation; closures
    /// doing long work between operations may call it directly. No-op for
    /// other context variants.
    pub fn touch(&self) {
        if let Some(touch) = &self.inner.touch {
            *touch.last.lock() = Instant::now();
        }
    }
}

/// Fires the paired [`Context`].
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    /// Cancels the paired context.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn background_never_fires() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        ctx.touch();
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_fires_context() {
        let (ctx, handle) = Context::with_cancel();
        assert!(ctx.check().is_ok());
        handle.cancel();
        assert!(matches!(ctx.check(), Err(Error::ContextCancelled)));
    }

    #[test]
    fn deadline_fires_after_timeout() {
        let ctx = Context::with_timeout(Duration::from_millis(20));
        assert!(ctx.check().is_ok());
        thread::sleep(Duration::from_millis(40));
        assert!(matches!(ctx.check(), Err(Error::TransactionTimedOut)));
    }

    #[test]
    fn touch_resets_sliding_window() {
        let ctx = Context::with_touch(Duration::from_millis(100));
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(40));
            assert!(ctx.check().is_ok());
            ctx.touch();
        }
        thread::sleep(Duration::from_millis(120));
        assert!(matches!(ctx.check(), Err(Error::TransactionTimedOut)));
    }
}
