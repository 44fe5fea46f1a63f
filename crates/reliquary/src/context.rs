//! Progress reporting and cooperative cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Receives progress updates from a running operation.
pub trait ProgressSink: Send + Sync {
    /// `fraction` is in `[0, 1]`; `message` is a human-readable status line.
    fn report(&self, fraction: f64, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn report(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}

/// A sink that discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64, _message: &str) {}
}

/// Shared flag used to request cancellation.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Progress sink and cancel token handed to every engine entry point.
///
/// Reports are clamped to `[0, 1]` and never move backwards within one
/// operation. [`Context::begin`] starts a new operation.
pub struct Context {
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
    last: Mutex<f64>,
}

impl Context {
    pub fn new(sink: Arc<dyn ProgressSink>, cancel: CancelToken) -> Self {
        Self {
            sink,
            cancel,
            last: Mutex::new(0.0),
        }
    }

    /// A context with no progress output and a fresh cancel token.
    pub fn silent() -> Self {
        Self::new(Arc::new(NoProgress), CancelToken::new())
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Start a new operation: progress restarts from zero.
    pub fn begin(&self, message: &str) {
        *self.last.lock() = 0.0;
        self.sink.report(0.0, message);
    }

    /// Forward a progress report to the sink.
    pub fn report(&self, fraction: f64, message: &str) {
        debug_assert!(
            (0.0..=1.0).contains(&fraction),
            "progress fraction {fraction} outside [0, 1]"
        );

        let mut last = self.last.lock();
        let fraction = if fraction.is_nan() {
            *last
        } else {
            fraction.clamp(0.0, 1.0).max(*last)
        };
        *last = fraction;
        self.sink.report(fraction, message);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancel", &self.cancel)
            .field("last", &*self.last.lock())
            .finish_non_exhaustive()
    }
}
