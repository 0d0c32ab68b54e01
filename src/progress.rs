use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;

/// Receives `(percent, message)` progress updates during an analysis run.
///
/// May be invoked from worker threads when the analysis is multithreaded.
pub trait ProgressCallback: Sync {
    fn on_progress(&self, percent: u8, message: &str);
}

impl<F> ProgressCallback for F
where
    F: Fn(u8, &str) + Sync,
{
    fn on_progress(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Forwards progress to an optional callback, shielding the batch from callback panics.
pub(crate) struct ProgressTracker<'a> {
    callback: Option<&'a dyn ProgressCallback>,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(callback: Option<&'a dyn ProgressCallback>) -> Self {
        ProgressTracker { callback }
    }

    pub(crate) fn update(&self, percent: u8, message: &str) {
        let Some(callback) = self.callback else {
            return;
        };

        let percent = percent.min(100);
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| callback.on_progress(percent, message)))
        {
            warn!(
                "Progress callback panicked at {}%: {}",
                percent,
                panic_message(payload)
            );
        }
    }

    /// Percent reported around file `index` of `total`: files span the 10..=70 range.
    pub(crate) fn file_percent(index: usize, total: usize) -> u8 {
        if total == 0 {
            return 70;
        }
        (10 + (index.min(total) * 60) / total) as u8
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unexpected panic without message".to_string()
    }
}

/// Cooperative cancellation flag, checked between files.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
