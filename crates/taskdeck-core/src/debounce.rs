//! Cancellable debounce timer for the dashboard search box.
//!
//! One owned timer handle: scheduling again aborts the previous timer, so
//! the action fires only after a full quiet interval.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Arm the timer. Any previously armed action is cancelled first.
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        debug!(delay_ms = delay.as_millis() as u64, "debounce armed");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
