use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A restartable one-shot timer.
///
/// Starting it again replaces the pending callback. Dropping it cancels.
#[derive(Debug, Default)]
pub struct Timer {
    handle: Option<JoinHandle<()>>,
    /// Set once the current callback is past its delay
    fired: Arc<AtomicBool>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fire` after `delay`, cancelling whatever was pending.
    pub fn start<F>(&mut self, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let fired = Arc::new(AtomicBool::new(false));
        self.fired = fired.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fired.store(true, Ordering::SeqCst);
            fire.await;
        }));
    }

    /// Like [`Timer::start`], but a callback that already began running is
    /// left to finish; only a callback still waiting is replaced.
    pub fn debounce<F>(&mut self, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.fired.load(Ordering::SeqCst) {
            // Detach: dropping a JoinHandle does not abort the task.
            self.handle.take();
        }
        self.start(delay, fire);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}
