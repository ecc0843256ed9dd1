use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use super::TargetLocator;

/// Background thread calling [`TargetLocator::tick`] at a fixed period.
///
/// Stopping is cooperative: a tick already running completes first.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(locator: Arc<TargetLocator>, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            debug!("Ticker started with period {:?}", period);
            while !flag.load(Ordering::Acquire) {
                thread::park_timeout(period);
                if flag.load(Ordering::Acquire) {
                    break;
                }
                locator.tick();
            }
            debug!("Ticker stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Ticker thread panicked; periodic ticks had stopped");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
