//! Per-worker memory self-monitoring.
//!
//! Each worker samples process memory on a fixed interval and logs a warning
//! when resident usage crosses the configured limit. The monitor only
//! observes; it never kills or throttles the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::warn;

/// Handle to a worker's background memory sampler.
pub struct MemoryMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MemoryMonitor {
    /// Spawn a sampler for worker `index` checking every `interval`.
    #[must_use]
    pub fn spawn(index: usize, limit_bytes: u64, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name(format!("turnpike-memmon-{index}"))
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    if let Some(usage) = memory_stats::memory_stats() {
                        let rss = usage.physical_mem as u64;
                        if rss > limit_bytes {
                            warn!(
                                worker = index,
                                rss_bytes = rss,
                                limit_bytes = limit_bytes,
                                "worker memory above limit"
                            );
                        }
                    }
                    // Sleep in short slices so stop() is honored promptly.
                    let mut remaining = interval;
                    let slice = Duration::from_millis(50);
                    while remaining > Duration::ZERO && !stop_flag.load(Ordering::Relaxed) {
                        let step = remaining.min(slice);
                        std::thread::sleep(step);
                        remaining -= step;
                    }
                }
            })
            .ok();
        Self { stop, handle }
    }

    /// Stop sampling and wait for the thread to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
