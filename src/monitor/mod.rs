use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::resources::MemorySampler;

const MIN_TICK: Duration = Duration::from_millis(10);

/// Counters shared by the producer, the workers and the consumer.
#[derive(Debug, Default)]
pub struct ScanStats {
    emitted: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
    matches: AtomicU64,
    duplicates: AtomicU64,
    dropped: AtomicU64,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// A result that could not be handed to the consumer.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn matches(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn summary(&self, elapsed: Duration) -> RunSummary {
        RunSummary {
            emitted: self.emitted(),
            processed: self.processed(),
            errors: self.errors(),
            matches: self.matches(),
            duplicates: self.duplicates(),
            dropped: self.dropped(),
            elapsed,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    /// URLs emitted so far, grows while the producer runs.
    pub total: u64,
    pub rps: f64,
    pub memory_mb: Option<u64>,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed as f64 / self.total as f64 * 100.0
    }
}

/// Turns successive counter readings into throughput and ETA figures.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    last_at: Instant,
    last_processed: u64,
}

impl ProgressTracker {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            last_at: started,
            last_processed: 0,
        }
    }

    pub fn sample(
        &mut self,
        stats: &ScanStats,
        memory_mb: Option<u64>,
        now: Instant,
    ) -> ProgressSnapshot {
        let processed = stats.processed();
        let total = stats.emitted();
        let elapsed = now.saturating_duration_since(self.started);

        let interval = now.saturating_duration_since(self.last_at).as_secs_f64();
        let rps = if interval > 0.0 {
            processed.saturating_sub(self.last_processed) as f64 / interval
        } else {
            0.0
        };
        self.last_at = now;
        self.last_processed = processed;

        let eta = if processed > 0 && total > 0 {
            let estimated = elapsed.as_secs_f64() * total as f64 / processed as f64;
            Some(Duration::from_secs_f64(
                (estimated - elapsed.as_secs_f64()).max(0.0),
            ))
        } else {
            None
        };

        ProgressSnapshot {
            processed,
            total,
            rps,
            memory_mb,
            elapsed,
            eta,
        }
    }
}

/// Running progress reporter, see [`spawn_monitor`].
pub struct MonitorHandle {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

/// Calls `on_tick` with a fresh snapshot every `interval` until stopped.
pub fn spawn_monitor<F>(
    stats: Arc<ScanStats>,
    interval: Duration,
    mut on_tick: F,
) -> MonitorHandle
where
    F: FnMut(ProgressSnapshot) + Send + 'static,
{
    let (stop, mut stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let sampler = MemorySampler::new();
        let mut tracker = ProgressTracker::new(Instant::now());
        let mut ticker = tokio::time::interval(interval.max(MIN_TICK));
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => {
                    let memory_mb = sampler.resident_bytes().map(|b| b / 1024 / 1024);
                    on_tick(tracker.sample(&stats, memory_mb, Instant::now()));
                }
            }
        }
    });
    MonitorHandle { stop, handle }
}

/// Final figures of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub emitted: u64,
    pub processed: u64,
    pub errors: u64,
    pub matches: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    fn rate(&self, part: u64) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        part as f64 / self.processed as f64 * 100.0
    }

    pub fn error_rate(&self) -> f64 {
        self.rate(self.errors)
    }

    pub fn success_rate(&self) -> f64 {
        self.rate(self.processed.saturating_sub(self.errors))
    }

    /// Share of emitted URLs whose result never reached the consumer.
    pub fn drop_rate(&self) -> f64 {
        if self.emitted == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.emitted as f64 * 100.0
    }
}
