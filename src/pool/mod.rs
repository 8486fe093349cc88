use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::fetch::{FetchResult, Fetcher};
use crate::monitor::ScanStats;

pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    pub workers: usize,
    /// Requests allowed in flight at once.
    pub concurrency: usize,
    /// Requests per second across all workers.
    pub rate: u32,
}

impl PoolConfig {
    /// `rate` of 0 falls back to `concurrency`, like the CLI default.
    pub fn new(concurrency: usize, rate: u32) -> Self {
        let concurrency = concurrency.max(1);
        let rate = if rate == 0 {
            u32::try_from(concurrency).unwrap_or(u32::MAX)
        } else {
            rate
        };
        Self {
            workers: concurrency,
            concurrency,
            rate,
        }
    }

    pub fn limiter(&self) -> Limiter {
        let per_second = NonZeroU32::new(self.rate).unwrap_or(NonZeroU32::MIN);
        RateLimiter::direct(Quota::per_second(per_second).allow_burst(per_second))
    }
}

/// Starts `config.workers` tasks that share `urls` and feed `results`.
///
/// Each URL takes a semaphore slot and a rate limiter token before it is
/// fetched. The slot is released as soon as the fetch returns; the result is
/// then sent with a blocking send, so a slow consumer stalls the workers
/// instead of losing results. `results` closes once every worker has exited,
/// which happens when `urls` is closed and drained.
pub fn spawn_workers(
    config: PoolConfig,
    fetcher: Arc<dyn Fetcher>,
    urls: mpsc::Receiver<String>,
    results: mpsc::Sender<FetchResult>,
    stats: Arc<ScanStats>,
) -> Vec<JoinHandle<()>> {
    let urls = Arc::new(Mutex::new(urls));
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let limiter = Arc::new(config.limiter());

    (0..config.workers.max(1))
        .map(|id| {
            let urls = urls.clone();
            let semaphore = semaphore.clone();
            let limiter = limiter.clone();
            let fetcher = fetcher.clone();
            let results = results.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                loop {
                    let next = urls.lock().await.recv().await;
                    let Some(url) = next else {
                        break;
                    };

                    let permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    limiter.until_ready().await;
                    let result = fetcher.fetch(&url).await;
                    stats.record_processed();
                    drop(permit);

                    if results.send(result).await.is_err() {
                        stats.record_dropped();
                        tracing::warn!("worker {id}: result channel closed, stopping");
                        break;
                    }
                }
                tracing::debug!("worker {id} finished");
            })
        })
        .collect()
}
