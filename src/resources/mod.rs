use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Pid, System};

pub const DEFAULT_MEMORY_CEILING_MB: u64 = 900;
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

/// Policy consulted by the producer between batches of URLs.
#[async_trait]
pub trait ResourceGovernor: Send + Sync {
    /// Returns once the producer may continue. Implementations may sleep.
    async fn throttle(&self);
}

/// Never pauses.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unbounded;

#[async_trait]
impl ResourceGovernor for Unbounded {
    async fn throttle(&self) {}
}

/// Reads the resident memory of the current process.
pub struct MemorySampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("cannot determine own pid, memory sampling disabled: {e}");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }

    pub fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| p.memory())
    }
}

type MemoryProbe = Box<dyn Fn() -> Option<u64> + Send + Sync>;

/// Pauses the producer while process memory is above a ceiling, giving the
/// workers time to drain the channels.
pub struct MemoryCeiling {
    ceiling_bytes: u64,
    pause: Duration,
    probe: MemoryProbe,
    pauses: AtomicU64,
}

impl MemoryCeiling {
    /// Ceiling in MiB, measured with a [`MemorySampler`].
    pub fn new(ceiling_mb: u64) -> Self {
        let sampler = MemorySampler::new();
        Self::with_probe(
            ceiling_mb * 1024 * 1024,
            DEFAULT_PAUSE,
            Box::new(move || sampler.resident_bytes()),
        )
    }

    pub fn with_probe(ceiling_bytes: u64, pause: Duration, probe: MemoryProbe) -> Self {
        Self {
            ceiling_bytes,
            pause,
            probe,
            pauses: AtomicU64::new(0),
        }
    }

    /// How many times the producer was held back.
    pub fn pauses(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResourceGovernor for MemoryCeiling {
    async fn throttle(&self) {
        if self.ceiling_bytes == 0 {
            return;
        }
        let used = match (self.probe)() {
            Some(used) => used,
            None => return,
        };
        if used > self.ceiling_bytes {
            self.pauses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "memory {} MiB above ceiling {} MiB, pausing producer",
                used / 1024 / 1024,
                self.ceiling_bytes / 1024 / 1024
            );
            tokio::time::sleep(self.pause).await;
        }
    }
}
