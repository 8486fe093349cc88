use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

pub const DEFAULT_SHARDS: usize = 256;
pub const DEFAULT_CAPACITY: usize = 10_000;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
pub fn fnv1a64(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Remembers which (host, response size) pairs were already reported.
///
/// Keys are hashed once with FNV-1a and routed to a shard by the low bits of
/// the hash, so concurrent callers only contend when they hit the same shard.
/// Each shard is an independent LRU with `capacity / shards` slots. Two keys
/// with colliding hashes are treated as the same response.
pub struct DuplicateSuppressor {
    shards: Vec<Mutex<LruCache<u64, ()>>>,
    mask: u64,
}

impl Default for DuplicateSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplicateSuppressor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_SHARDS)
    }

    /// `shards` is rounded up to a power of two; every shard holds at least
    /// one entry.
    pub fn with_capacity(total: usize, shards: usize) -> Self {
        let shards = shards.max(1).next_power_of_two();
        let per_shard = NonZeroUsize::new((total / shards).max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            shards: (0..shards)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            mask: (shards - 1) as u64,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns true the first time `(host, size)` is seen. Later calls return
    /// false until the entry is evicted from its shard.
    pub fn is_new(&self, host: &str, size: u64) -> bool {
        let key = fnv1a64(format!("{host}:{size}").as_bytes());
        let mut shard = self.shards[(key & self.mask) as usize].lock();
        if shard.get(&key).is_some() {
            return false;
        }
        shard.put(key, ());
        true
    }
}

/// Host part used as the duplicate key, `host[:port]`. Falls back to the raw
/// string when the URL does not parse.
pub fn host_key(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}
