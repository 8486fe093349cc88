use tokio::sync::mpsc;

use crate::monitor::ScanStats;
use crate::resources::ResourceGovernor;
use crate::words::WordGenerator;

/// The governor is consulted before each host and after this many URLs.
const THROTTLE_EVERY: u64 = 4096;
/// Path list lines starting with this are comments.
pub const COMMENT_PREFIX: &str = "##";

/// Where candidate URLs are rooted: a protocol plus everything after the
/// scheme of the input host (port and path prefix included).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub proto: &'static str,
    pub authority: String,
}

impl Target {
    /// An explicit `http://` is kept, anything else is scanned over HTTPS
    /// unless `force_http` is set.
    pub fn parse(raw: &str, force_http: bool) -> Option<Self> {
        let raw = raw.trim();
        let (explicit_http, rest) = match raw.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("http://") => (true, &raw[7..]),
            _ => match raw.get(..8) {
                Some(scheme) if scheme.eq_ignore_ascii_case("https://") => (false, &raw[8..]),
                _ => (false, raw),
            },
        };
        let authority = rest.trim_end_matches('/');
        if authority.is_empty() {
            return None;
        }
        let proto = if force_http || explicit_http {
            "http"
        } else {
            "https"
        };
        Some(Self {
            proto,
            authority: authority.to_string(),
        })
    }

    pub fn root(&self) -> String {
        format!("{}://{}", self.proto, self.authority)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProducerConfig {
    pub skip_root: bool,
    pub generate_words: bool,
    pub base_paths: Vec<String>,
    /// Join host and base path without a `/`, for base paths that carry
    /// their own separator.
    pub ignore_base_path_slash: bool,
    pub force_http: bool,
}

struct Emitter<'a> {
    tx: &'a mpsc::Sender<String>,
    stats: &'a ScanStats,
    governor: &'a dyn ResourceGovernor,
    sent: u64,
}

impl Emitter<'_> {
    /// Blocks while the channel is full. Returns false once the receiving
    /// side is gone.
    async fn emit(&mut self, url: String) -> bool {
        if self.tx.send(url).await.is_err() {
            return false;
        }
        self.stats.record_emitted();
        self.sent += 1;
        if self.sent % THROTTLE_EVERY == 0 {
            self.governor.throttle().await;
        }
        true
    }
}

/// Streams every candidate URL for `hosts` x `paths` into `tx`.
///
/// Per host and path the order is: the bare path, the path under each base
/// path, then one URL per generated word (under every base path when there
/// are any). Paths starting with `##` are skipped. Returns the number of URLs
/// sent; stops early if the receiver is dropped.
pub async fn produce_urls(
    hosts: &[String],
    paths: &[String],
    config: &ProducerConfig,
    generator: &WordGenerator,
    governor: &dyn ResourceGovernor,
    tx: &mpsc::Sender<String>,
    stats: &ScanStats,
) -> u64 {
    let mut emitter = Emitter {
        tx,
        stats,
        governor,
        sent: 0,
    };
    let base_paths: Vec<&str> = config
        .base_paths
        .iter()
        .map(|b| b.trim().trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .collect();

    for raw_host in hosts.iter() {
        let Some(target) = Target::parse(raw_host, config.force_http) else {
            continue;
        };
        governor.throttle().await;
        let root = target.root();
        let base_sep = if config.ignore_base_path_slash { "" } else { "/" };

        for path in paths.iter() {
            if path.starts_with(COMMENT_PREFIX) {
                continue;
            }
            let path = path.trim_start_matches('/');

            if !config.skip_root && !emitter.emit(format!("{root}/{path}")).await {
                return stopped(emitter.sent);
            }
            for base in base_paths.iter() {
                if !emitter.emit(format!("{root}{base_sep}{base}/{path}")).await {
                    return stopped(emitter.sent);
                }
            }
            if !config.generate_words {
                continue;
            }
            for word in generator.words(raw_host) {
                if base_paths.is_empty() {
                    if !emitter.emit(format!("{root}/{word}/{path}")).await {
                        return stopped(emitter.sent);
                    }
                    continue;
                }
                for base in base_paths.iter() {
                    if !emitter.emit(format!("{root}/{base}/{word}/{path}")).await {
                        return stopped(emitter.sent);
                    }
                }
            }
        }
    }
    emitter.sent
}

fn stopped(sent: u64) -> u64 {
    tracing::warn!("url channel closed, producer stopped after {sent} urls");
    sent
}
