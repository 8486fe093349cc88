pub mod fast;
pub mod standard;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::header::{HeaderMap, HeaderName};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

pub use fast::FastClient;
pub use standard::StandardClient;

pub const DEFAULT_MAX_CONTENT_READ: usize = 5 * 1024 * 1024;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36 Edg/91.0.864.59",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "es-ES,es;q=0.9",
    "fr-FR,fr;q=0.9",
    "de-DE,de;q=0.8",
    "it-IT,it;q=0.9",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("error reading body: {0}")]
    Body(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Outcome of one bounded GET.
///
/// `content` holds at most `max_content_read` bytes; `total_size` is what the
/// server says the full resource is, which may be larger.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub url: String,
    pub content: Vec<u8>,
    pub total_size: u64,
    pub status: u16,
    pub content_type: String,
    pub error: Option<FetchError>,
}

impl FetchResult {
    pub fn failed(url: &str, error: FetchError) -> Self {
        Self {
            url: url.to_string(),
            error: Some(error),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// reqwest based client, honours the proxy.
    #[default]
    Standard,
    /// Bare hyper client with a larger idle pool.
    Fast,
}

#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_content_read: usize,
    pub concurrency: usize,
    /// Applied after the randomized headers, so they win on conflicts.
    pub extra_headers: Vec<(String, String)>,
    pub proxy: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            max_content_read: DEFAULT_MAX_CONTENT_READ,
            concurrency: 10,
            extra_headers: Vec::new(),
            proxy: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("failed to setup proxy: {proxy}: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),
}

pub fn build_fetcher(
    kind: TransportKind,
    options: FetchOptions,
) -> Result<Arc<dyn Fetcher>, ClientBuildError> {
    Ok(match kind {
        TransportKind::Standard => Arc::new(StandardClient::new(options)?),
        TransportKind::Fast => Arc::new(FastClient::new(options)?),
    })
}

/// Headers for one request: randomized browser-like headers, then the range
/// cap, then the user supplied headers.
pub(crate) fn request_headers(url: &str, options: &FetchOptions) -> Vec<(String, String)> {
    let mut headers = randomized_headers(url);
    headers.push(("Range".to_string(), range_header(options.max_content_read)));
    for (name, value) in options.extra_headers.iter() {
        headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        headers.push((name.clone(), value.clone()));
    }
    headers
}

fn randomized_headers(url: &str) -> Vec<(String, String)> {
    let mut rng = rand::thread_rng();
    let mut headers = vec![
        ("User-Agent".to_string(), random_user_agent(&mut rng)),
        (
            "Accept-Language".to_string(),
            ACCEPT_LANGUAGES
                .choose(&mut rng)
                .copied()
                .unwrap_or(ACCEPT_LANGUAGES[0])
                .to_string(),
        ),
        ("Referer".to_string(), url.to_string()),
        ("Origin".to_string(), url.to_string()),
        ("Accept".to_string(), "*/*".to_string()),
    ];
    if rng.gen::<f32>() < 0.5 {
        headers.push(("DNT".to_string(), "1".to_string()));
    }
    if rng.gen::<f32>() < 0.3 {
        headers.push(("Upgrade-Insecure-Requests".to_string(), "1".to_string()));
    }
    headers
}

/// Picks a base user agent and replaces the patch component of every
/// `product/x.y.z` token with a random number.
fn random_user_agent<R: Rng>(rng: &mut R) -> String {
    let base = USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0]);
    base.split(' ')
        .map(|token| match token.split_once('/') {
            Some((product, version)) if !version.contains('/') => {
                let mut parts: Vec<String> = version.split('.').map(|p| p.to_string()).collect();
                if parts.len() > 2 {
                    parts[2] = rng.gen_range(0..100u32).to_string();
                }
                format!("{product}/{}", parts.join("."))
            }
            _ => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

pub(crate) fn range_header(max_content_read: usize) -> String {
    format!("bytes=0-{}", max_content_read.saturating_sub(1))
}

/// Full size of the resource: the part after `/` in `Content-Range`, then
/// `Content-Length`, then the number of bytes actually read.
pub(crate) fn resolve_total_size(
    content_range: Option<&str>,
    content_length: Option<&str>,
    bytes_read: usize,
) -> u64 {
    content_range
        .and_then(|v| v.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse::<u64>().ok())
        .or_else(|| content_length.and_then(|v| v.trim().parse::<u64>().ok()))
        .unwrap_or(bytes_read as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_size_prefers_content_range() {
        assert_eq!(
            resolve_total_size(Some("bytes 0-99/73400320"), Some("100"), 100),
            73_400_320
        );
        assert_eq!(resolve_total_size(None, Some("2048"), 100), 2048);
        assert_eq!(resolve_total_size(Some("bytes 0-99/*"), Some("512"), 100), 512);
        assert_eq!(resolve_total_size(None, None, 321), 321);
        assert_eq!(resolve_total_size(Some("garbage"), Some("x"), 7), 7);
    }

    #[test]
    fn range_covers_read_cap() {
        assert_eq!(range_header(5 * 1024 * 1024), "bytes=0-5242879");
        assert_eq!(range_header(1), "bytes=0-0");
    }

    #[test]
    fn user_agent_patch_is_randomized() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let ua = random_user_agent(&mut rng);
            assert!(ua.starts_with("Mozilla/5.0 ("));
            assert!(USER_AGENTS
                .iter()
                .any(|base| base.split(' ').count() == ua.split(' ').count()));
            if let Some(chrome) = ua.split(' ').find(|t| t.starts_with("Chrome/")) {
                let version: Vec<&str> = chrome["Chrome/".len()..].split('.').collect();
                assert_eq!(version.len(), 4);
                assert_eq!(version[0], "91");
                assert!(version[2].parse::<u32>().unwrap() < 100);
            }
        }
    }

    #[test]
    fn extra_headers_override_randomized_ones() {
        let options = FetchOptions {
            extra_headers: vec![
                ("user-agent".to_string(), "scanner".to_string()),
                ("X-Bug-Bounty".to_string(), "me".to_string()),
            ],
            max_content_read: 10,
            ..FetchOptions::default()
        };
        let headers = request_headers("https://a.example/x", &options);
        let agents: Vec<&(String, String)> = headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("user-agent"))
            .collect();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].1, "scanner");
        assert!(headers.contains(&("Range".to_string(), "bytes=0-9".to_string())));
        assert!(headers.contains(&("Referer".to_string(), "https://a.example/x".to_string())));
        assert_eq!(headers.last().map(|(n, _)| n.as_str()), Some("X-Bug-Bounty"));
    }

    mod canned_server {
        use std::io::{Read, Write};
        use std::net::{TcpListener, TcpStream};
        use std::sync::{Arc, Mutex};
        use std::thread;
        use std::time::Duration;

        pub const PARTIAL_TOTAL: u64 = 999_999;
        pub const FULL_LENGTH: usize = 5_000;

        /// Serves `/partial` as a 206 slice of a large resource (honouring the
        /// requested range) and `/full` as a plain 200 that ignores ranges.
        /// Returns the base URL and the `Range` headers it received.
        pub fn start() -> (String, Arc<Mutex<Vec<String>>>) {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            let port = listener.local_addr().expect("local addr").port();
            let ranges = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&ranges);
            thread::spawn(move || {
                for stream in listener.incoming().flatten() {
                    let seen = Arc::clone(&seen);
                    thread::spawn(move || handle(stream, &seen));
                }
            });
            (format!("http://127.0.0.1:{port}"), ranges)
        }

        fn handle(mut stream: TcpStream, seen: &Mutex<Vec<String>>) {
            let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
            let mut buf = [0u8; 8192];
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let path = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/")
                .to_string();
            let range = request.lines().find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("range")
                    .then(|| value.trim().to_string())
            });
            if let Some(range) = range.as_ref() {
                seen.lock().expect("lock").push(range.clone());
            }

            let (head, body) = if path == "/partial" {
                let end = range
                    .as_deref()
                    .and_then(|r| r.strip_prefix("bytes=0-"))
                    .and_then(|end| end.parse::<u64>().ok())
                    .unwrap_or(PARTIAL_TOTAL - 1)
                    .min(PARTIAL_TOTAL - 1);
                let body = vec![b'a'; end as usize + 1];
                (
                    format!(
                        "HTTP/1.1 206 Partial Content\r\nContent-Type: application/json\r\nContent-Length: {}\r\nContent-Range: bytes 0-{end}/{PARTIAL_TOTAL}\r\nConnection: close\r\n\r\n",
                        body.len()
                    ),
                    body,
                )
            } else {
                (
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {FULL_LENGTH}\r\nConnection: close\r\n\r\n"
                    ),
                    vec![b'b'; FULL_LENGTH],
                )
            };
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    }

    fn capped_options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(5),
            max_content_read: 100,
            concurrency: 2,
            ..FetchOptions::default()
        }
    }

    async fn check_transport(kind: TransportKind) {
        let (base, ranges) = canned_server::start();
        let fetcher = build_fetcher(kind, capped_options()).unwrap();

        let partial = fetcher.fetch(&format!("{base}/partial")).await;
        assert!(partial.error.is_none(), "{kind:?}: {:?}", partial.error);
        assert_eq!(partial.status, 206);
        assert_eq!(partial.content.len(), 100);
        assert_eq!(partial.total_size, canned_server::PARTIAL_TOTAL);
        assert_eq!(partial.content_type, "application/json");

        let full = fetcher.fetch(&format!("{base}/full")).await;
        assert!(full.error.is_none(), "{kind:?}: {:?}", full.error);
        assert_eq!(full.status, 200);
        assert_eq!(full.content.len(), 100);
        assert_eq!(full.total_size, canned_server::FULL_LENGTH as u64);

        let ranges = ranges.lock().unwrap().clone();
        assert_eq!(ranges, vec!["bytes=0-99".to_string(); 2], "{kind:?}");

        // nothing listens on a port whose listener was just dropped
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);
        let refused = fetcher.fetch(&format!("http://127.0.0.1:{port}/env")).await;
        assert!(refused.error.is_some(), "{kind:?}");
        assert!(refused.content.is_empty());
        assert_eq!(refused.total_size, 0);
    }

    #[tokio::test]
    async fn standard_transport_reads_capped_ranges() {
        check_transport(TransportKind::Standard).await;
    }

    #[tokio::test]
    async fn fast_transport_reads_capped_ranges() {
        check_transport(TransportKind::Fast).await;
    }
}
