use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::fetch::{FetchError, FetchResult, Fetcher};
use crate::runner::{Options, Runner};

const LEAK: &str = r#"{"activeProfiles":["qa"],"propertySources":[]}"#;
const NOT_FOUND: &str = "<html><body>Not Found</body></html>";
const RUN_DEADLINE: Duration = Duration::from_secs(20);

/// Serves a leaking actuator under `/vendorgo-qa/`, refuses `/broken/`, and
/// answers 404 everywhere else.
struct ScriptedFetcher {
    seen: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl ScriptedFetcher {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        self.seen.lock().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if url.contains("/broken/") {
            return FetchResult::failed(url, FetchError::Request("connection refused".into()));
        }
        let (status, body) = if url.contains("/vendorgo-qa/") {
            (200, LEAK)
        } else {
            (404, NOT_FOUND)
        };
        FetchResult {
            url: url.to_string(),
            content: body.as_bytes().to_vec(),
            total_size: body.len() as u64,
            status,
            content_type: "application/json".to_string(),
            error: None,
        }
    }
}

fn options(hosts: &[&str], paths: &[&str]) -> Options {
    Options {
        hosts: hosts.iter().map(|s| s.to_string()).collect(),
        paths: paths.iter().map(|s| s.to_string()).collect(),
        markers: vec!["activeProfiles".to_string()],
        // the limiter would otherwise pace every run at `concurrency` req/s
        rate: 100_000,
        memory_ceiling_mb: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn host_derived_urls_reach_the_fetcher() {
    let fetcher = ScriptedFetcher::new(Duration::ZERO);
    let runner = Runner::new(options(&["vendorgo.abc.targetdomain.com"], &["env"])).unwrap();
    let mut findings = Vec::new();
    let summary = runner
        .run_with_fetcher(fetcher.clone(), |f| findings.push(f), |_| {})
        .await
        .unwrap();

    let seen: HashSet<String> = fetcher.seen().into_iter().collect();
    for expected in [
        "https://vendorgo.abc.targetdomain.com/env",
        "https://vendorgo.abc.targetdomain.com/vendorgo/env",
        "https://vendorgo.abc.targetdomain.com/vendorgo-qa/env",
    ] {
        assert!(seen.contains(expected), "missing {expected}");
    }
    // the tld never becomes a word
    assert!(!seen.contains("https://vendorgo.abc.targetdomain.com/com/env"));

    assert_eq!(findings.len(), 1);
    assert_eq!(
        findings[0].url,
        "https://vendorgo.abc.targetdomain.com/vendorgo-qa/env"
    );
    assert_eq!(findings[0].marker.as_deref(), Some("activeProfiles"));
    assert_eq!(summary.matches, 1);
    assert_eq!(summary.emitted, seen.len() as u64);
}

#[tokio::test]
async fn same_sized_matches_on_one_host_are_reported_once() {
    let fetcher = ScriptedFetcher::new(Duration::ZERO);
    let mut opts = options(&["vendorgo.example.com"], &["env", "actuator/env"]);
    opts.concurrency = 1;
    let runner = Runner::new(opts.clone()).unwrap();
    let mut findings = Vec::new();
    // a single worker still gets through every generated url quickly
    let summary = tokio::time::timeout(
        RUN_DEADLINE,
        runner.run_with_fetcher(fetcher, |f| findings.push(f), |_| {}),
    )
    .await
    .expect("scan finished in time")
    .unwrap();
    assert!(summary.emitted > 400);
    assert_eq!(findings.len(), 1);
    assert_eq!(summary.duplicates, 1);

    opts.disable_duplicate_check = true;
    let runner = Runner::new(opts).unwrap();
    let mut findings = Vec::new();
    tokio::time::timeout(
        RUN_DEADLINE,
        runner.run_with_fetcher(ScriptedFetcher::new(Duration::ZERO), |f| findings.push(f), |_| {}),
    )
    .await
    .expect("scan finished in time")
    .unwrap();
    assert_eq!(findings.len(), 2);
}

#[tokio::test]
async fn transport_errors_are_counted_not_fatal() {
    let mut opts = options(&["a.example.com"], &["env"]);
    opts.base_paths = vec!["broken".to_string()];
    opts.generate_words = false;
    let runner = Runner::new(opts).unwrap();
    let summary = runner
        .run_with_fetcher(ScriptedFetcher::new(Duration::ZERO), |_| {}, |_| {})
        .await
        .unwrap();
    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.matches, 0);
    assert!((summary.error_rate() - 50.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_consumer_loses_nothing() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(1));
    let hosts: Vec<String> = (0..10).map(|i| format!("svc{i}.example.com")).collect();
    let host_refs: Vec<&str> = hosts.iter().map(|s| s.as_str()).collect();
    let mut opts = options(&host_refs, &["env", "## comment", ".git/config"]);
    opts.concurrency = 4;
    opts.disable_duplicate_check = true;
    opts.markers = Vec::new();
    opts.progress_interval = Duration::from_millis(20);
    opts.words.max_words_per_host = 15;
    let runner = Runner::new(opts).unwrap();

    let mut classified = 0u64;
    let summary = runner
        .run_with_fetcher(
            fetcher.clone(),
            |_| {
                // everything matches without markers or rules; block the
                // consumer so the result channel fills up
                classified += 1;
                std::thread::sleep(Duration::from_micros(200));
            },
            |_| {},
        )
        .await
        .unwrap();

    assert!(summary.emitted > 120);
    assert_eq!(summary.processed, summary.emitted);
    assert_eq!(classified, summary.emitted);
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.drop_rate(), 0.0);
    assert_eq!(fetcher.seen().len() as u64, summary.emitted);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 4);
}

#[tokio::test]
async fn rules_gate_applies_without_markers() {
    let mut opts = options(&["vendorgo.example.com"], &["env"]);
    opts.markers = Vec::new();
    opts.http_status = "200".to_string();
    opts.min_content_size = 10;
    let runner = Runner::new(opts).unwrap();
    let mut findings = Vec::new();
    runner
        .run_with_fetcher(ScriptedFetcher::new(Duration::ZERO), |f| findings.push(f), |_| {})
        .await
        .unwrap();
    // only the leaking url answers 200
    assert!(!findings.is_empty());
    assert!(findings.iter().all(|f| f.status == 200 && f.marker.is_none()));
    assert!(findings.iter().all(|f| f.url.contains("/vendorgo-qa/")));
}

#[tokio::test]
async fn skip_root_and_force_http_shape_urls() {
    let fetcher = ScriptedFetcher::new(Duration::ZERO);
    let mut opts = options(&["https://a.example.com:8443/"], &["/env"]);
    opts.skip_root = true;
    opts.force_http = true;
    opts.base_paths = vec!["api/".to_string()];
    opts.generate_words = false;
    let runner = Runner::new(opts).unwrap();
    runner
        .run_with_fetcher(fetcher.clone(), |_| {}, |_| {})
        .await
        .unwrap();
    assert_eq!(fetcher.seen(), vec!["http://a.example.com:8443/api/env"]);
}
