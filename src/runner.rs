use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::classifier::{parse_markers, parse_status_codes, Classifier, Finding, RuleSet, Verdict};
use crate::dedup::DuplicateSuppressor;
use crate::fetch::{
    build_fetcher, ClientBuildError, FetchOptions, FetchResult, Fetcher, TransportKind,
    DEFAULT_MAX_CONTENT_READ,
};
use crate::monitor::{spawn_monitor, ProgressSnapshot, RunSummary, ScanStats};
use crate::pool::{spawn_workers, PoolConfig};
use crate::producer::{produce_urls, ProducerConfig};
use crate::resources::{
    MemoryCeiling, ResourceGovernor, Unbounded, DEFAULT_MEMORY_CEILING_MB,
};
use crate::words::{HostTables, WordConfig, WordGenerator};

pub const URL_CHANNEL_CAPACITY: usize = 250;
const MIN_RESULT_CHANNEL_CAPACITY: usize = 120;

/// The result channel holds three results per request slot so a slow
/// consumer does not stall the pool right away.
pub fn result_channel_capacity(concurrency: usize) -> usize {
    concurrency
        .saturating_mul(3)
        .max(MIN_RESULT_CHANNEL_CAPACITY)
}

#[derive(Clone, Debug)]
pub struct Options {
    pub hosts: Vec<String>,
    pub paths: Vec<String>,
    pub markers: Vec<String>,
    pub base_paths: Vec<String>,
    pub concurrency: usize,
    /// Requests per second, 0 means "same as concurrency".
    pub rate: u32,
    pub timeout: Duration,
    pub max_content_read: usize,
    pub min_content_size: u64,
    /// Comma separated status codes, empty disables the status rule.
    pub http_status: String,
    pub content_types: Vec<String>,
    pub disallowed_content_types: Vec<String>,
    pub disallowed_strings: Vec<String>,
    pub words: WordConfig,
    pub skip_root: bool,
    pub generate_words: bool,
    pub ignore_base_path_slash: bool,
    pub force_http: bool,
    pub disable_duplicate_check: bool,
    pub headers: Vec<(String, String)>,
    pub proxy: Option<String>,
    pub transport: TransportKind,
    pub memory_ceiling_mb: u64,
    pub progress_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            paths: Vec::new(),
            markers: Vec::new(),
            base_paths: Vec::new(),
            concurrency: 10,
            rate: 0,
            timeout: Duration::from_secs(12),
            max_content_read: DEFAULT_MAX_CONTENT_READ,
            min_content_size: 0,
            http_status: String::new(),
            content_types: Vec::new(),
            disallowed_content_types: Vec::new(),
            disallowed_strings: Vec::new(),
            words: WordConfig::default(),
            skip_root: false,
            generate_words: true,
            ignore_base_path_slash: false,
            force_http: false,
            disable_duplicate_check: false,
            headers: Vec::new(),
            proxy: None,
            transport: TransportKind::Standard,
            memory_ceiling_mb: DEFAULT_MEMORY_CEILING_MB,
            progress_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no hosts provided")]
    NoHosts,

    #[error("no paths provided (blank and '##' comment lines are ignored)")]
    NoPaths,

    #[error("invalid proxy: {proxy}: {source}")]
    InvalidProxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: ClientBuildError,
    },

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

/// A validated scan, ready to run.
#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    pub fn new(mut options: Options) -> Result<Self, RunnerError> {
        options.hosts = options
            .hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| h.to_string())
            .collect();
        if options.hosts.is_empty() {
            return Err(RunnerError::NoHosts);
        }

        options.paths.retain(|p| !p.trim().is_empty());
        if !options
            .paths
            .iter()
            .any(|p| !p.starts_with(crate::producer::COMMENT_PREFIX))
        {
            return Err(RunnerError::NoPaths);
        }

        for (name, value) in options.headers.iter() {
            validate_header(name, value)?;
        }

        options.proxy = options
            .proxy
            .take()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if let Some(proxy) = options.proxy.as_deref() {
            reqwest::Proxy::all(proxy).map_err(|e| RunnerError::InvalidProxy {
                proxy: proxy.to_string(),
                source: e,
            })?;
        }

        options.concurrency = options.concurrency.max(1);
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.options.timeout,
            max_content_read: self.options.max_content_read,
            concurrency: self.options.concurrency,
            extra_headers: self.options.headers.clone(),
            proxy: self.options.proxy.clone(),
        }
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            status_codes: parse_status_codes(&self.options.http_status),
            min_size: self.options.min_content_size,
            content_types: self.options.content_types.clone(),
            disallowed_content_types: self.options.disallowed_content_types.clone(),
            disallowed_strings: self.options.disallowed_strings.clone(),
        }
    }

    /// Runs the scan over the network with the configured transport.
    pub async fn run<F, P>(&self, on_finding: F, on_progress: P) -> Result<RunSummary, RunnerError>
    where
        F: FnMut(Finding),
        P: FnMut(ProgressSnapshot) + Send + 'static,
    {
        let fetcher = build_fetcher(self.options.transport, self.fetch_options())
            .map_err(|e| RunnerError::HttpClientBuild { source: e })?;
        self.run_with_fetcher(fetcher, on_finding, on_progress).await
    }

    /// Producer, worker pool and consumer wired together.
    ///
    /// `on_finding` runs on the calling task for every match, in arrival
    /// order. Returns once the producer is done and every emitted URL has been
    /// fetched and classified.
    pub async fn run_with_fetcher<F, P>(
        &self,
        fetcher: Arc<dyn Fetcher>,
        mut on_finding: F,
        on_progress: P,
    ) -> Result<RunSummary, RunnerError>
    where
        F: FnMut(Finding),
        P: FnMut(ProgressSnapshot) + Send + 'static,
    {
        let started_at = Instant::now();
        let options = &self.options;
        let stats = Arc::new(ScanStats::new());

        let classifier = Classifier::new(self.rule_set(), parse_markers(&options.markers));
        if classifier.markers().is_empty() && !classifier.rules().has_predicates() {
            tracing::warn!("no markers and no rules configured, every response will match");
        }
        let dedup = if options.disable_duplicate_check {
            None
        } else {
            Some(DuplicateSuppressor::new())
        };

        let (url_tx, url_rx) = mpsc::channel::<String>(URL_CHANNEL_CAPACITY);
        let (result_tx, mut result_rx) =
            mpsc::channel::<FetchResult>(result_channel_capacity(options.concurrency));

        let producer_handle = tokio::spawn({
            let hosts = options.hosts.clone();
            let paths = options.paths.clone();
            let config = ProducerConfig {
                skip_root: options.skip_root,
                generate_words: options.generate_words,
                base_paths: options.base_paths.clone(),
                ignore_base_path_slash: options.ignore_base_path_slash,
                force_http: options.force_http,
            };
            let generator = WordGenerator::new(Arc::new(HostTables::new()), options.words.clone());
            let governor: Box<dyn ResourceGovernor> = if options.memory_ceiling_mb == 0 {
                Box::new(Unbounded)
            } else {
                Box::new(MemoryCeiling::new(options.memory_ceiling_mb))
            };
            let stats = stats.clone();
            async move {
                produce_urls(
                    &hosts,
                    &paths,
                    &config,
                    &generator,
                    governor.as_ref(),
                    &url_tx,
                    &stats,
                )
                .await
            }
        });

        let worker_handles = spawn_workers(
            PoolConfig::new(options.concurrency, options.rate),
            fetcher,
            url_rx,
            result_tx,
            stats.clone(),
        );
        let monitor = spawn_monitor(stats.clone(), options.progress_interval, on_progress);

        while let Some(result) = result_rx.recv().await {
            match classifier.classify(&result, dedup.as_ref()) {
                Verdict::Error => stats.record_error(),
                Verdict::Duplicate => stats.record_duplicate(),
                Verdict::Match(finding) => {
                    stats.record_match();
                    on_finding(finding);
                }
                Verdict::Excluded(_) | Verdict::NoMatch(_) => {}
            }
        }
        monitor.stop().await;

        let emitted = producer_handle
            .await
            .map_err(|e| RunnerError::TaskJoin { source: e })?;
        for joined in futures::future::join_all(worker_handles).await {
            joined.map_err(|e| RunnerError::TaskJoin { source: e })?;
        }

        let summary = stats.summary(started_at.elapsed());
        tracing::info!(
            emitted,
            processed = summary.processed,
            matches = summary.matches,
            errors = summary.errors,
            "scan finished"
        );
        Ok(summary)
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), RunnerError> {
    reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        RunnerError::InvalidHeader {
            name: name.to_string(),
            message: e.to_string(),
        }
    })?;
    reqwest::header::HeaderValue::from_str(value).map_err(|e| RunnerError::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(hosts: &[&str], paths: &[&str]) -> Options {
        Options {
            hosts: hosts.iter().map(|s| s.to_string()).collect(),
            paths: paths.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_missing_hosts_and_paths() {
        assert!(matches!(
            Runner::new(options(&["  ", ""], &["env"])),
            Err(RunnerError::NoHosts)
        ));
        assert!(matches!(
            Runner::new(options(&["a.example.com"], &["## only a comment", " "])),
            Err(RunnerError::NoPaths)
        ));
    }

    #[test]
    fn rejects_bad_headers_and_proxies() {
        let mut opts = options(&["a.example.com"], &["env"]);
        opts.headers = vec![("Bad Header".to_string(), "x".to_string())];
        assert!(matches!(
            Runner::new(opts),
            Err(RunnerError::InvalidHeader { .. })
        ));

        let mut opts = options(&["a.example.com"], &["env"]);
        opts.proxy = Some("ftp://127.0.0.1:21".to_string());
        assert!(matches!(
            Runner::new(opts),
            Err(RunnerError::InvalidProxy { .. })
        ));
    }

    #[test]
    fn normalizes_inputs() {
        let mut opts = options(&[" a.example.com ", ""], &["env", "", "## note"]);
        opts.proxy = Some("   ".to_string());
        opts.concurrency = 0;
        let runner = Runner::new(opts).unwrap();
        assert_eq!(runner.options().hosts, vec!["a.example.com"]);
        assert_eq!(runner.options().paths, vec!["env", "## note"]);
        assert_eq!(runner.options().proxy, None);
        assert_eq!(runner.options().concurrency, 1);
    }

    #[test]
    fn result_channel_scales_with_concurrency() {
        assert_eq!(result_channel_capacity(10), 120);
        assert_eq!(result_channel_capacity(100), 300);
    }

    #[test]
    fn rule_set_parses_status_codes() {
        let mut opts = options(&["a.example.com"], &["env"]);
        opts.http_status = "200, 403,abc".to_string();
        opts.min_content_size = 10;
        let rules = Runner::new(opts).unwrap().rule_set();
        assert_eq!(rules.status_codes.len(), 2);
        assert_eq!(rules.min_size, 10);
    }
}
