pub mod tables;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

pub use tables::HostTables;

pub const DEFAULT_ENV_WORDS: &[&str] = &[
    "prod", "qa", "dev", "test", "uat", "stg", "stage", "sit", "api",
];

pub const DEFAULT_BYPASS_SUFFIXES: &[&str] = &[";", "..;"];

#[derive(Clone, Debug)]
pub struct WordConfig {
    /// Keep only the first N labels of the host (0 keeps all).
    pub host_depth: usize,
    pub env_words: Vec<String>,
    pub append_envs: bool,
    pub remove_envs: bool,
    pub append_bypasses: bool,
    pub bypass_suffixes: Vec<String>,
    /// Hard cap on emitted words per host (0 is unlimited).
    pub max_words_per_host: usize,
}

impl Default for WordConfig {
    fn default() -> Self {
        Self {
            host_depth: 0,
            env_words: DEFAULT_ENV_WORDS.iter().map(|s| s.to_string()).collect(),
            append_envs: true,
            remove_envs: false,
            append_bypasses: false,
            bypass_suffixes: DEFAULT_BYPASS_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_words_per_host: 0,
        }
    }
}

/// Derives candidate path segments from hostnames.
#[derive(Clone, Debug)]
pub struct WordGenerator {
    tables: Arc<HostTables>,
    config: WordConfig,
}

impl WordGenerator {
    pub fn new(tables: Arc<HostTables>, mut config: WordConfig) -> Self {
        config.env_words = config
            .env_words
            .iter()
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        config.bypass_suffixes.retain(|b| !b.is_empty());
        Self { tables, config }
    }

    /// Lazily yields the words for `host`. Calling it again restarts the
    /// sequence from the beginning; the order is fully determined by the
    /// host and the config.
    pub fn words(&self, host: &str) -> Words<'_> {
        let labels = self.labels(host);
        Words {
            generator: self,
            labels,
            stage: Stage::Labels,
            cursor: 0,
            base: Vec::new(),
            seen: HashSet::new(),
            pending: VecDeque::new(),
            emitted: 0,
        }
    }

    fn labels(&self, host: &str) -> Vec<String> {
        let host = match self.tables.normalize_host(host) {
            Some(host) => host,
            None => return Vec::new(),
        };
        let cleaned = self.tables.strip_noise(&host);
        let mut labels: Vec<String> = cleaned
            .split('.')
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect();
        if labels.first().map(|l| l == "www").unwrap_or(false) {
            labels.remove(0);
        }
        if self.config.host_depth > 0 && labels.len() > self.config.host_depth {
            labels.truncate(self.config.host_depth);
        }
        labels
    }

    fn label_candidates(&self, label: &str) -> Vec<String> {
        if !is_acceptable(label) {
            return Vec::new();
        }
        let mut out = vec![label.to_string()];
        out.extend(
            label
                .split(['-', '_'])
                .filter(|s| s.chars().count() > 1)
                .map(|s| s.to_string()),
        );
        if let Some(start) = self.tables.env_suffix_start(label) {
            out.push(label[..start].to_string());
        }
        if let Some(start) = self.tables.trailing_digits_start(label) {
            out.push(label[..start].to_string());
        }
        for n in [3, 4] {
            if label.chars().count() >= n {
                out.push(label.chars().take(n).collect());
            }
        }
        out
    }

    fn env_variants(&self, word: &str) -> Vec<String> {
        let envs = &self.config.env_words;
        if !self.tables.is_only_alpha(word) || envs.iter().any(|e| word.ends_with(e.as_str())) {
            return Vec::new();
        }
        let mut out = Vec::new();
        for env in envs.iter().filter(|e| !word.contains(e.as_str())) {
            out.push(format!("{word}{env}"));
            out.push(format!("{word}-{env}"));
            out.push(format!("{word}_{env}"));
            out.push(format!("{word}/{env}"));
        }
        out
    }

    fn env_stripped(&self, word: &str) -> Option<String> {
        if !self.tables.is_only_alpha(word) {
            return None;
        }
        self.config
            .env_words
            .iter()
            .find(|e| word.ends_with(e.as_str()))
            .map(|e| word[..word.len() - e.len()].to_string())
    }
}

/// A word is usable as a path segment when it has at least two characters
/// and is not purely numeric.
fn is_acceptable(word: &str) -> bool {
    word.chars().count() > 1 && !word.chars().all(|c| c.is_ascii_digit())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Labels,
    EnvAppend,
    EnvRemove,
    Bypass,
    Done,
}

/// Iterator over the words of one host, see [`WordGenerator::words`].
#[derive(Debug)]
pub struct Words<'a> {
    generator: &'a WordGenerator,
    labels: Vec<String>,
    stage: Stage,
    cursor: usize,
    // words produced from the labels themselves, in emission order; the
    // later stages derive from these only
    base: Vec<String>,
    seen: HashSet<String>,
    pending: VecDeque<String>,
    emitted: usize,
}

impl Words<'_> {
    fn admit(&mut self, word: String, is_base: bool) {
        if !is_acceptable(&word) || !self.seen.insert(word.clone()) {
            return;
        }
        if is_base {
            self.base.push(word.clone());
        }
        self.pending.push_back(word);
    }

    fn limit_reached(&self) -> bool {
        let limit = self.generator.config.max_words_per_host;
        limit > 0 && self.emitted >= limit
    }

    fn advance(&mut self, next: Stage) {
        self.stage = next;
        self.cursor = 0;
    }

    /// Queues the next batch of candidates. Returns false once every stage
    /// is exhausted.
    fn refill(&mut self) -> bool {
        let generator = self.generator;
        let config = &generator.config;
        match self.stage {
            Stage::Labels => {
                let Some(label) = self.labels.get(self.cursor).cloned() else {
                    self.advance(Stage::EnvAppend);
                    return true;
                };
                self.cursor += 1;
                for candidate in generator.label_candidates(&label) {
                    self.admit(candidate, true);
                }
            }
            Stage::EnvAppend => {
                if !config.append_envs || self.cursor >= self.base.len() {
                    self.advance(Stage::EnvRemove);
                    return true;
                }
                let word = self.base[self.cursor].clone();
                self.cursor += 1;
                for variant in generator.env_variants(&word) {
                    self.admit(variant, false);
                }
            }
            Stage::EnvRemove => {
                if !config.remove_envs || self.cursor >= self.base.len() {
                    self.advance(Stage::Bypass);
                    return true;
                }
                let word = self.base[self.cursor].clone();
                self.cursor += 1;
                if let Some(stripped) = generator.env_stripped(&word) {
                    self.admit(stripped, false);
                }
            }
            Stage::Bypass => {
                if !config.append_bypasses || self.cursor >= self.base.len() {
                    self.advance(Stage::Done);
                    return true;
                }
                let word = self.base[self.cursor].clone();
                self.cursor += 1;
                for suffix in config.bypass_suffixes.iter() {
                    self.admit(format!("{word}{suffix}"), false);
                }
            }
            Stage::Done => return false,
        }
        true
    }
}

impl Iterator for Words<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.limit_reached() {
                return None;
            }
            if let Some(word) = self.pending.pop_front() {
                self.emitted += 1;
                return Some(word);
            }
            if !self.refill() {
                return None;
            }
        }
    }
}
