mod markers;
mod rules;

use serde::Serialize;

use crate::dedup::{host_key, DuplicateSuppressor};
use crate::fetch::FetchResult;

pub use markers::{parse_markers, Marker};
pub use rules::{parse_status_codes, RuleSet};

const PREVIEW_CHARS: usize = 150;
// enough bytes to fill the preview even with multi-byte characters
const PREVIEW_SCAN_BYTES: usize = 600;

/// A response worth reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub url: String,
    /// Label of the first marker that hit, `None` when the rules matched.
    pub marker: Option<String>,
    pub status: u16,
    pub size: u64,
    pub content_type: String,
    pub preview: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Transport error, never classified.
    Error,
    /// Rejected by a disallow list.
    Excluded(&'static str),
    /// Neither a marker nor the rules matched.
    NoMatch(&'static str),
    /// Matched, but the same (host, size) was reported already.
    Duplicate,
    Match(Finding),
}

/// Decides whether a fetched response is a finding.
///
/// Checks run cheapest first: errors, disallowed content types, disallowed
/// body strings. Markers and rules are separate gates: with markers
/// configured the first hit is a match and the rules are not consulted, a
/// miss is not a match. Without markers every configured rule has to pass,
/// and with neither configured everything that survives the disallow lists
/// matches.
#[derive(Clone, Debug)]
pub struct Classifier {
    rules: RuleSet,
    markers: Vec<Marker>,
}

impl Classifier {
    pub fn new(rules: RuleSet, markers: Vec<Marker>) -> Self {
        Self {
            rules: rules.normalized(),
            markers,
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify(&self, result: &FetchResult, dedup: Option<&DuplicateSuppressor>) -> Verdict {
        if let Some(error) = result.error.as_ref() {
            tracing::info!(url = %result.url, "request failed: {error}");
            return Verdict::Error;
        }
        if self.rules.content_type_disallowed(&result.content_type) {
            tracing::info!(
                url = %result.url,
                content_type = %result.content_type,
                "skipped: disallowed content type"
            );
            return Verdict::Excluded("content type");
        }
        if self.rules.body_disallowed(&result.content) {
            tracing::info!(url = %result.url, "skipped: disallowed content string");
            return Verdict::Excluded("content string");
        }

        let marker = if self.markers.is_empty() {
            if !self.rules.passes(result) {
                tracing::info!(
                    url = %result.url,
                    status = result.status,
                    size = result.total_size,
                    "skipped: rules not met"
                );
                return Verdict::NoMatch("rules not met");
            }
            None
        } else {
            match self.markers.iter().find(|m| m.is_found_in(&result.content)) {
                Some(marker) => Some(marker.label().to_string()),
                None => {
                    tracing::info!(url = %result.url, "skipped: no marker found");
                    return Verdict::NoMatch("no marker found");
                }
            }
        };

        if let Some(dedup) = dedup {
            let host = host_key(&result.url);
            if !dedup.is_new(&host, result.total_size) {
                tracing::info!(
                    "skipped duplicate response size {} for host {host}",
                    result.total_size
                );
                return Verdict::Duplicate;
            }
        }

        Verdict::Match(Finding {
            url: result.url.clone(),
            marker,
            status: result.status,
            size: result.total_size,
            content_type: result.content_type.clone(),
            preview: preview(&result.content),
        })
    }
}

/// First characters of the body with line breaks removed.
pub fn preview(body: &[u8]) -> String {
    let head = &body[..body.len().min(PREVIEW_SCAN_BYTES)];
    String::from_utf8_lossy(head)
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .take(PREVIEW_CHARS)
        .collect()
}
