use std::collections::HashSet;

use memchr::memmem;

use crate::fetch::FetchResult;

/// Bodies above this size are lowercased chunk by chunk instead of all at once.
pub(in crate::classifier) const LARGE_BODY_THRESHOLD: usize = 1024 * 1024;
const SCAN_CHUNK: usize = 64 * 1024;

/// Response predicates. Empty lists and a zero `min_size` mean the predicate
/// is not configured.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    pub status_codes: HashSet<u16>,
    pub min_size: u64,
    pub content_types: Vec<String>,
    pub disallowed_content_types: Vec<String>,
    pub disallowed_strings: Vec<String>,
}

impl RuleSet {
    /// Lowercases every substring list and drops empty entries.
    pub(in crate::classifier) fn normalized(mut self) -> Self {
        for list in [
            &mut self.content_types,
            &mut self.disallowed_content_types,
            &mut self.disallowed_strings,
        ] {
            *list = list
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self
    }

    pub fn has_predicates(&self) -> bool {
        !self.status_codes.is_empty() || self.min_size > 0 || !self.content_types.is_empty()
    }

    pub(in crate::classifier) fn content_type_disallowed(&self, content_type: &str) -> bool {
        if self.disallowed_content_types.is_empty() {
            return false;
        }
        let content_type = content_type.to_lowercase();
        self.disallowed_content_types
            .iter()
            .any(|d| content_type.contains(d.as_str()))
    }

    pub(in crate::classifier) fn body_disallowed(&self, body: &[u8]) -> bool {
        contains_ignore_ascii_case(body, &self.disallowed_strings)
    }

    /// Every configured predicate has to hold.
    pub(in crate::classifier) fn passes(&self, result: &FetchResult) -> bool {
        if !self.status_codes.is_empty() && !self.status_codes.contains(&result.status) {
            return false;
        }
        if self.min_size > 0 && result.total_size < self.min_size {
            return false;
        }
        if !self.content_types.is_empty() {
            let content_type = result.content_type.to_lowercase();
            if !self
                .content_types
                .iter()
                .any(|c| content_type.contains(c.as_str()))
            {
                return false;
            }
        }
        true
    }
}

/// Parses a comma separated status list. Entries that are not valid status
/// codes are reported and ignored.
pub fn parse_status_codes(csv: &str) -> HashSet<u16> {
    let mut out = HashSet::new();
    for entry in csv.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        match entry.parse::<u16>() {
            Ok(code) if (100..=999).contains(&code) => {
                out.insert(code);
            }
            _ => tracing::warn!("ignoring invalid status code '{entry}'"),
        }
    }
    out
}

/// `needles` must already be lowercase.
fn contains_ignore_ascii_case(body: &[u8], needles: &[String]) -> bool {
    if needles.is_empty() || body.is_empty() {
        return false;
    }
    if body.len() <= LARGE_BODY_THRESHOLD {
        let lowered = body.to_ascii_lowercase();
        return needles
            .iter()
            .any(|n| memmem::find(&lowered, n.as_bytes()).is_some());
    }

    // windows overlap by the longest needle so matches across a chunk
    // boundary are still seen
    let overlap = needles.iter().map(|n| n.len()).max().unwrap_or(1).saturating_sub(1);
    let mut window: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + overlap);
    let mut start = 0;
    while start < body.len() {
        let end = (start + SCAN_CHUNK + overlap).min(body.len());
        window.clear();
        window.extend(body[start..end].iter().map(|b| b.to_ascii_lowercase()));
        if needles
            .iter()
            .any(|n| memmem::find(&window, n.as_bytes()).is_some())
        {
            return true;
        }
        start += SCAN_CHUNK;
    }
    false
}
