use std::collections::HashSet;
use std::net::Ipv6Addr;

use regex::Regex;

// multi-label entries must stay in the table: removal joins labels from the
// left and returns on the first hit, so "co.uk" wins over "uk".
const TLDS: &[&str] = &[
    // multi-part
    "co.uk", "co.jp", "co.nz", "co.za", "com.au", "com.br", "com.cn", "com.mx", "com.tr", "com.tw",
    "edu.au", "edu.cn", "edu.hk", "edu.sg", "gov.uk", "net.au", "net.cn", "org.au", "org.uk",
    "ac.uk", "ac.nz", "ac.jp", "ac.kr", "ne.jp", "or.jp", "org.nz", "govt.nz", "sch.uk", "nhs.uk",
    // generic
    "com", "org", "net", "edu", "gov", "int", "mil", "aero", "biz", "cat", "coop", "info", "jobs",
    "mobi", "museum", "name", "pro", "tel", "travel", "xxx", "asia", "arpa",
    // newer generic
    "app", "dev", "io", "ai", "cloud", "digital", "online", "store", "tech", "site", "website",
    "blog", "shop", "agency", "expert", "software", "studio", "design", "education", "healthcare",
    // country codes
    "ac", "ad", "ae", "af", "ag", "al", "am", "an", "ao", "aq", "ar", "as", "at", "au", "aw",
    "ax", "az", "ba", "bb", "bd", "be", "bf", "bg", "bh", "bi", "bj", "bm", "bn", "bo", "br", "bs",
    "bt", "bv", "bw", "by", "bz", "ca", "cc", "cd", "cf", "cg", "ch", "ci", "ck", "cl", "cm", "cn",
    "co", "cr", "cu", "cv", "cx", "cy", "cz", "de", "dj", "dk", "dm", "do", "dz", "ec", "ee", "eg",
    "er", "es", "et", "eu", "fi", "fj", "fk", "fm", "fo", "fr", "ga", "gb", "gd", "ge", "gf", "gg",
    "gh", "gi", "gl", "gm", "gn", "gp", "gq", "gr", "gs", "gt", "gu", "gw", "gy", "hk", "hm", "hn",
    "hr", "ht", "hu", "id", "ie", "il", "im", "in", "iq", "ir", "is", "it", "je", "jm", "jo",
    "jp", "ke", "kg", "kh", "ki", "km", "kn", "kp", "kr", "kw", "ky", "kz", "la", "lb", "lc", "li",
    "lk", "lr", "ls", "lt", "lu", "lv", "ly", "ma", "mc", "md", "me", "mg", "mh", "mk", "ml", "mm",
    "mn", "mo", "mp", "mq", "mr", "ms", "mt", "mu", "mv", "mw", "mx", "my", "mz", "na", "nc", "ne",
    "nf", "ng", "ni", "nl", "no", "np", "nr", "nu", "nz", "om", "pa", "pe", "pf", "pg", "ph", "pk",
    "pl", "pm", "pn", "pr", "ps", "pt", "pw", "py", "qa", "re", "ro", "rs", "ru", "rw", "sa", "sb",
    "sc", "sd", "se", "sg", "sh", "si", "sj", "sk", "sl", "sm", "sn", "so", "sr", "st", "su", "sv",
    "sy", "sz", "tc", "td", "tf", "tg", "th", "tj", "tk", "tl", "tm", "tn", "to", "tp", "tr", "tt",
    "tv", "tw", "tz", "ua", "ug", "uk", "us", "uy", "uz", "va", "vc", "ve", "vg", "vi", "vn", "vu",
    "wf", "ws", "ye", "yt", "za", "zm", "zw",
];

const REGIONS: &[&str] = &[
    "us-east-1", "us-east-2", "us-west-1", "us-west-2", "af-south-1", "ap-east-1", "ap-south-1",
    "ap-northeast-1", "ap-northeast-2", "ap-northeast-3", "ap-southeast-1", "ap-southeast-2",
    "ap-southeast-3", "ca-central-1", "eu-central-1", "eu-west-1", "eu-west-2", "eu-west-3",
    "eu-north-1", "eu-south-1", "me-south-1", "sa-east-1", "us-east", "us-west", "af-south",
    "ap-east", "ap-south", "ap-northeast", "ap-southeast", "ca-central", "eu-west", "eu-north",
    "eu-south", "me-south", "sa-east", "useast1", "useast2", "uswest1", "uswest2", "afsouth1",
    "apeast1", "apsouth1", "apnortheast1", "apnortheast2", "apnortheast3", "apsoutheast1",
    "apsoutheast2", "apsoutheast3", "cacentral1", "eucentral1", "euwest1", "euwest2", "euwest3",
    "eunorth1", "eusouth1", "mesouth1", "saeast1",
];

/// Environment names recognised at the end of a label, independent of the
/// configurable env list used for appending.
const ENV_MARKERS: &[&str] = &[
    "production", "prod", "qa", "development", "dev", "testing", "test", "uat", "staging",
    "stage", "stg",
];

/// Immutable lookup tables and compiled patterns used to decompose hostnames.
///
/// Built once per run and shared by reference between every producer pass.
#[derive(Debug)]
pub struct HostTables {
    tlds: HashSet<&'static str>,
    ipv4: Regex,
    embedded_ip: Regex,
    hash_token: Regex,
    region: Regex,
    env_suffix: Regex,
    trailing_digits: Regex,
    only_alpha: Regex,
}

impl Default for HostTables {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTables {
    pub fn new() -> Self {
        let mut regions: Vec<&str> = REGIONS.to_vec();
        // longest first so "us-east-1" is removed whole instead of leaving "-1"
        regions.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let region_alternation = regions
            .iter()
            .map(|r| regex::escape(r))
            .collect::<Vec<_>>()
            .join("|");
        let env_alternation = ENV_MARKERS.join("|");

        Self {
            tlds: TLDS.iter().copied().collect(),
            ipv4: Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("valid ipv4 pattern"),
            embedded_ip: Regex::new(r"\d{1,3}[-.]\d{1,3}[-.]\d{1,3}[-.]\d{1,3}")
                .expect("valid embedded ip pattern"),
            hash_token: Regex::new(r"\b[0-9a-f]{32}\b").expect("valid hash pattern"),
            region: Regex::new(&format!("(?:{region_alternation})")).expect("valid region pattern"),
            env_suffix: Regex::new(&format!("(?:{env_alternation})$"))
                .expect("valid env suffix pattern"),
            trailing_digits: Regex::new(r"\d+$").expect("valid digits pattern"),
            only_alpha: Regex::new(r"^[a-z]+$").expect("valid alpha pattern"),
        }
    }

    /// Lowercases `host`, strips scheme, path, query and port. Returns `None`
    /// for IPv4/IPv6 literals and for hosts that are empty after stripping.
    pub fn normalize_host(&self, raw: &str) -> Option<String> {
        let mut host = raw.trim().to_ascii_lowercase();
        for scheme in ["http://", "https://"] {
            if let Some(rest) = host.strip_prefix(scheme) {
                host = rest.to_string();
            }
        }
        let host = host
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_string();

        if host.starts_with('[') || host.parse::<Ipv6Addr>().is_ok() {
            return None;
        }
        let host = host.split(':').next().unwrap_or_default();
        if host.is_empty() || self.ipv4.is_match(host) {
            return None;
        }
        Some(host.to_string())
    }

    /// Strips the longest known top-level-domain suffix.
    pub fn remove_tld(&self, host: &str) -> String {
        let host = host.to_ascii_lowercase();
        let labels: Vec<&str> = host.split('.').collect();
        for i in 0..labels.len() {
            let candidate = labels[i..].join(".");
            if self.tlds.contains(candidate.as_str()) {
                return labels[..i].join(".");
            }
        }
        host
    }

    pub(crate) fn strip_noise(&self, host: &str) -> String {
        let host = self.embedded_ip.replace_all(host, "");
        let host = self.hash_token.replace_all(&host, "");
        let host = self.remove_tld(&host);
        let host = self.region.replace_all(&host, "");
        collapse_separators(&host)
    }

    pub(crate) fn env_suffix_start(&self, label: &str) -> Option<usize> {
        self.env_suffix.find(label).map(|m| m.start())
    }

    pub(crate) fn trailing_digits_start(&self, label: &str) -> Option<usize> {
        self.trailing_digits.find(label).map(|m| m.start())
    }

    pub(crate) fn is_only_alpha(&self, word: &str) -> bool {
        self.only_alpha.is_match(word)
    }
}

fn collapse_separators(host: &str) -> String {
    let mut out = host.to_string();
    loop {
        let next = out
            .replace("--", "-")
            .replace("..", ".")
            .replace("__", "_");
        if next == out {
            return out;
        }
        out = next;
    }
}
