use rand::seq::SliceRandom;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::runner::RunnerError;

/// Reads a list file, one entry per line. Lines are trimmed and blank ones
/// dropped; `kind` names the list in errors.
pub async fn read_lines(kind: &'static str, path: &str) -> Result<Vec<String>, RunnerError> {
    let path = crate::config::expand_tilde_string(path);
    let handle = File::open(&path).await.map_err(|e| RunnerError::FileOpen {
        kind,
        path: path.clone(),
        source: e,
    })?;
    let mut out = Vec::new();
    let mut lines = BufReader::new(handle).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                out.push(line.to_string());
            }
            Ok(None) => break,
            Err(e) => return Err(RunnerError::FileRead { kind, path, source: e }),
        }
    }
    Ok(out)
}

/// Drops `#` comments and shuffles what is left, so consecutive requests
/// hit different hosts.
pub fn prepare_hosts(mut hosts: Vec<String>) -> Vec<String> {
    hosts.retain(|h| !h.trim().is_empty() && !h.trim_start().starts_with('#'));
    hosts.shuffle(&mut rand::thread_rng());
    hosts
}

pub fn parse_csv_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Parses `Name: value,Other: value`. Only the first `:` of an entry splits
/// it, so values may contain colons.
pub fn parse_headers(value: &str) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for entry in value.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let (name, val) = entry
            .split_once(':')
            .ok_or_else(|| format!("invalid header '{entry}', expected Name:Value"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("invalid header '{entry}', empty name"));
        }
        out.push((name.to_string(), val.trim().to_string()));
    }
    Ok(out)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_split_on_first_colon() {
        let headers = parse_headers("X-Api-Key: abc, Referer:https://a.example.com/ ,").unwrap();
        assert_eq!(
            headers,
            vec![
                ("X-Api-Key".to_string(), "abc".to_string()),
                ("Referer".to_string(), "https://a.example.com/".to_string()),
            ]
        );
        assert!(parse_headers("novalue").is_err());
        assert!(parse_headers(":x").is_err());
        assert!(parse_headers("").unwrap().is_empty());
    }

    #[test]
    fn csv_list_skips_blanks() {
        assert_eq!(
            parse_csv_list(" text/html, ,application/json,"),
            vec!["text/html", "application/json"]
        );
    }

    #[test]
    fn hosts_lose_comments_but_keep_everything_else() {
        let mut hosts = prepare_hosts(vec![
            "a.example.com".to_string(),
            "# staging".to_string(),
            "b.example.com".to_string(),
            " ".to_string(),
        ]);
        hosts.sort();
        assert_eq!(hosts, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn bytes_are_human_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[tokio::test]
    async fn read_lines_reports_missing_file() {
        let err = read_lines("paths", "/nonexistent/dynfile/paths.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::FileOpen { kind: "paths", .. }));
    }
}
