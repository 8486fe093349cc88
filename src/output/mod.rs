use std::io::{self, Write};

use colored::Colorize;

use crate::classifier::Finding;
use crate::monitor::{ProgressSnapshot, RunSummary};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

/// Console block for one finding: the URL, which check passed, and the body
/// preview.
pub fn render_finding(finding: &Finding) -> String {
    let mut lines = vec![format!("\n[!]\tMatch found in {}", finding.url)
        .red()
        .to_string()];
    if let Some(marker) = finding.marker.as_deref() {
        lines.push(format!("\tMarkers check: passed ({marker})").red().to_string());
    }
    lines.push(
        format!(
            "\tRules check: passed (S: {}, FS: {}, CT: {})",
            finding.status, finding.size, finding.content_type
        )
        .red()
        .to_string(),
    );
    lines.push(format!("\n[!]\tBody: {}\n", finding.preview).green().to_string());
    lines.join("\n")
}

pub fn render_progress(snapshot: &ProgressSnapshot) -> String {
    let eta = match snapshot.eta {
        Some(eta) => format!("{}s", eta.as_secs()),
        None => "-".to_string(),
    };
    let memory = match snapshot.memory_mb {
        Some(mb) => format!("{mb} MiB"),
        None => "-".to_string(),
    };
    format!(
        "[{}/{}] {:.1}% :: {:.0} req/s :: mem {} :: ETA {}",
        snapshot.processed,
        snapshot.total,
        snapshot.percentage(),
        snapshot.rps,
        memory,
        eta
    )
}

pub fn render_summary(summary: &RunSummary) -> String {
    format!(
        ":: Completed :: {} processed, {} matches, {} duplicates, {} errors, {} dropped :: error rate {:.1}%, drop rate {:.1}%, success rate {:.1}% :: scan took {}s ::",
        summary.processed,
        summary.matches,
        summary.duplicates,
        summary.errors,
        summary.dropped,
        summary.error_rate(),
        summary.drop_rate(),
        summary.success_rate(),
        summary.elapsed.as_secs()
    )
}

/// Streams findings into an output file as they are reported, so nothing
/// is held in memory for the length of the scan.
///
/// Text output is one URL per line. JSON output is a single object with a
/// `findings` array followed by the run `summary`, written by [`finish`].
///
/// [`finish`]: FindingWriter::finish
pub struct FindingWriter<W: Write> {
    out: W,
    format: OutputFormat,
    written: u64,
}

impl<W: Write> FindingWriter<W> {
    pub fn new(mut out: W, format: OutputFormat) -> io::Result<Self> {
        if format == OutputFormat::Json {
            out.write_all(b"{\"findings\":[")?;
        }
        Ok(Self {
            out,
            format,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write_finding(&mut self, finding: &Finding) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{}", finding.url)?,
            OutputFormat::Json => {
                if self.written > 0 {
                    self.out.write_all(b",")?;
                }
                serde_json::to_writer(&mut self.out, finding)?;
            }
        }
        self.written += 1;
        Ok(())
    }

    /// Closes the JSON document and flushes. Returns the inner writer.
    pub fn finish(mut self, summary: &RunSummary) -> io::Result<W> {
        if self.format == OutputFormat::Json {
            self.out.write_all(b"],\"summary\":")?;
            serde_json::to_writer(&mut self.out, summary)?;
            self.out.write_all(b"}\n")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn finding(marker: Option<&str>) -> Finding {
        Finding {
            url: "https://vendorgo.example.com/vendorgo-qa/env".to_string(),
            marker: marker.map(|m| m.to_string()),
            status: 200,
            size: 1234,
            content_type: "application/json".to_string(),
            preview: "{\"activeProfiles\":[\"qa\"]}".to_string(),
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            emitted: 10,
            processed: 10,
            errors: 1,
            matches: 1,
            duplicates: 0,
            dropped: 0,
            elapsed: Duration::from_secs(3),
        }
    }

    #[test]
    fn formats_are_parsed_and_inferred() {
        assert_eq!(OutputFormat::parse(" JSON "), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("xml"), None);
        assert_eq!(infer_format_from_path("out/findings.json"), Some(OutputFormat::Json));
        assert_eq!(infer_format_from_path("findings"), None);
    }

    #[test]
    fn finding_block_mentions_marker_only_when_present() {
        let with_marker = render_finding(&finding(Some("activeProfiles")));
        assert!(with_marker.contains("Match found in https://vendorgo.example.com/vendorgo-qa/env"));
        assert!(with_marker.contains("Markers check: passed (activeProfiles)"));
        assert!(with_marker.contains("Rules check: passed (S: 200, FS: 1234, CT: application/json)"));

        let without = render_finding(&finding(None));
        assert!(!without.contains("Markers check"));
    }

    #[test]
    fn text_output_is_one_url_per_line() {
        let mut writer = FindingWriter::new(Vec::new(), OutputFormat::Text).unwrap();
        writer.write_finding(&finding(Some("activeProfiles"))).unwrap();
        writer.write_finding(&finding(None)).unwrap();
        assert_eq!(writer.written(), 2);
        let out = String::from_utf8(writer.finish(&summary()).unwrap()).unwrap();
        assert_eq!(
            out,
            "https://vendorgo.example.com/vendorgo-qa/env\nhttps://vendorgo.example.com/vendorgo-qa/env\n"
        );
    }

    #[test]
    fn json_output_is_a_valid_document() {
        let mut writer = FindingWriter::new(Vec::new(), OutputFormat::Json).unwrap();
        writer.write_finding(&finding(Some("activeProfiles"))).unwrap();
        writer.write_finding(&finding(None)).unwrap();
        let json = writer.finish(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["findings"].as_array().unwrap().len(), 2);
        assert_eq!(value["findings"][0]["marker"], "activeProfiles");
        assert!(value["findings"][1]["marker"].is_null());
        assert_eq!(value["summary"]["matches"], 1);
    }

    #[test]
    fn json_output_without_findings() {
        let writer = FindingWriter::new(Vec::new(), OutputFormat::Json).unwrap();
        let json = writer.finish(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert!(value["findings"].as_array().unwrap().is_empty());
        assert_eq!(value["summary"]["processed"], 10);
    }

    #[test]
    fn summary_line_reports_all_rates() {
        let line = render_summary(&summary());
        assert!(line.contains("10 processed, 1 matches, 0 duplicates, 1 errors, 0 dropped"));
        assert!(line.contains("error rate 10.0%, drop rate 0.0%, success rate 90.0%"));
        assert!(line.contains("scan took 3s"));
    }

    #[test]
    fn progress_line_handles_missing_figures() {
        let snapshot = ProgressSnapshot {
            processed: 5,
            total: 10,
            rps: 2.4,
            memory_mb: None,
            elapsed: Duration::from_secs(2),
            eta: None,
        };
        assert_eq!(render_progress(&snapshot), "[5/10] 50.0% :: 2 req/s :: mem - :: ETA -");
    }
}
