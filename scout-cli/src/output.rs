use std::io::Write;
use std::path::Path;

#[cfg(feature = "colored-output")]
use colored::*;
use scout_engine::{DiscoveryOutcome, DiscoveryReport};

use crate::cli::OutputFormat;
use crate::error::Result;

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_report(
        &self,
        report: &DiscoveryReport,
        format: OutputFormat,
        extension: &str,
    ) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_pretty(report, extension)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)? + "\n"),
            OutputFormat::JsonCompact => Ok(serde_json::to_string(report)? + "\n"),
            OutputFormat::Text => Ok(format_text(report)),
        }
    }

    fn format_pretty(&self, report: &DiscoveryReport, extension: &str) -> String {
        let mut output = String::new();

        match &report.outcome {
            DiscoveryOutcome::Found { candidates } => {
                output.push_str(&format!(
                    "{} {} in {} ms\n",
                    self.colorize("✓ Found", &Color::Green, true),
                    self.colorize(&report.target, &Color::Cyan, false),
                    report.elapsed_ms
                ));
                for (i, candidate) in candidates.iter().enumerate() {
                    output.push_str(&format!(
                        "  {}. {} {}\n",
                        i + 1,
                        self.colorize(&candidate.url, &Color::Blue, false),
                        self.colorize(
                            &format!("[{} +{}ms]", candidate.signal, candidate.elapsed_ms),
                            &Color::Yellow,
                            false
                        ),
                    ));
                }
            }
            DiscoveryOutcome::NotFound => {
                output.push_str(&self.colorize(&not_found_line(extension), &Color::Yellow, true));
                output.push('\n');
            }
        }

        if let Some(error) = &report.navigation_error {
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize("Navigation", &Color::Yellow, false),
                error
            ));
        }
        if !report.skipped_sources.is_empty() {
            let skipped: Vec<_> = report.skipped_sources.iter().map(|c| c.as_str()).collect();
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize("Skipped channels", &Color::Yellow, false),
                skipped.join(", ")
            ));
        }
        output
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
}

fn format_text(report: &DiscoveryReport) -> String {
    report
        .outcome
        .urls()
        .iter()
        .map(|url| format!("{url}\n"))
        .collect()
}

fn not_found_line(extension: &str) -> String {
    format!("No .{extension} URL found.")
}

/// Contents of the result file: one URL per line, or the not-found line.
pub fn result_file_content(report: &DiscoveryReport, extension: &str) -> String {
    let urls = report.outcome.urls();
    if urls.is_empty() {
        not_found_line(extension)
    } else {
        urls.join("\n")
    }
}

pub fn write_output(content: &str, output_file: Option<&Path>) -> Result<()> {
    match output_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        None => {
            print!("{content}");
            std::io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use scout_engine::{Candidate, Channel, Signal};

    use super::*;

    fn report(urls: &[&str]) -> DiscoveryReport {
        let candidates: Vec<Candidate> = urls
            .iter()
            .map(|url| Candidate {
                url: url.to_string(),
                raw: url.to_string(),
                channel: Channel::Transport,
                signal: Signal::RequestUrl,
                elapsed_ms: 5,
            })
            .collect();
        DiscoveryReport {
            target: "https://example.com/live".to_string(),
            outcome: if candidates.is_empty() {
                DiscoveryOutcome::NotFound
            } else {
                DiscoveryOutcome::Found { candidates }
            },
            navigation_error: None,
            skipped_sources: vec![Channel::MessageFrame],
            elapsed_ms: 900,
        }
    }

    #[test]
    fn result_file_lists_urls_or_not_found() {
        let found = report(&["https://a/1.m3u8", "https://b/2.m3u8"]);
        assert_eq!(
            result_file_content(&found, "m3u8"),
            "https://a/1.m3u8\nhttps://b/2.m3u8"
        );
        assert_eq!(
            result_file_content(&report(&[]), "m3u8"),
            "No .m3u8 URL found."
        );
    }

    #[test]
    fn pretty_output_without_color() {
        let output = OutputManager::new(false);
        let text = output
            .format_report(&report(&["https://a/1.m3u8"]), OutputFormat::Pretty, "m3u8")
            .unwrap();
        assert!(text.starts_with("✓ Found https://example.com/live in 900 ms\n"));
        assert!(text.contains("  1. https://a/1.m3u8 [transport/request-url +5ms]\n"));
        assert!(text.contains("Skipped channels: message-frame"));

        let text = output
            .format_report(&report(&[]), OutputFormat::Pretty, "mpd")
            .unwrap();
        assert!(text.starts_with("No .mpd URL found.\n"));
    }

    #[test]
    fn text_and_json_formats() {
        let output = OutputManager::new(false);
        let found = report(&["https://a/1.m3u8"]);

        let text = output
            .format_report(&found, OutputFormat::Text, "m3u8")
            .unwrap();
        assert_eq!(text, "https://a/1.m3u8\n");

        let json = output
            .format_report(&found, OutputFormat::JsonCompact, "m3u8")
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "found");
        assert_eq!(value["candidates"][0]["url"], "https://a/1.m3u8");
        assert_eq!(value["skipped_sources"][0], "message-frame");
    }

    #[test]
    fn write_output_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("result.txt");
        write_output("https://a/1.m3u8", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "https://a/1.m3u8");
    }
}
