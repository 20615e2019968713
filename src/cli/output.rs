//! Run report formatting
//!
//! Renders the terminal [`RunReport`] either as pretty JSON for tooling or
//! as human-readable text. Logging goes to stderr throughout the run; the
//! formatted report is the only thing the CLI prints on stdout.

use crate::orchestrator::{RunReport, SubmissionOutcome};
use anyhow::{Context, Result};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_json(report),
            OutputFormat::Human => Ok(self.format_human(report)),
        }
    }

    fn format_json(&self, report: &RunReport) -> Result<String> {
        serde_json::to_string_pretty(report).context("Failed to serialize run report to JSON")
    }

    fn format_human(&self, report: &RunReport) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "Stack Run Report");
        let _ = writeln!(out, "================");
        let _ = writeln!(out, "Run ID:    {}", report.run_id);
        let _ = writeln!(out, "Input:     {}", report.input.display());
        let _ = writeln!(out, "Elapsed:   {} ms", report.elapsed_ms);
        match &report.runtime {
            Some(runtime) => {
                let _ = writeln!(out, "Runtime:   {}", runtime);
            }
            None => {
                let _ = writeln!(out, "Runtime:   (extractor skipped)");
            }
        }
        if let Some(artifact) = &report.artifact {
            let _ = writeln!(out, "Artifact:  {}", artifact.display());
        }

        let _ = writeln!(out, "\nConfiguration:");
        for (key, value) in &report.config {
            let _ = writeln!(out, "  {}: {}", key, value);
        }

        if !report.services.is_empty() {
            let _ = writeln!(out, "\nServices:");
            for service in &report.services {
                let _ = writeln!(
                    out,
                    "  {} (pid {}) -> {}",
                    service.name,
                    service.pid,
                    service.log_file.display()
                );
            }
        }

        if !report.readiness.is_empty() {
            let _ = writeln!(out, "\nReadiness:");
            for entry in &report.readiness {
                let _ = writeln!(out, "  {}: {}", entry.service, entry.outcome);
            }
        }

        let _ = writeln!(out, "\nSubmission:");
        match &report.submission {
            SubmissionOutcome::Saved {
                output,
                bytes,
                status,
            } => {
                let _ = writeln!(
                    out,
                    "  saved {} ({} bytes, HTTP {})",
                    output.display(),
                    bytes,
                    status
                );
            }
            SubmissionOutcome::Failed { error, logs } => {
                let _ = writeln!(out, "  FAILED: {}", error);
                for log in logs {
                    let _ = writeln!(out, "  inspect: {}", log.display());
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ReadinessReport;
    use crate::probe::ProbeOutcome;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn sample_report(submission: SubmissionOutcome) -> RunReport {
        RunReport {
            run_id: "run-1".to_string(),
            timestamp: chrono::Utc::now(),
            input: PathBuf::from("My Report v2.pdf"),
            config: BTreeMap::from([
                ("GEMINI_API_KEY".to_string(), "set".to_string()),
                (
                    "JAVA_HEADINGS_URL".to_string(),
                    "http://localhost:8080/get/pdf-info/detect-chapter-headings".to_string(),
                ),
            ]),
            runtime: Some("java 17.0.8 (system default)".to_string()),
            artifact: Some(PathBuf::from("target/extractor.jar")),
            services: Vec::new(),
            readiness: vec![
                ReadinessReport {
                    service: "extractor".to_string(),
                    outcome: ProbeOutcome::Ready { attempts: 4 },
                },
                ReadinessReport {
                    service: "processor".to_string(),
                    outcome: ProbeOutcome::TimedOut { attempts: 30 },
                },
            ],
            submission,
            elapsed_ms: 1234,
        }
    }

    #[test]
    fn test_json_output_parses_back() {
        let report = sample_report(SubmissionOutcome::Saved {
            output: PathBuf::from("My_Report_v2.json"),
            bytes: 64,
            status: 200,
        });
        let formatter = OutputFormatter::new(OutputFormat::Json);

        let rendered = formatter.format(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["run_id"], "run-1");
        assert_eq!(value["submission"]["result"], "saved");
        assert_eq!(value["submission"]["bytes"], 64);
    }

    #[test]
    fn test_human_output_success() {
        let report = sample_report(SubmissionOutcome::Saved {
            output: PathBuf::from("My_Report_v2.json"),
            bytes: 64,
            status: 200,
        });
        let formatter = OutputFormatter::new(OutputFormat::Human);

        let rendered = formatter.format(&report).unwrap();
        assert!(rendered.contains("Run ID:    run-1"));
        assert!(rendered.contains("java 17.0.8 (system default)"));
        assert!(rendered.contains("extractor: ready after 4 attempt(s)"));
        assert!(rendered.contains("processor: timed out after 30 attempts"));
        assert!(rendered.contains("saved My_Report_v2.json (64 bytes, HTTP 200)"));
    }

    #[test]
    fn test_human_output_failure_points_at_logs() {
        let report = sample_report(SubmissionOutcome::Failed {
            error: "transfer failed: connection refused".to_string(),
            logs: vec![
                PathBuf::from("java.log"),
                PathBuf::from("python-server/python.log"),
            ],
        });
        let formatter = OutputFormatter::new(OutputFormat::Human);

        let rendered = formatter.format(&report).unwrap();
        assert!(rendered.contains("FAILED: transfer failed"));
        assert!(rendered.contains("inspect: java.log"));
        assert!(rendered.contains("inspect: python-server/python.log"));
    }

    #[test]
    fn test_human_output_never_echoes_secret_values() {
        let report = sample_report(SubmissionOutcome::Saved {
            output: PathBuf::from("a.json"),
            bytes: 1,
            status: 200,
        });
        let formatter = OutputFormatter::new(OutputFormat::Human);

        let rendered = formatter.format(&report).unwrap();
        // The config map carries masked values only.
        assert!(rendered.contains("GEMINI_API_KEY: set"));
    }
}
