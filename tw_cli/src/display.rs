//! Display utilities for progress spinners and formatting helpers.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tw_core::{ArchivedBinary, Tap};
use tw_io::{ProgressCallback, PublishProgress};

/// Progress styles used by build and publish.
pub struct ProgressStyles {
    pub spinner: ProgressStyle,
    pub done: ProgressStyle,
}

impl Default for ProgressStyles {
    fn default() -> Self {
        Self {
            spinner: ProgressStyle::default_spinner()
                .template("    {prefix:<24} {spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            done: ProgressStyle::default_spinner()
                .template("    {prefix:<24} {msg}")
                .unwrap(),
        }
    }
}

/// A ticking spinner labelled `prefix`.
pub fn spinner(styles: &ProgressStyles, prefix: &str, message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(styles.spinner.clone());
    pb.set_prefix(prefix.to_string());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Render publish progress as one spinner per stage.
pub fn create_publish_callback(
    styles: ProgressStyles,
    quiet: bool,
) -> (Arc<ProgressCallback>, Arc<Mutex<Option<ProgressBar>>>) {
    let current: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));

    let current_clone = current.clone();
    let callback: Arc<ProgressCallback> = Arc::new(Box::new(move |event| {
        if quiet {
            return;
        }
        let mut current = current_clone.lock().unwrap();
        match event {
            PublishProgress::StageStarted { stage } => {
                *current = Some(spinner(&styles, stage.label(), "running..."));
            }
            PublishProgress::ArtifactReady { artifact } => {
                if let Some(pb) = current.as_ref() {
                    pb.println(format_artifact_line(&artifact));
                }
            }
            PublishProgress::StageCompleted { stage, detail } => {
                let pb = current
                    .take()
                    .unwrap_or_else(|| spinner(&styles, stage.label(), ""));
                pb.set_style(styles.done.clone());
                pb.finish_with_message(format!("{} {}", style("✓").green(), detail));
            }
            PublishProgress::StageFailed { stage, .. } => {
                let pb = current
                    .take()
                    .unwrap_or_else(|| spinner(&styles, stage.label(), ""));
                pb.set_style(styles.done.clone());
                pb.abandon_with_message(format!("{} failed", style("✗").red()));
            }
        }
    }));

    (callback, current)
}

/// Finish a spinner left running by an interrupted pipeline.
pub fn finish_progress(current: &Arc<Mutex<Option<ProgressBar>>>) {
    if let Some(pb) = current.lock().unwrap().take()
        && !pb.is_finished()
    {
        pb.finish_and_clear();
    }
}

/// Format bytes into a human-readable string (e.g., "1.5 MB").
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// First 12 hex digits of a checksum.
pub fn short_sha(sha256: Option<&str>) -> String {
    match sha256 {
        Some(sha) => sha.chars().take(12).collect(),
        None => "-".to_string(),
    }
}

pub fn format_artifact_line(artifact: &ArchivedBinary) -> String {
    format!(
        "    {} {} ({}, sha256 {})",
        style("→").dim(),
        artifact.file_name(),
        format_bytes(artifact.size),
        short_sha(artifact.sha256.as_deref())
    )
}

/// Lines describing a tap and its formulas for `tap-list`.
pub fn format_tap_lines(tap: &Tap) -> Vec<String> {
    let mut lines = vec![format!("{} {}", style(&tap.name).bold(), style(tap.local_path.display()).dim())];
    if tap.remote_path.is_empty() {
        lines.push(format!("    remote: {}", style("none").yellow()));
    } else {
        lines.push(format!("    remote: {}", tap.remote_path));
    }
    if tap.formulas.is_empty() {
        lines.push("    (no formulas)".to_string());
    }
    for formula in &tap.formulas {
        let mut line = format!("    {} {}", style("•").cyan(), formula.name);
        if !formula.details.is_empty() {
            line.push_str(&format!(" - {}", formula.details));
        }
        line.push_str(&format!(" [{}]", formula.upload_type));
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tw_core::{Arch, Formula};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha(Some("0123456789abcdef")), "0123456789ab");
        assert_eq!(short_sha(None), "-");
    }

    #[test]
    fn test_artifact_line() {
        let artifact = ArchivedBinary {
            archs: vec![Arch::Arm64],
            path: PathBuf::from("/out/mytool-arm64"),
            sha256: Some("ffffffffffffffff".into()),
            size: 2048,
        };
        let line = console::strip_ansi_codes(&format_artifact_line(&artifact)).to_string();
        assert!(line.contains("mytool-arm64"));
        assert!(line.contains("2.0 KB"));
        assert!(line.contains("ffffffffffff"));
    }

    #[test]
    fn test_tap_lines() {
        let mut tap = Tap::new("nntools", "/tmp/homebrew-nntools", "");
        let mut formula = Formula::new("mytool");
        formula.details = "does things".into();
        tap.formulas.push(formula);

        let lines: Vec<String> = format_tap_lines(&tap)
            .iter()
            .map(|l| console::strip_ansi_codes(l).to_string())
            .collect();
        assert_eq!(lines[0], "nntools /tmp/homebrew-nntools");
        assert_eq!(lines[1], "    remote: none");
        assert_eq!(lines[2], "    • mytool - does things [binary]");
    }
}
