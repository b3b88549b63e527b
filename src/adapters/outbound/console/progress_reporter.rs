use crate::ports::outbound::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// StderrProgressReporter adapter for reporting progress to stderr
///
/// Progress goes to stderr so it never mixes with structured output on
/// stdout. Uses indicatif for the progress bar; the bar is shared between
/// tasks behind a mutex.
pub struct StderrProgressReporter {
    progress_bar: Mutex<Option<ProgressBar>>,
}

impl StderrProgressReporter {
    pub fn new() -> Self {
        Self {
            progress_bar: Mutex::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("   {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) - {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn get_or_create_progress_bar(&self, total: usize) -> Option<ProgressBar> {
        let mut slot = self.progress_bar.lock().ok()?;
        match slot.as_ref() {
            Some(pb) if pb.length() == Some(total as u64) => Some(pb.clone()),
            _ => {
                if let Some(previous) = slot.take() {
                    previous.finish_and_clear();
                }
                let pb = ProgressBar::new(total as u64);
                pb.set_style(Self::style());
                *slot = Some(pb.clone());
                Some(pb)
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.progress_bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl Default for StderrProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for StderrProgressReporter {
    fn report(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn report_progress(&self, current: usize, total: usize, message: Option<&str>) {
        let Some(pb) = self.get_or_create_progress_bar(total) else {
            return;
        };
        pb.set_position(current as u64);
        if let Some(msg) = message {
            pb.set_message(msg.to_string());
        }
    }

    fn report_error(&self, message: &str) {
        self.finish();
        eprintln!("{}", message);
    }

    fn report_completion(&self, message: &str) {
        self.finish();
        eprintln!();
        eprintln!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter_creation() {
        let reporter = StderrProgressReporter::new();
        reporter.report("Scanning CVE list");
        reporter.report_progress(5, 10, Some("CVE-2024-0001"));
        reporter.report_error("Skipping malformed record");
        reporter.report_completion("Ingested 10 records");
    }

    #[test]
    fn test_progress_bar_is_replaced_when_total_changes() {
        let reporter = StderrProgressReporter::default();
        reporter.report_progress(1, 10, None);
        reporter.report_progress(1, 20, None);
        let length = reporter
            .progress_bar
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|pb| pb.length());
        assert_eq!(length, Some(20));
    }
}
