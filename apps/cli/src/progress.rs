//! Progress bar for a single transfer
//!
//! All methods are called from scheduler callbacks on the tick thread.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Clone)]
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    pub fn new(visible: bool, label: &str) -> Self {
        let bar = if visible {
            ProgressBar::no_length()
        } else {
            ProgressBar::hidden()
        };

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        bar.set_message(label.to_string());

        Self { bar }
    }

    /// Set the byte length once the size probe has answered
    pub fn set_total(&self, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
    }

    pub fn set_fraction(&self, progress: f32) {
        if let Some(total) = self.bar.length() {
            self.bar
                .set_position((progress as f64 * total as f64).round() as u64);
        }
    }

    pub fn finish_completed(&self) {
        self.bar.finish_with_message(format!(
            "{} Download complete",
            style("✓").green().bold()
        ));
    }

    pub fn finish_failed(&self, error: &str) {
        self.bar.abandon_with_message(format!(
            "{} Failed: {}",
            style("✗").red().bold(),
            error
        ));
    }

    pub fn finish_cancelled(&self) {
        self.bar.abandon_with_message(format!(
            "{} Cancelled (partial file kept for resume)",
            style("○").dim()
        ));
    }
}
