//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar per harvest pass, a spinner per merge stage.
//! Non-TTY mode: hidden bars; logs are the only progress indicator.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Record-count bar, sized by the API's reported total
fn records_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{prefix:<24.dim} {bar:30.green/dim} {human_pos:>9}/{human_len:9} {per_sec:>10} {eta:>4} {wide_msg:.dim}",
        )
        .expect("invalid template")
        .progress_chars("--")
}

/// Unknown total: counter only
fn counter_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {prefix:<24.dim} {human_pos:>9} records {wide_msg:.dim}")
        .expect("invalid template")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    /// Context that never draws (tests, library callers).
    pub fn hidden() -> Self {
        Self::with_tty(false)
    }

    fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Per-pass progress bar.
    ///
    /// `total` comes from the zero-size probe request; `None` or zero falls
    /// back to a counting spinner.
    pub fn pass_bar(&self, label: &str, total: Option<u64>) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = match total.filter(|t| *t > 0) {
            Some(total) => {
                let pb = self.multi.add(ProgressBar::new(total));
                pb.set_style(records_style());
                pb
            }
            None => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(counter_style());
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            }
        };
        // Truncate long labels to keep bars aligned
        let display: String = label.chars().take(24).collect();
        pb.set_prefix(display);
        pb
    }

    /// Stage status line with a spinner. Call `pb.finish()` to stop it.
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
                .expect("invalid template"),
        );
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(123), "123");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(123_456), "123,456");
        assert_eq!(fmt_num(1_234_567_890), "1,234,567,890");
    }

    #[test]
    fn hidden_context_hands_out_hidden_bars() {
        let ctx = ProgressContext::hidden();
        assert!(!ctx.is_tty());
        assert!(ctx.pass_bar("pass", Some(10)).is_hidden());
        assert!(ctx.stage_line("merge").is_hidden());
    }
}
