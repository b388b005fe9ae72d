//! Progress bars for fills.
//!
//! One bar per document fetch, driven by a fraction rather than a byte count
//! since the line-fetch protocol only reports fractions. Off a TTY every bar
//! is hidden and logs carry the progress.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Resolution of fraction-based bars
const BAR_STEPS: u64 = 1000;

/// Width of the `<year>/<identifier>` prefix column
const PREFIX_WIDTH: usize = 28;

const FETCH_TEMPLATE: &str =
    "{prefix:<28.dim} {bar:30.green/dim} {percent:>3}% {elapsed:>4} {wide_msg:.dim}";
const STATUS_TEMPLATE: &str = "{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).expect("invalid template")
}

/// Bars and status lines sharing one `MultiProgress`.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Draw on stderr when it is a terminal.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Context that never draws anything (tests, embedding in a server).
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    /// Bar for one document fetch; move it with [`set_fraction`].
    pub fn fetch_bar(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(BAR_STEPS));
        pb.set_style(style(FETCH_TEMPLATE).progress_chars("--"));
        pb.set_prefix(name.chars().take(PREFIX_WIDTH).collect::<String>());
        pb
    }

    /// Spinner with a message, for long-running commands (`watch`, `fill`).
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(style(STATUS_TEMPLATE));
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Print above the bars (plain stderr off a TTY).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// For the log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

/// Move a fetch bar to `fraction` (clamped to [0, 1]).
pub fn set_fraction(pb: &ProgressBar, fraction: f64) {
    pb.set_position(fraction_to_steps(fraction));
}

fn fraction_to_steps(fraction: f64) -> u64 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64
}

/// `1234567` -> `1,234,567`
pub fn fmt_num(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    out.push_str(&digits[..head]);
    for (i, group) in digits.as_bytes()[head..].chunks(3).enumerate() {
        if head > 0 || i > 0 {
            out.push(',');
        }
        // ASCII digits only
        out.extend(group.iter().map(|&b| b as char));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_steps_clamped() {
        assert_eq!(fraction_to_steps(0.0), 0);
        assert_eq!(fraction_to_steps(0.5), 500);
        assert_eq!(fraction_to_steps(1.0), BAR_STEPS);
        assert_eq!(fraction_to_steps(3.0), BAR_STEPS);
        assert_eq!(fraction_to_steps(-1.0), 0);
        assert_eq!(fraction_to_steps(f64::NAN), 0);
    }

    #[test]
    fn hidden_context_hides_bars() {
        let ctx = ProgressContext::hidden();
        assert!(!ctx.is_tty());
        assert!(ctx.fetch_bar("1850/some_identifier").is_hidden());
        assert!(ctx.stage_line("watch").is_hidden());
    }

    #[test]
    fn fmt_num_groups() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(123), "123");
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(12_345), "12,345");
        assert_eq!(fmt_num(123_456), "123,456");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }
}
