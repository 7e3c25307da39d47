//! Terminal capability detection and rendering helpers

use std::fmt::Display;

use collab::{ApplicationStatus, CollaborationStatus};
use owo_colors::{colors::css, OwoColorize};

/// Detects whether colored output should be enabled
pub fn supports_color() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

/// Detects terminal width, returning None if not available
pub fn terminal_width() -> Option<u16> {
    terminal_size::terminal_size().map(|(w, _)| w.0)
}

/// Check if terminal is narrow (< 60 columns)
pub fn is_narrow() -> bool {
    terminal_width().is_some_and(|w| w < 60)
}

/// Extension trait for colorizing anything printable
pub trait Colorize {
    /// Color as success (green)
    fn success(&self) -> String;
    /// Color as warning (amber)
    fn warning(&self) -> String;
    /// Color as info (blue)
    fn info(&self) -> String;
    /// Dim the text
    fn dim(&self) -> String;
}

impl<T: Display + ?Sized> Colorize for T {
    fn success(&self) -> String {
        paint(self, |s| s.fg::<css::Green>().to_string())
    }

    fn warning(&self) -> String {
        paint(self, |s| s.fg::<css::Orange>().to_string())
    }

    fn info(&self) -> String {
        paint(self, |s| s.fg::<css::LightBlue>().to_string())
    }

    fn dim(&self) -> String {
        paint(self, |s| s.dimmed().to_string())
    }
}

fn paint<T: Display + ?Sized>(value: &T, style: impl FnOnce(&str) -> String) -> String {
    let text = value.to_string();
    if supports_color() { style(&text) } else { text }
}

/// Colors an application status by outcome.
pub fn application_status(status: ApplicationStatus) -> String {
    match status {
        ApplicationStatus::Pending => status.info(),
        ApplicationStatus::Accepted => status.success(),
        ApplicationStatus::Rejected => status.dim(),
    }
}

/// Colors a collaboration status.
pub fn collaboration_status(status: CollaborationStatus) -> String {
    match status {
        CollaborationStatus::Active => status.success(),
        CollaborationStatus::Completed => status.info(),
        CollaborationStatus::Cancelled => status.dim(),
    }
}

/// A fixed-width bar for a 0-100 percentage, e.g. `[#####-----]`.
///
/// Narrow terminals get the bare percentage.
pub fn progress_bar(percent: u8) -> String {
    const WIDTH: usize = 10;
    if is_narrow() {
        return format!("{percent}%");
    }
    let filled = usize::from(percent.min(100)) * WIDTH / 100;
    format!(
        "[{}{}] {percent:>3}%",
        "#".repeat(filled),
        "-".repeat(WIDTH - filled)
    )
}

/// Prints left-aligned columns under a header row.
///
/// Widths are measured on the raw cell text, so cells should not carry
/// color codes.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            rows.iter()
                .map(|row| row[idx].chars().count())
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect();

    for (header, width) in headers.iter().zip(&widths) {
        print!("{header:<width$}  ");
    }
    println!();
    for width in &widths {
        print!("{:-<width$}  ", "");
    }
    println!();

    for row in rows {
        for (value, width) in row.iter().zip(&widths) {
            print!("{value:<width$}  ");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0, 0; "empty")]
    #[test_case(55, 5; "rounds down")]
    #[test_case(100, 10; "full")]
    fn bar_fills_in_proportion(percent: u8, hashes: usize) {
        let bar = progress_bar(percent);
        if !is_narrow() {
            assert_eq!(bar.matches('#').count(), hashes);
            assert_eq!(bar.matches('-').count(), 10 - hashes);
        }
        assert!(bar.ends_with(&format!("{percent}%")));
    }
}
