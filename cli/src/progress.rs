//! Terminal rendering of engine events.

use std::io::Write;
use std::time::{Duration, Instant};

use engine::{BackupOutcome, BackupProgress, ProgressEvent, RunState};

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Draws a single `\r`-refreshed progress line on stderr, plus one line per
/// skip or error event.
pub struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_redraw: Option<Instant>,
    line_active: bool,
}

impl CliProgress {
    pub fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            last_redraw: None,
            line_active: false,
        }
    }

    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    pub fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    pub fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(20 - filled), percent)
    }

    pub fn handle(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StateChanged(state) => self.on_state(*state),
            ProgressEvent::Progress(progress) => self.on_progress(progress),
            ProgressEvent::Log(line) => self.on_log(line),
        }
    }

    fn on_state(&mut self, state: RunState) {
        if self.verbose && !state.is_terminal() {
            self.print_line(&format!("{}...", state));
        }
    }

    fn on_progress(&mut self, progress: &BackupProgress) {
        if progress.current.starts_with("Error: ") {
            self.print_line(&progress.current);
            return;
        }
        if progress.current.starts_with("Skipped: ") {
            if self.verbose {
                self.print_line(&progress.current);
            }
            return;
        }

        let due = self
            .last_redraw
            .is_none_or(|last| last.elapsed() >= REDRAW_INTERVAL);
        if !due && progress.bytes_copied < progress.total_bytes {
            return;
        }
        self.last_redraw = Some(Instant::now());

        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r\x1b[2KProgress: {} | {}/{}",
            Self::progress_bar(progress.percent()),
            Self::format_bytes(progress.bytes_copied),
            Self::format_bytes(progress.total_bytes)
        );
        let _ = stderr.flush();
        self.line_active = true;
    }

    fn on_log(&mut self, line: &str) {
        if self.verbose || !line.starts_with("Restored ") {
            self.print_line(line);
        }
    }

    fn print_line(&mut self, line: &str) {
        if self.line_active {
            eprint!("\r\x1b[2K");
            self.line_active = false;
        }
        eprintln!("{}", line);
    }

    /// Close the progress line and print the run summary.
    pub fn finish_backup(&mut self, outcome: &BackupOutcome) {
        if self.line_active {
            eprintln!();
            self.line_active = false;
        }
        eprintln!("{}", outcome.message);
        eprintln!(
            "Summary: {} copied, {} unchanged, {} failed",
            outcome.files_copied,
            outcome.files_skipped,
            outcome.failures.len()
        );
        eprintln!("Bytes copied: {}", Self::format_bytes(outcome.bytes_copied));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
        eprintln!("Backup set: {}", outcome.set_path.display());

        if !outcome.failures.is_empty() {
            eprintln!();
            eprintln!("Failed files:");
            for failure in &outcome.failures {
                eprintln!("  {}: {}", failure.path.display(), failure.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(CliProgress::format_bytes(0), "0.00 B");
        assert_eq!(CliProgress::format_bytes(1536), "1.50 KB");
        assert_eq!(CliProgress::format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(CliProgress::format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(CliProgress::progress_bar(0), format!("[{}] 0%", " ".repeat(20)));
        assert_eq!(CliProgress::progress_bar(50), format!("[{}{}] 50%", "=".repeat(10), " ".repeat(10)));
        assert_eq!(CliProgress::progress_bar(100), format!("[{}] 100%", "=".repeat(20)));
    }
}
