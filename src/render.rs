use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::config::ProbeConfig;
use crate::error::ResolveError;
use crate::prober::{AttemptOutcome, ProbeOutcome, Target};
use crate::runner::AttemptObserver;
use crate::summary::RunSummary;

const WIDTH: usize = 60;
const SPINNER_FRAMES: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Presentation settings handed to the renderer by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub color: bool,
    pub spinner: bool,
}

/// Writes the human-readable report. Colour is applied per call, never
/// through process-wide state.
pub struct Renderer<W: Write> {
    out: W,
    config: RenderConfig,
}

impl Renderer<io::Stdout> {
    pub fn stdout(config: RenderConfig) -> Self {
        Self::new(io::stdout(), config)
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, config: RenderConfig) -> Self {
        Self { out, config }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.config.color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn center(text: &str, fill: char) -> String {
        let len = text.chars().count();
        if len >= WIDTH {
            return text.to_string();
        }
        let left = (WIDTH - len) / 2;
        let right = WIDTH - len - left;
        let fill_str = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
        format!("{}{}{}", fill_str(left), text, fill_str(right))
    }

    pub fn banner(&mut self) -> io::Result<()> {
        let stars = "*".repeat(WIDTH);
        writeln!(self.out)?;
        writeln!(self.out, "{}", self.paint(&stars, Color::Cyan))?;
        writeln!(self.out, "{}", self.paint(&Self::center(" TCP CONNECTION TESTER ", '★'), Color::Yellow))?;
        writeln!(self.out, "{}", self.paint(&stars, Color::Cyan))?;
        writeln!(self.out)
    }

    pub fn resolving(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", self.paint("🔄 Resolving host...", Color::Blue))?;
        self.out.flush()
    }

    pub fn resolve_failed(&mut self, err: &ResolveError) -> io::Result<()> {
        writeln!(self.out, "{}", self.paint("❌ Failed to resolve host!", Color::Red))?;
        writeln!(self.out, "{}", self.paint(&err.to_string(), Color::Red))
    }

    pub fn starting(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", self.paint("🚦 Starting connectivity test...", Color::Yellow))
    }

    pub fn resolved(&mut self, target: &Target) -> io::Result<()> {
        let line = format!("✅ Resolved {} → {}", target.host, target.addr.ip());
        writeln!(self.out, "{}", self.paint(&line, Color::Green))
    }

    pub fn header(&mut self, target: &Target, config: &ProbeConfig) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} {} {} {}",
            self.paint("🔎 Target:", Color::Blue),
            self.paint(&target.host, Color::White),
            self.paint("| Port:", Color::Blue),
            self.paint(&target.port().to_string(), Color::White),
        )?;
        writeln!(
            self.out,
            "{} {} {} {}",
            self.paint("🚀 Attempts:", Color::Blue),
            self.paint(&config.attempts.to_string(), Color::White),
            self.paint("| Timeout:", Color::Blue),
            self.paint(&format!("{}s", config.timeout_seconds), Color::White),
        )?;
        writeln!(self.out)
    }

    fn status(&self, outcome: &ProbeOutcome) -> (String, String) {
        match outcome {
            ProbeOutcome::Success { latency_ms } => (
                self.paint("✔ Success", Color::Green),
                self.paint(&format!("{:.2}ms", latency_ms), Color::White),
            ),
            ProbeOutcome::Timeout => (self.paint("✖ Timeout", Color::Red), self.paint("N/A", Color::White)),
            ProbeOutcome::Refused => (self.paint("✖ Refused", Color::Red), self.paint("N/A", Color::White)),
            ProbeOutcome::Error { detail } => (
                self.paint(&format!("⚠ Error: {}", detail), Color::Red),
                self.paint("N/A", Color::White),
            ),
        }
    }

    pub fn attempt(&mut self, outcome: &AttemptOutcome, total: u32) -> io::Result<()> {
        let (status, time_info) = self.status(&outcome.outcome);
        let prefix = self.paint(&format!("Attempt {}/{}:", outcome.attempt, total), Color::Cyan);
        writeln!(self.out, "{} {} {}", prefix, status, time_info)?;
        self.out.flush()
    }

    pub fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        let row = |r: &Self, label: &str, value: String| {
            format!("{} {}", r.paint(&format!("{:<12}", label), Color::Magenta), r.paint(&value, Color::White))
        };

        writeln!(self.out)?;
        writeln!(self.out, "{}", self.paint(&Self::center(" TEST SUMMARY ", '─'), Color::Cyan))?;
        writeln!(self.out, "{}", row(self, "Total Time:", format!("{:.2}s", summary.duration_seconds)))?;
        writeln!(self.out, "{}", row(self, "Attempts:", summary.total_attempts.to_string()))?;
        writeln!(
            self.out,
            "{}",
            row(
                self,
                "Successful:",
                format!("{} ({:.1}%)", summary.success_count, summary.success_rate())
            )
        )?;
        writeln!(self.out, "{}", row(self, "Failed:", summary.failure_count().to_string()))?;

        if let (Some(min), Some(max), Some(mean)) =
            (summary.min_latency_ms, summary.max_latency_ms, summary.mean_latency_ms)
        {
            writeln!(self.out)?;
            writeln!(self.out, "{}", row(self, "Fastest:", format!("{:.2}ms", min)))?;
            writeln!(self.out, "{}", row(self, "Slowest:", format!("{:.2}ms", max)))?;
            writeln!(self.out, "{}", row(self, "Average:", format!("{:.2}ms", mean)))?;
        }

        writeln!(self.out, "{}", self.paint(&"─".repeat(WIDTH), Color::Cyan))
    }

    pub fn complete(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", self.paint(&Self::center(" TEST COMPLETE ", '★'), Color::Green))?;
        writeln!(self.out)
    }

    pub fn interrupted(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", self.paint("⚠ Test interrupted by user!", Color::Red))
    }
}

/// Live console output for a run: a spinner for the duration of each probe
/// call and one status line per recorded attempt.
pub struct ConsoleObserver<W: Write> {
    renderer: Renderer<W>,
    spinner: Option<ProgressBar>,
    total: u32,
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(renderer: Renderer<W>) -> Self {
        Self {
            renderer,
            spinner: None,
            total: 0,
        }
    }

    pub fn into_renderer(mut self) -> Renderer<W> {
        self.stop_spinner();
        self.renderer
    }

    fn start_spinner(&mut self) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(&format!("{}✔", SPINNER_FRAMES)),
        );
        bar.set_message("Testing connection...");
        bar.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(bar);
    }

    fn stop_spinner(&mut self) {
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
    }
}

impl<W: Write> AttemptObserver for ConsoleObserver<W> {
    fn attempt_started(&mut self, _attempt: u32, total: u32) {
        self.total = total;
        if self.renderer.config.spinner {
            self.start_spinner();
        }
    }

    fn attempt_finished(&mut self, _attempt: u32) {
        self.stop_spinner();
    }

    fn outcome_recorded(&mut self, outcome: &AttemptOutcome) {
        if let Err(e) = self.renderer.attempt(outcome, self.total) {
            tracing::warn!("failed to write attempt line: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: RenderConfig = RenderConfig {
        color: false,
        spinner: false,
    };

    fn rendered(f: impl FnOnce(&mut Renderer<Vec<u8>>) -> io::Result<()>) -> String {
        let mut renderer = Renderer::new(Vec::new(), PLAIN);
        f(&mut renderer).unwrap();
        String::from_utf8(renderer.out).unwrap()
    }

    #[test]
    fn test_attempt_lines() {
        let text = rendered(|r| {
            r.attempt(&AttemptOutcome::new(1, ProbeOutcome::Success { latency_ms: 12.345 }), 3)?;
            r.attempt(&AttemptOutcome::new(2, ProbeOutcome::Refused), 3)?;
            r.attempt(
                &AttemptOutcome::new(
                    3,
                    ProbeOutcome::Error {
                        detail: "network is unreachable".into(),
                    },
                ),
                3,
            )
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Attempt 1/3: ✔ Success 12.35ms");
        assert_eq!(lines[1], "Attempt 2/3: ✖ Refused N/A");
        assert_eq!(lines[2], "Attempt 3/3: ⚠ Error: network is unreachable N/A");
    }

    #[test]
    fn test_summary_with_latency() {
        let summary = RunSummary {
            total_attempts: 4,
            success_count: 3,
            duration_seconds: 2.5,
            min_latency_ms: Some(1.0),
            max_latency_ms: Some(3.0),
            mean_latency_ms: Some(2.0),
        };
        let text = rendered(|r| r.summary(&summary));
        assert!(text.contains("Total Time:  2.50s"));
        assert!(text.contains("Successful:  3 (75.0%)"));
        assert!(text.contains("Failed:      1"));
        assert!(text.contains("Fastest:     1.00ms"));
        assert!(text.contains("Average:     2.00ms"));
    }

    #[test]
    fn test_summary_without_successes_omits_latency() {
        let summary = RunSummary {
            total_attempts: 2,
            success_count: 0,
            duration_seconds: 1.0,
            min_latency_ms: None,
            max_latency_ms: None,
            mean_latency_ms: None,
        };
        let text = rendered(|r| r.summary(&summary));
        assert!(text.contains("Successful:  0 (0.0%)"));
        assert!(!text.contains("Fastest"));
    }

    #[test]
    fn test_no_escape_codes_without_color() {
        let text = rendered(|r| r.banner());
        assert!(!text.contains('\u{1b}'));
        assert!(text.contains(" TCP CONNECTION TESTER "));
    }

    #[test]
    fn test_console_observer_writes_lines() {
        let mut observer = ConsoleObserver::new(Renderer::new(Vec::new(), PLAIN));
        observer.attempt_started(1, 2);
        observer.attempt_finished(1);
        observer.outcome_recorded(&AttemptOutcome::new(1, ProbeOutcome::Timeout));
        let renderer = observer.into_renderer();
        let text = String::from_utf8(renderer.out).unwrap();
        assert_eq!(text, "Attempt 1/2: ✖ Timeout N/A\n");
    }
}
