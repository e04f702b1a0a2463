//! Terminal feedback: a spinner following the active state and coloured result lines.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::hardware::FeedbackSink;
use crate::task::{Feedback, TaskReport};

/// Spinner plus styled lines for one task execution.
///
/// Clones drive the same spinner, so one can go to the task graph as its
/// feedback sink while the caller keeps another to print the result.
#[derive(Clone)]
pub struct TaskProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl TaskProgress {
    pub fn start(item: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("picking {item}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Stops the spinner and prints the outcome line.
    pub fn finish(&self, report: &TaskReport) {
        self.pb.finish_and_clear();
        match report.error() {
            None => println!(
                "  {} Picked {} (tag {})",
                self.green.apply_to("✓"),
                report.item_name,
                report.tag_id
            ),
            Some(error) => println!(
                "  {} Task aborted [{}]: {error}",
                self.red.apply_to("✗"),
                error.code()
            ),
        }
    }

    /// Prints the run report as pretty JSON under a coloured header.
    pub fn print_report(&self, report: &TaskReport) {
        let header = if report.is_completed() {
            &self.green
        } else {
            &self.red
        };
        println!();
        println!("{}", header.apply_to("─── Run Report ───"));
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("{}", self.red.apply_to(format!("couldn't render report: {e}"))),
        }
    }
}

impl FeedbackSink for TaskProgress {
    fn emit(&self, feedback: Feedback) {
        match feedback {
            Feedback::StateEntered { state } => {
                self.pb.set_message(state.to_string());
                self.pb.println(format!("  {} {state}", self.dim.apply_to("→")));
            }
            Feedback::Correction {
                rotation_deg,
                sideways_m,
            } => self.pb.println(format!(
                "  {} rotate {rotation_deg:.1}°, sideways {sideways_m:.3} m",
                self.yellow.apply_to("↻")
            )),
            Feedback::Completed { item } => {
                self.pb.set_message(format!("{item} picked"));
            }
            Feedback::Aborted { code, message } => self.pb.println(format!(
                "  {} [{code}] {message}",
                self.red.apply_to("!")
            )),
        }
    }
}
