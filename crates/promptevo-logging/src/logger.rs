use colored::Colorize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::{ProgressEvent, ProgressSink, StampedEvent};

/// Console output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Progress logger - renders events to stderr and optionally mirrors them to a JSONL file
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, stamped: &StampedEvent) {
        // File output is always JSON lines
        if let Some(ref writer) = self.file_writer {
            if let (Ok(mut file), Ok(json)) = (writer.lock(), serde_json::to_string(stamped)) {
                let _ = writeln!(file, "{}", json);
            }
        }

        match self.format {
            LogFormat::Json => self.log_json(stamped),
            LogFormat::Pretty => self.log_pretty(&stamped.event),
            LogFormat::Compact => self.log_compact(stamped),
        }
    }

    fn log_json(&self, stamped: &StampedEvent) {
        if let Ok(json) = serde_json::to_string(stamped) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &ProgressEvent) {
        let mut stderr = std::io::stderr();
        match event {
            ProgressEvent::RunStarted {
                run_id,
                population_size,
                max_generations,
                criteria,
                test_cases,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "promptevo".bold().bright_white(),
                    " ".repeat(58) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Run:".dimmed(),
                    Self::truncate_with_padding(run_id, 63, 68).dimmed()
                );
                let settings = format!(
                    "population {}, up to {} generations, {} test cases",
                    population_size, max_generations, test_cases
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "GA:".dimmed(),
                    Self::truncate_with_padding(&settings, 64, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Criteria:".dimmed(),
                    Self::truncate_with_padding(&criteria.join(", "), 58, 63).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            ProgressEvent::GenerationStart {
                generation,
                unscored,
                ..
            } => {
                let header = format!("─ Generation {} ", generation);
                let padding = "─".repeat(67usize.saturating_sub(header.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    header.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "  {} {} ({} to evaluate)",
                    "▶".bright_cyan(),
                    "EVALUATE".bright_cyan().bold(),
                    unscored
                );
            }
            ProgressEvent::EvaluationProgress {
                candidate_id,
                completed,
                total,
                combined_score,
                degraded_criteria,
                ..
            } => {
                let mark = if degraded_criteria.is_empty() {
                    "✓".bright_green()
                } else {
                    "!".bright_yellow()
                };
                let _ = writeln!(
                    stderr,
                    "    {} [{}/{}] candidate {} scored {:.3}",
                    mark, completed, total, candidate_id, combined_score
                );
                if !degraded_criteria.is_empty() {
                    let _ = writeln!(
                        stderr,
                        "      {} {}",
                        "degraded:".dimmed(),
                        degraded_criteria.join(", ").bright_yellow()
                    );
                }
            }
            ProgressEvent::GenerationCompleted {
                best_score,
                average_score,
                worst_score,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} best {:.3}  avg {:.3}  worst {:.3}",
                    "│".dimmed(),
                    best_score,
                    average_score,
                    worst_score
                );
                Self::footer(&mut stderr);
            }
            ProgressEvent::ImprovementFound {
                candidate_id,
                previous_best,
                new_best,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {}",
                    format!(
                        "↑ Improvement: {:.3} → {:.3} (candidate {})",
                        previous_best, new_best, candidate_id
                    )
                    .bright_green()
                );
            }
            ProgressEvent::Stagnation {
                stagnation_count,
                max_stagnation,
                best_score,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {}",
                    format!(
                        "→ No improvement ({}/{}), best {:.3}",
                        stagnation_count, max_stagnation, best_score
                    )
                    .bright_yellow()
                );
            }
            ProgressEvent::Convergence { .. } => {
                // Final outcome is printed by the binary
            }
            ProgressEvent::Error {
                generation,
                candidate_id,
                message,
            } => {
                let subject = candidate_id
                    .map(|id| format!("candidate {}", id))
                    .unwrap_or_else(|| format!("generation {}", generation));
                let _ = writeln!(
                    stderr,
                    "    {} {}: {}",
                    "✗".bright_red(),
                    subject,
                    message.bright_red()
                );
            }
        }
    }

    fn footer(stderr: &mut std::io::Stderr) {
        let _ = writeln!(
            stderr,
            "{}",
            "└─────────────────────────────────────────────────────────────────────┘"
                .bright_blue()
        );
        let _ = writeln!(stderr);
    }

    fn log_compact(&self, stamped: &StampedEvent) {
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "{}", Self::compact_line(stamped));
    }

    fn compact_line(stamped: &StampedEvent) -> String {
        let timestamp = stamped.timestamp.format("%H:%M:%S");
        match &stamped.event {
            ProgressEvent::RunStarted { run_id, .. } => {
                format!("[{}] run:start {}", timestamp, run_id)
            }
            ProgressEvent::GenerationStart {
                generation,
                unscored,
                ..
            } => format!("[{}] gen:start:{} eval={}", timestamp, generation, unscored),
            ProgressEvent::EvaluationProgress {
                generation,
                candidate_id,
                completed,
                total,
                combined_score,
                ..
            } => format!(
                "[{}] eval:{} {}/{} c{}={:.3}",
                timestamp, generation, completed, total, candidate_id, combined_score
            ),
            ProgressEvent::GenerationCompleted {
                generation,
                best_score,
                average_score,
                worst_score,
                ..
            } => format!(
                "[{}] gen:done:{} best={:.3} avg={:.3} worst={:.3}",
                timestamp, generation, best_score, average_score, worst_score
            ),
            ProgressEvent::ImprovementFound {
                generation,
                new_best,
                ..
            } => format!("[{}] improve:{} {:.3}", timestamp, generation, new_best),
            ProgressEvent::Stagnation {
                generation,
                stagnation_count,
                ..
            } => format!("[{}] stagnant:{} n={}", timestamp, generation, stagnation_count),
            ProgressEvent::Convergence {
                reason,
                generations,
                best_score,
                duration_secs,
                ..
            } => format!(
                "[{}] run:done:{} {} best={:.3} {:.1}s",
                timestamp, generations, reason, best_score, duration_secs
            ),
            ProgressEvent::Error {
                generation,
                message,
                ..
            } => format!("[{}] error:{}:{}", timestamp, generation, message),
        }
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", head)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}

impl ProgressSink for Logger {
    fn emit(&self, event: &StampedEvent) {
        self.log(event);
    }
}
