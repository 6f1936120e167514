//! CLI output formatting utilities.

use crate::analysis::{ProgressEvent, ProgressReporter};
use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Create a percentage progress bar.
    pub fn progress_bar(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(100);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Renders job progress on the terminal.
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            bar: Output::progress_bar("Starting..."),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressReporter for ConsoleReporter {
    async fn send(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Progress { message, percent } => {
                self.bar.set_position(u64::from(percent));
                self.bar.set_message(message);
            }
            ProgressEvent::Status { message } => {
                if self.bar.is_finished() {
                    eprintln!("   {}", style(message).dim());
                } else {
                    self.bar.println(format!("   {}", style(message).dim()));
                }
            }
            ProgressEvent::Result { partial, .. } => {
                let msg = if partial {
                    "Partial report ready"
                } else {
                    "Report ready"
                };
                self.bar.finish_with_message(msg);
            }
            ProgressEvent::Error { message } => {
                self.bar.suspend(|| Output::error(&message));
            }
        }
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
