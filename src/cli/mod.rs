//! CLI module for vidlens.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{ConsoleReporter, Output};

use crate::analysis::{AnalysisType, ProviderKind};
use clap::{Parser, Subcommand};

/// vidlens - Segment-by-segment AI video analysis
///
/// Splits a video into time windows, samples frames and audio from each, and
/// builds a report through a multi-turn conversation with an AI model.
#[derive(Parser, Debug)]
#[command(name = "vidlens")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check system requirements and configuration
    Doctor,

    /// Analyze a local video file
    Analyze {
        /// Path to the video file
        input: String,

        /// Kind of report (general, meeting)
        #[arg(short = 't', long = "type")]
        analysis_type: Option<AnalysisType>,

        /// Language of the report
        #[arg(short, long)]
        language: Option<String>,

        /// Number of segments to analyze
        #[arg(short = 'n', long)]
        segments: Option<u32>,

        /// Length of each segment in seconds
        #[arg(short = 'd', long = "segment-seconds")]
        segment_duration: Option<f64>,

        /// Seconds between sampled frames
        #[arg(short = 'i', long)]
        frame_interval: Option<f64>,

        /// AI provider (gemini, openai)
        #[arg(short, long)]
        provider: Option<ProviderKind>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Also write a JSON summary of the job next to the report
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API server (upload + server-sent progress events)
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration file if none exists
    Init,

    /// Show configuration file path
    Path,
}
