//! vidlens - segment-by-segment AI video analysis
//!
//! Splits a video into fixed-length time windows, samples frames and audio
//! from each window with ffmpeg, and builds a report through a multi-turn
//! conversation with an AI model. Progress is streamed as events and every
//! temporary file and uploaded asset is removed when the job ends.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `media` - Segment planning and ffmpeg extraction
//! - `provider` - Gemini chat and OpenAI transcribe/summarize backends
//! - `analysis` - Job model, progress events, retry, cleanup, conversation engine
//! - `orchestrator` - Runs a job end to end
//! - `cli` - Command line and HTTP server
//!
//! # Example
//!
//! ```rust,no_run
//! use vidlens::analysis::{CancelFlag, LogReporter};
//! use vidlens::config::Settings;
//! use vidlens::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let job = orchestrator.default_job("meeting.mp4");
//!     let outcome = orchestrator.run(&job, &LogReporter, &CancelFlag::new()).await;
//!     if let Some(report) = outcome.engine.report {
//!         println!("{}", report);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod openai;
pub mod orchestrator;
pub mod provider;

pub use error::{Result, VidlensError};
