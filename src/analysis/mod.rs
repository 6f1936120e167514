//! Segment-by-segment video analysis.
//!
//! A job is split into fixed-length segments. Each segment's frames and audio
//! become one provider turn, the provider's reply replaces the running report,
//! and progress is streamed to a [`ProgressReporter`] throughout.

mod cancel;
mod cleanup;
mod engine;
mod job;
mod progress;
mod retry;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancelFlag;
pub use cleanup::{CleanupManager, CleanupReport};
pub use engine::{ConversationEngine, EngineOutcome, JobContext};
pub use job::{AnalysisJob, AnalysisType, ProviderKind};
pub use progress::{
    percent, ChannelReporter, LogReporter, ProgressEvent, ProgressReporter, RecordingReporter,
};
pub use retry::RetryPolicy;
pub use state::{ConversationState, Turn};
