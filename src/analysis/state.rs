//! Accumulated conversation state for a job.

use crate::media::Segment;
use serde::{Deserialize, Serialize};

/// One completed segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub segment_index: u32,
    pub prompt: String,
    /// Model reply for chat providers, transcript for transcribe providers.
    pub response: String,
    pub image_count: usize,
    pub had_audio: bool,
}

/// History plus the best report available so far.
///
/// Chat replies are cumulative, so each reply replaces the report.
/// Transcripts are concatenated with their time range.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    history: Vec<Turn>,
    cumulative_text: String,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chat reply. The reply becomes the whole current report.
    pub fn record_reply(&mut self, turn: Turn) {
        self.cumulative_text = turn.response.clone();
        self.history.push(turn);
    }

    /// Record a segment transcript and append it to the running transcript.
    pub fn record_transcript(&mut self, segment: &Segment, turn: Turn) {
        if !turn.response.trim().is_empty() {
            if !self.cumulative_text.is_empty() {
                self.cumulative_text.push_str("\n\n");
            }
            self.cumulative_text.push_str(&format!(
                "[{} - {}]\n{}",
                Segment::format_offset(segment.start_offset_sec),
                Segment::format_offset(segment.end_sec()),
                turn.response.trim()
            ));
        }
        self.history.push(turn);
    }

    pub fn completed(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn cumulative_text(&self) -> &str {
        &self.cumulative_text
    }
}
