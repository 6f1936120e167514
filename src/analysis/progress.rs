//! Progress events and the sinks that receive them.

use super::cancel::CancelFlag;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A message streamed to the client while a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Status {
        message: String,
    },
    Progress {
        message: String,
        percent: u8,
    },
    Result {
        data: String,
        #[serde(default)]
        partial: bool,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn status(message: impl Into<String>) -> Self {
        ProgressEvent::Status {
            message: message.into(),
        }
    }

    pub fn progress(message: impl Into<String>, percent: u8) -> Self {
        ProgressEvent::Progress {
            message: message.into(),
            percent: percent.min(100),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    /// Result and error events must reach the client; others may be dropped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Result { .. } | ProgressEvent::Error { .. })
    }
}

/// Receives progress events for a job.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn send(&self, event: ProgressEvent);
}

/// Percentage of `done` out of `total`, rounded half up.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total);
    ((200 * done + total) / (2 * total)) as u8
}

/// Forwards events into a bounded channel.
///
/// Status and progress events are dropped when the buffer is full. A closed
/// receiver marks the job as cancelled.
pub struct ChannelReporter {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancelFlag,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>, cancel: CancelFlag) -> Self {
        Self { tx, cancel }
    }
}

#[async_trait]
impl ProgressReporter for ChannelReporter {
    async fn send(&self, event: ProgressEvent) {
        if event.is_terminal() {
            if self.tx.send(event).await.is_err() {
                warn!("Progress subscriber went away before the final event");
                self.cancel.cancel();
            }
            return;
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!("Progress buffer full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                if !self.cancel.is_cancelled() {
                    warn!("Progress subscriber disconnected, cancelling job");
                }
                self.cancel.cancel();
            }
        }
    }
}

/// Writes events to the log only.
pub struct LogReporter;

#[async_trait]
impl ProgressReporter for LogReporter {
    async fn send(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::Error { message } => warn!("{}", message),
            ProgressEvent::Result { partial, .. } => debug!("Result ready (partial: {})", partial),
            ProgressEvent::Status { message } | ProgressEvent::Progress { message, .. } => {
                debug!("{}", message)
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Result { data, partial } => Some((data, partial)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Error { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Status { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn send(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_half_up() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(5, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_event_wire_format() {
        let event = ProgressEvent::progress("Batch 1/2 complete.", 50);
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["percent"], 50);

        let json = serde_json::to_value(ProgressEvent::Result {
            data: "report".into(),
            partial: true,
        })
        .unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["partial"], true);

        let parsed: ProgressEvent =
            serde_json::from_str(r#"{"type":"result","data":"x"}"#).unwrap();
        assert_eq!(
            parsed,
            ProgressEvent::Result {
                data: "x".into(),
                partial: false
            }
        );
    }

    #[tokio::test]
    async fn test_channel_reporter_drops_status_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let reporter = ChannelReporter::new(tx, CancelFlag::new());

        reporter.send(ProgressEvent::status("one")).await;
        reporter.send(ProgressEvent::status("two")).await;

        assert_eq!(rx.recv().await, Some(ProgressEvent::status("one")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_reporter_cancels_on_closed_receiver() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancelFlag::new();
        let reporter = ChannelReporter::new(tx, cancel.clone());
        drop(rx);

        reporter.send(ProgressEvent::status("anyone there?")).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_channel_reporter_waits_for_terminal_events() {
        let (tx, mut rx) = mpsc::channel(1);
        let reporter = ChannelReporter::new(tx, CancelFlag::new());
        reporter.send(ProgressEvent::status("filler")).await;

        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = rx.recv().await {
                seen.push(event);
            }
            seen
        });
        reporter.send(ProgressEvent::error("boom")).await;
        drop(reporter);

        let seen = consumer.await.unwrap();
        assert_eq!(seen.last(), Some(&ProgressEvent::error("boom")));
    }
}
