//! Metrics collection for mic-relay
//!
//! Counts what happened to every block of a recording and keeps a short
//! history of finished recordings for diagnostics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;
use uuid::Uuid;

use crate::transport::TransportStats;

/// Maximum number of finished recordings to retain in history
const MAX_RECORDING_HISTORY: usize = 20;

/// Log a progress line every this many forwarded frames
const PROGRESS_INTERVAL: u64 = 50;

/// Per-recording block accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Blocks processed by the pipeline
    pub blocks_received: u64,
    /// Frames that passed the mute gate and were handed to the transport
    pub frames_forwarded: u64,
    /// Frames discarded by the mute gate
    pub frames_muted: u64,
    /// Bytes handed to the transport
    pub bytes_forwarded: u64,
    /// Blocks dropped before processing because the session loop fell behind
    pub blocks_overflowed: u64,
}

/// Summary of a finished recording
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub recording_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stats: SessionStats,
    pub transport: TransportStats,
}

struct RecordingInProgress {
    recording_id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Collects block counters for the active recording and a bounded history
pub struct MetricsCollector {
    current: Option<RecordingInProgress>,
    stats: SessionStats,
    /// Newest first
    history: VecDeque<RecordingSummary>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            current: None,
            stats: SessionStats::default(),
            history: VecDeque::with_capacity(MAX_RECORDING_HISTORY),
        }
    }

    /// Begin counting for a new recording
    pub fn start_recording(&mut self, recording_id: Uuid) {
        if let Some(old) = self.current.take() {
            log::warn!(
                "Metrics: discarding unfinished recording {} to start {}",
                old.recording_id,
                recording_id
            );
        }
        self.stats = SessionStats::default();
        self.current = Some(RecordingInProgress {
            recording_id,
            started_at: Utc::now(),
            started: Instant::now(),
        });
    }

    pub fn block_received(&mut self) {
        self.stats.blocks_received += 1;
    }

    pub fn frame_forwarded(&mut self, bytes: usize) {
        self.stats.frames_forwarded += 1;
        self.stats.bytes_forwarded += bytes as u64;
        if self.stats.frames_forwarded % PROGRESS_INTERVAL == 0 {
            log::debug!(
                "Metrics: {} frames forwarded ({} muted)",
                self.stats.frames_forwarded,
                self.stats.frames_muted
            );
        }
    }

    pub fn frame_muted(&mut self) {
        self.stats.frames_muted += 1;
    }

    pub fn blocks_overflowed(&mut self, count: u64) {
        self.stats.blocks_overflowed += count;
        log::debug!(
            "Metrics: {} blocks dropped by a full queue ({} total)",
            count,
            self.stats.blocks_overflowed
        );
    }

    /// Close out the active recording, returning its summary
    pub fn finish_recording(&mut self, transport: TransportStats) -> Option<RecordingSummary> {
        let current = self.current.take()?;
        let summary = RecordingSummary {
            recording_id: current.recording_id,
            started_at: current.started_at,
            duration_ms: current.started.elapsed().as_millis() as u64,
            stats: self.stats,
            transport,
        };

        log::info!(
            "Metrics: recording {} finished after {}ms - {} blocks ({} overflowed), {} forwarded, {} muted, {} written, {} dropped by transport",
            summary.recording_id,
            summary.duration_ms,
            summary.stats.blocks_received,
            summary.stats.blocks_overflowed,
            summary.stats.frames_forwarded,
            summary.stats.frames_muted,
            summary.transport.frames_written,
            summary.transport.frames_dropped
        );

        self.history.push_front(summary.clone());
        while self.history.len() > MAX_RECORDING_HISTORY {
            self.history.pop_back();
        }

        Some(summary)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn last_recording(&self) -> Option<&RecordingSummary> {
        self.history.front()
    }

    pub fn history(&self) -> impl Iterator<Item = &RecordingSummary> {
        self.history.iter()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_reset_per_recording() {
        let mut m = MetricsCollector::new();

        m.start_recording(Uuid::new_v4());
        m.block_received();
        m.frame_forwarded(4096);
        m.block_received();
        m.frame_muted();
        assert_eq!(
            m.stats(),
            SessionStats {
                blocks_received: 2,
                frames_forwarded: 1,
                frames_muted: 1,
                bytes_forwarded: 4096,
                blocks_overflowed: 0,
            }
        );

        m.finish_recording(TransportStats::default());
        m.start_recording(Uuid::new_v4());
        assert_eq!(m.stats(), SessionStats::default());
    }

    #[test]
    fn test_finish_without_start_returns_none() {
        let mut m = MetricsCollector::new();
        assert!(m.finish_recording(TransportStats::default()).is_none());
        assert!(m.last_recording().is_none());
    }

    #[test]
    fn test_history_is_bounded_newest_first() {
        let mut m = MetricsCollector::new();
        let mut last_id = Uuid::nil();

        for _ in 0..(MAX_RECORDING_HISTORY + 5) {
            last_id = Uuid::new_v4();
            m.start_recording(last_id);
            m.finish_recording(TransportStats::default());
        }

        assert_eq!(m.history().count(), MAX_RECORDING_HISTORY);
        assert_eq!(m.last_recording().unwrap().recording_id, last_id);
    }

    #[test]
    fn test_summary_carries_transport_stats() {
        let mut m = MetricsCollector::new();
        m.start_recording(Uuid::new_v4());

        let transport = TransportStats {
            frames_written: 3,
            bytes_written: 12288,
            frames_dropped: 1,
        };
        let summary = m.finish_recording(transport).unwrap();
        assert_eq!(summary.transport, transport);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"recordingId\""));
        assert!(json.contains("\"framesWritten\":3"));
    }
}
