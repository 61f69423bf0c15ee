//! Link statistics

use serde::{Deserialize, Serialize};

/// Counters kept by the link loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Loop iterations, idle ones included
    pub ticks: u64,

    /// Iterations skipped for lack of a peer
    pub idle_ticks: u64,

    /// Frames fully written
    pub frames_sent: u64,

    /// Bytes written for frames, length prefixes included
    pub bytes_sent: u64,

    /// Failed frame acquisitions
    pub capture_failures: u64,

    /// Failed acquisitions since the last good frame
    pub consecutive_capture_failures: u32,

    pub commands_applied: u64,

    /// `CMD:` lines without a separator
    pub malformed_commands: u64,

    /// Lines without the command prefix
    pub ignored_lines: u64,

    /// Failed writes (frames or confirmations)
    pub write_errors: u64,
}

impl LinkStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_sent.saturating_sub(previous.frames_sent);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_sent.saturating_sub(previous.bytes_sent);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }

    /// Share of capture attempts that failed
    pub fn capture_failure_rate(&self) -> f64 {
        let attempts = self.frames_sent + self.capture_failures;
        if attempts == 0 {
            return 0.0;
        }

        self.capture_failures as f64 / attempts as f64
    }
}
