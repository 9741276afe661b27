use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Buffering parameters handed to an enhanced decoder on attach.
///
/// Defaults favor a stable buffer over latency: wide back/forward windows,
/// tolerant gap handling and no low-latency mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Run demuxing in a background worker when the decoder supports it
    pub enable_worker: bool,
    pub low_latency_mode: bool,
    /// Seconds of already played media kept for rewinding
    pub back_buffer_secs: f64,
    /// Target forward buffer length in seconds
    pub max_buffer_secs: f64,
    /// Absolute forward buffer ceiling in seconds
    pub max_max_buffer_secs: f64,
    pub max_buffer_size_bytes: u64,
    /// Largest gap in the buffer that is jumped over instead of stalling
    pub max_buffer_hole_secs: f64,
    pub max_live_sync_playback_rate: f64,
    /// Treat the live stream duration as infinite
    pub live_duration_infinity: bool,
    pub frag_time_to_first_byte_ms: u64,
    pub frag_max_load_time_ms: u64,
    pub abr_ewma_slow_live_secs: f64,
    pub abr_ewma_fast_live_secs: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            enable_worker: false,
            low_latency_mode: false,
            back_buffer_secs: 60.0,
            max_buffer_secs: 120.0,
            max_max_buffer_secs: 240.0,
            max_buffer_size_bytes: 500 * 1000 * 1000,
            max_buffer_hole_secs: 0.5,
            max_live_sync_playback_rate: 1.5,
            live_duration_infinity: true,
            frag_time_to_first_byte_ms: 10_000,
            frag_max_load_time_ms: 30_000,
            abr_ewma_slow_live_secs: 10.0,
            abr_ewma_fast_live_secs: 4.0,
        }
    }
}

impl BufferConfig {
    pub fn fragment_load_timeout(&self) -> Duration {
        Duration::from_millis(self.frag_max_load_time_ms)
    }
}

/// Timing of the live-edge synchronizer itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between lag polls
    pub poll_interval_ms: u64,
    /// Delay between manifest-ready and the seek to the live edge, so the
    /// first segment has time to buffer
    pub live_seek_grace_ms: u64,
    /// Distance kept behind the live edge when jumping to live
    pub live_edge_margin_secs: f64,
    /// Tolerance for the position-never-ahead-of-edge invariant
    pub position_epsilon_secs: f64,
    /// Lag at or below which the stream is presented as "LIVE"
    pub live_threshold_secs: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            live_seek_grace_ms: 500,
            live_edge_margin_secs: 2.0,
            position_epsilon_secs: 0.05,
            live_threshold_secs: 1.0,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        // A zero period would panic in `tokio::time::interval`.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn live_seek_grace(&self) -> Duration {
        Duration::from_millis(self.live_seek_grace_ms)
    }
}

/// Complete configuration of one playback session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sync: SyncConfig,
    pub buffer: BufferConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_defaults_favor_stability() {
        let config = BufferConfig::default();
        assert!(!config.low_latency_mode);
        assert_eq!(config.back_buffer_secs, 60.0);
        assert_eq!(config.max_buffer_secs, 120.0);
        assert_eq!(config.max_max_buffer_secs, 240.0);
        assert_eq!(config.fragment_load_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = SyncConfig {
            poll_interval_ms: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
