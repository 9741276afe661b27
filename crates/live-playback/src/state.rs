use serde::Serialize;

use crate::decoder::PlaybackSupport;

/// Live buffer as seen by the last poll or decoder event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BufferState {
    /// Upper bound of downloaded media in seconds
    pub live_edge_seconds: f64,
    /// Decoder position in seconds, never ahead of the live edge
    pub playback_position_seconds: f64,
    /// True while the decoder is starved
    pub buffering: bool,
}

impl BufferState {
    /// Build a reading from raw decoder values.
    ///
    /// Non-finite or negative inputs read as zero, and a position reported
    /// beyond `live_edge + epsilon` is clamped to the live edge.
    pub fn observe(live_edge: f64, position: f64, epsilon: f64, buffering: bool) -> Self {
        let live_edge = sanitize(live_edge);
        let mut position = sanitize(position);
        if position > live_edge + epsilon.max(0.0) {
            position = live_edge;
        }
        Self {
            live_edge_seconds: live_edge,
            playback_position_seconds: position,
            buffering,
        }
    }

    /// Distance behind the live edge, never negative.
    pub fn lag_seconds(&self) -> f64 {
        (self.live_edge_seconds - self.playback_position_seconds).max(0.0)
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    Idle,
    /// Source attached, waiting for the manifest.
    Loading,
    Playing,
    Failed,
    Stopped,
}

/// UI-facing snapshot of a playback session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub phase: PlaybackPhase,
    pub support: Option<PlaybackSupport>,
    pub buffer: BufferState,
    pub paused: bool,
    pub volume: f64,
    /// Human-readable error once playback failed
    pub error: Option<String>,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            support: None,
            buffer: BufferState::default(),
            paused: false,
            volume: 1.0,
            error: None,
        }
    }
}

impl PlaybackSnapshot {
    pub fn lag_seconds(&self) -> f64 {
        self.buffer.lag_seconds()
    }

    /// Whether the view should show "LIVE" rather than a lag indicator.
    pub fn is_live(&self, threshold_secs: f64) -> bool {
        self.phase == PlaybackPhase::Playing && self.lag_seconds() <= threshold_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lag_is_edge_minus_position() {
        let state = BufferState::observe(40.0, 38.0, 0.05, false);
        assert!((state.lag_seconds() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_position_ahead_of_edge_is_clamped() {
        let state = BufferState::observe(10.0, 12.0, 0.05, false);
        assert_eq!(state.playback_position_seconds, 10.0);
        assert_eq!(state.lag_seconds(), 0.0);

        let within_epsilon = BufferState::observe(10.0, 10.04, 0.05, false);
        assert_eq!(within_epsilon.playback_position_seconds, 10.04);
        assert_eq!(within_epsilon.lag_seconds(), 0.0);
    }

    #[test]
    fn test_non_finite_readings_are_zeroed() {
        let state = BufferState::observe(f64::NAN, f64::INFINITY, 0.05, true);
        assert_eq!(state.live_edge_seconds, 0.0);
        assert_eq!(state.playback_position_seconds, 0.0);
        assert!(state.buffering);
    }

    #[test]
    fn test_is_live_requires_playing() {
        let mut snapshot = PlaybackSnapshot {
            buffer: BufferState::observe(40.0, 39.5, 0.05, false),
            ..PlaybackSnapshot::default()
        };
        assert!(!snapshot.is_live(1.0));
        snapshot.phase = PlaybackPhase::Playing;
        assert!(snapshot.is_live(1.0));
        snapshot.buffer = BufferState::observe(40.0, 30.0, 0.05, false);
        assert!(!snapshot.is_live(1.0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Whatever the decoder reports, an observed reading never places the
        /// position past the live edge and never yields a negative lag.
        #[test]
        fn prop_observed_position_never_ahead_of_edge(
            edge in -100.0f64..10_000.0,
            position in -100.0f64..10_000.0,
            epsilon in 0.0f64..1.0,
        ) {
            let state = BufferState::observe(edge, position, epsilon, false);
            prop_assert!(state.playback_position_seconds <= state.live_edge_seconds + epsilon);
            prop_assert!(state.lag_seconds() >= 0.0);
        }

        #[test]
        fn prop_lag_never_negative_under_jitter(
            readings in proptest::collection::vec((0.0f64..500.0, -5.0f64..5.0), 1..50),
        ) {
            // Position jitters around the edge from one poll to the next.
            for (edge, jitter) in readings {
                let state = BufferState::observe(edge, edge + jitter, 0.05, false);
                prop_assert!(state.lag_seconds() >= 0.0);
                prop_assert!(state.playback_position_seconds <= state.live_edge_seconds + 0.05);
            }
        }
    }
}
