use std::time::Duration;

use m3u8_rs::MediaPlaylist;
use tokio::time::Instant;

use crate::decoder::DecoderEvent;

use super::window::LiveWindow;

/// Playback clock over a [`LiveWindow`].
///
/// The position advances with wall-clock time while running and freezes at
/// the buffered end when the window runs dry.
#[derive(Debug, Default)]
pub(super) struct Timeline {
    window: LiveWindow,
    /// Position at `running_since`, or the frozen position when stopped
    anchor: f64,
    running_since: Option<Instant>,
    wants_play: bool,
    ready: bool,
    starved: bool,
}

impl Timeline {
    pub fn apply(&mut self, playlist: &MediaPlaylist) -> usize {
        self.window.apply(playlist)
    }

    pub fn buffered_end(&self) -> Option<f64> {
        self.window.buffered_end()
    }

    pub fn is_ended(&self) -> bool {
        self.window.is_ended()
    }

    pub fn refresh_interval(&self, min: Duration) -> Duration {
        self.window.refresh_interval(min)
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn current_time(&self, now: Instant) -> f64 {
        let Some(end) = self.window.buffered_end() else {
            return 0.0;
        };
        let mut position = self.anchor;
        if let Some(since) = self.running_since
            && !self.starved
        {
            position += now.saturating_duration_since(since).as_secs_f64();
        }
        position.min(end)
    }

    /// Move the anchor to `now` without changing the position.
    pub fn rebase(&mut self, now: Instant) {
        self.anchor = self.current_time(now);
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
    }

    pub fn seek(&mut self, target: f64, now: Instant) {
        let end = self.window.buffered_end().unwrap_or(0.0);
        self.anchor = if target.is_finite() {
            target.clamp(0.0, end)
        } else {
            0.0
        };
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
    }

    /// The first playlist arrived. Returns true if the clock started.
    pub fn mark_ready(&mut self, now: Instant) -> bool {
        self.ready = true;
        self.start_clock(now)
    }

    /// Request playback. Returns true if the clock started.
    pub fn play(&mut self, now: Instant) -> bool {
        self.wants_play = true;
        self.start_clock(now)
    }

    pub fn pause(&mut self, now: Instant) {
        self.rebase(now);
        self.running_since = None;
        self.wants_play = false;
    }

    fn start_clock(&mut self, now: Instant) -> bool {
        if self.running_since.is_some() || !self.ready || !self.wants_play {
            return false;
        }
        self.running_since = Some(now);
        true
    }

    /// Advance the clock, reporting starvation and recovery.
    pub fn tick(&mut self, now: Instant) -> Option<DecoderEvent> {
        self.running_since?;
        let end = self.window.buffered_end()?;

        if self.starved {
            if end > self.anchor {
                self.starved = false;
                self.running_since = Some(now);
                return Some(DecoderEvent::Playing);
            }
            return None;
        }

        let position = self.current_time(now);
        if position >= end {
            self.anchor = end;
            self.running_since = Some(now);
            self.starved = true;
            return Some(DecoderEvent::Waiting);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::{Playlist, parse_playlist_res};

    fn media(sequence: u64, durations: &[f32]) -> MediaPlaylist {
        let mut text = format!(
            "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:{sequence}\n"
        );
        for (i, d) in durations.iter().enumerate() {
            text.push_str(&format!("#EXTINF:{d},\nseg{}.ts\n", sequence + i as u64));
        }
        match parse_playlist_res(text.as_bytes()) {
            Ok(Playlist::MediaPlaylist(pl)) => pl,
            other => panic!("expected media playlist, got {other:?}"),
        }
    }

    #[test]
    fn test_clock_waits_for_manifest_and_play() {
        let t0 = Instant::now();
        let mut timeline = Timeline::default();
        assert!(!timeline.play(t0));
        timeline.apply(&media(0, &[4.0, 4.0]));
        assert!(timeline.mark_ready(t0));

        let t1 = t0 + Duration::from_secs(3);
        assert!((timeline.current_time(t1) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_position_never_passes_buffered_end() {
        let t0 = Instant::now();
        let mut timeline = Timeline::default();
        timeline.apply(&media(0, &[4.0, 4.0]));
        timeline.mark_ready(t0);
        timeline.play(t0);

        let late = t0 + Duration::from_secs(20);
        assert_eq!(timeline.current_time(late), 8.0);
        assert_eq!(timeline.tick(late), Some(DecoderEvent::Waiting));
        assert_eq!(timeline.tick(late + Duration::from_secs(1)), None);
        assert_eq!(timeline.current_time(late + Duration::from_secs(1)), 8.0);

        timeline.apply(&media(2, &[4.0]));
        let resumed = late + Duration::from_secs(2);
        assert_eq!(timeline.tick(resumed), Some(DecoderEvent::Playing));
        let later = resumed + Duration::from_secs(1);
        assert!((timeline.current_time(later) - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_pause_freezes_position() {
        let t0 = Instant::now();
        let mut timeline = Timeline::default();
        timeline.apply(&media(0, &[4.0, 4.0, 4.0]));
        timeline.mark_ready(t0);
        timeline.play(t0);

        let t1 = t0 + Duration::from_secs(2);
        timeline.pause(t1);
        assert!(!timeline.is_running());
        assert!((timeline.current_time(t1 + Duration::from_secs(5)) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_seek_is_clamped_into_window() {
        let t0 = Instant::now();
        let mut timeline = Timeline::default();
        timeline.apply(&media(0, &[4.0, 4.0]));
        timeline.seek(30.0, t0);
        assert_eq!(timeline.current_time(t0), 8.0);
        timeline.seek(-1.0, t0);
        assert_eq!(timeline.current_time(t0), 0.0);
    }
}
