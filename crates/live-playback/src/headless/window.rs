use std::time::Duration;

use m3u8_rs::MediaPlaylist;
use tracing::debug;

/// Downloaded range of a live media playlist.
///
/// Segments are keyed by media sequence number, so a refresh that repeats
/// segments from the previous one only counts the new tail.
#[derive(Debug, Clone, Default)]
pub(crate) struct LiveWindow {
    /// First media sequence number not yet counted
    next_sequence: Option<u64>,
    /// Media sequence of the previous playlist
    last_media_sequence: Option<u64>,
    buffered_secs: f64,
    target_duration_secs: f64,
    ended: bool,
}

impl LiveWindow {
    /// Merge a freshly loaded playlist. Returns the number of new segments.
    pub fn apply(&mut self, playlist: &MediaPlaylist) -> usize {
        if self.is_restart(playlist) {
            debug!(
                media_sequence = playlist.media_sequence,
                previous = self.last_media_sequence,
                "Media sequence restarted, re-anchoring window"
            );
            self.next_sequence = Some(playlist.media_sequence);
        }
        self.last_media_sequence = Some(playlist.media_sequence);

        let mut added = 0;
        for (index, segment) in playlist.segments.iter().enumerate() {
            let sequence = playlist.media_sequence + index as u64;
            if self.next_sequence.is_some_and(|next| sequence < next) {
                continue;
            }
            let duration = segment.duration as f64;
            if duration.is_finite() && duration > 0.0 {
                self.buffered_secs += duration;
            }
            self.next_sequence = Some(sequence + 1);
            added += 1;
        }
        self.target_duration_secs = playlist.target_duration as f64;
        self.ended |= playlist.end_list;
        added
    }

    /// The encoder started over: the sequence went backwards and the new
    /// playlist either opens with a discontinuity or shares no segment with
    /// the previous one. A stale playlist that still overlaps is not a restart.
    fn is_restart(&self, playlist: &MediaPlaylist) -> bool {
        let (Some(previous), Some(next)) = (self.last_media_sequence, self.next_sequence) else {
            return false;
        };
        if playlist.media_sequence >= previous {
            return false;
        }
        let end = playlist.media_sequence + playlist.segments.len() as u64;
        let discontinuity = playlist.segments.first().is_some_and(|s| s.discontinuity);
        end <= next && (discontinuity || end <= previous)
    }

    /// Seconds of media seen since attach, `None` before the first segment.
    pub fn buffered_end(&self) -> Option<f64> {
        self.next_sequence.map(|_| self.buffered_secs)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Half the target duration, never below `min`.
    pub fn refresh_interval(&self, min: Duration) -> Duration {
        let half = self.target_duration_secs * 0.5;
        if half.is_finite() && half > 0.0 {
            Duration::from_secs_f64(half).max(min)
        } else {
            min
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::{Playlist, parse_playlist_res};

    fn media(text: &str) -> MediaPlaylist {
        match parse_playlist_res(text.as_bytes()) {
            Ok(Playlist::MediaPlaylist(pl)) => pl,
            other => panic!("expected media playlist, got {other:?}"),
        }
    }

    const FIRST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:10
#EXTINF:4.0,
seg10.ts
#EXTINF:4.0,
seg11.ts
#EXTINF:4.0,
seg12.ts
";

    const SECOND: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:11
#EXTINF:4.0,
seg11.ts
#EXTINF:4.0,
seg12.ts
#EXTINF:3.5,
seg13.ts
";

    #[test]
    fn test_refresh_counts_only_new_segments() {
        let mut window = LiveWindow::default();
        assert_eq!(window.buffered_end(), None);

        assert_eq!(window.apply(&media(FIRST)), 3);
        assert_eq!(window.buffered_end(), Some(12.0));

        assert_eq!(window.apply(&media(SECOND)), 1);
        assert_eq!(window.buffered_end(), Some(15.5));

        // Same playlist again adds nothing.
        assert_eq!(window.apply(&media(SECOND)), 0);
        assert_eq!(window.buffered_end(), Some(15.5));
        assert!(!window.is_ended());
    }

    fn playlist(sequence: u64, segments: usize) -> MediaPlaylist {
        let mut text = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:{sequence}\n"
        );
        for index in 0..segments {
            text.push_str(&format!("#EXTINF:4.0,\nseg{}.ts\n", sequence + index as u64));
        }
        media(&text)
    }

    #[test]
    fn test_encoder_restart_keeps_accumulating() {
        let mut window = LiveWindow::default();
        assert_eq!(window.apply(&playlist(100, 2)), 2);
        assert_eq!(window.buffered_end(), Some(8.0));

        // Republished stream starts counting from zero again.
        assert_eq!(window.apply(&playlist(0, 2)), 2);
        assert_eq!(window.buffered_end(), Some(16.0));

        assert_eq!(window.apply(&playlist(2, 2)), 2);
        assert_eq!(window.buffered_end(), Some(24.0));

        assert_eq!(window.apply(&playlist(3, 2)), 1);
        assert_eq!(window.buffered_end(), Some(28.0));
    }

    #[test]
    fn test_restart_with_discontinuity_inside_old_range() {
        let mut window = LiveWindow::default();
        window.apply(&playlist(10, 3));
        assert_eq!(window.buffered_end(), Some(12.0));

        let restarted = media(
            "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:9
#EXT-X-DISCONTINUITY
#EXTINF:4.0,
new0.ts
#EXTINF:4.0,
new1.ts
",
        );
        assert_eq!(window.apply(&restarted), 2);
        assert_eq!(window.buffered_end(), Some(20.0));
    }

    #[test]
    fn test_stale_overlapping_playlist_is_not_a_restart() {
        let mut window = LiveWindow::default();
        window.apply(&media(SECOND));
        assert_eq!(window.buffered_end(), Some(11.5));

        // A cached copy one sequence behind repeats known segments.
        assert_eq!(window.apply(&media(FIRST)), 0);
        assert_eq!(window.buffered_end(), Some(11.5));
    }

    #[test]
    fn test_refresh_interval_is_half_target_duration() {
        let mut window = LiveWindow::default();
        let min = Duration::from_millis(500);
        assert_eq!(window.refresh_interval(min), min);

        window.apply(&media(FIRST));
        assert_eq!(window.refresh_interval(min), Duration::from_secs(2));
        assert_eq!(
            window.refresh_interval(Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_endlist_marks_window_ended() {
        let mut window = LiveWindow::default();
        window.apply(&media(&format!("{FIRST}#EXT-X-ENDLIST\n")));
        assert!(window.is_ended());
    }
}
