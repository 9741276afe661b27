//! Headless HLS decoder.
//!
//! A [`MediaDecoderPort`] for hosts without a media element. It follows the
//! live media playlist over HTTP and runs a wall-clock playback position
//! bounded by the downloaded window, which is enough to drive the
//! synchronizer (and a recorder or monitor built on top of it) without
//! decoding any media.

mod timeline;
mod window;

use std::sync::Arc;
use std::time::Duration;

use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, parse_playlist_res};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stream_types::timer::{Timer, arm, fire};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::decoder::{
    AttachMode, DecoderError, DecoderErrorKind, DecoderEvent, DecoderEventSender,
    MediaDecoderPort, PlaybackSupport,
};
use crate::error::{PlaybackError, Result};

use self::timeline::Timeline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessDecoderConfig {
    /// Playlist request timeout for natively attached sources
    pub request_timeout_ms: u64,
    /// Lower bound for the playlist refresh interval
    pub min_refresh_ms: u64,
    /// Resolution of the playback clock and of position updates
    pub clock_tick_ms: u64,
    pub user_agent: String,
}

impl Default for HeadlessDecoderConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            min_refresh_ms: 1_000,
            clock_tick_ms: 250,
            user_agent: concat!("live-playback/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

struct Session {
    events: DecoderEventSender,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Playlist-following decoder without media output.
pub struct HeadlessHlsDecoder {
    client: reqwest::Client,
    config: HeadlessDecoderConfig,
    timeline: Arc<Mutex<Timeline>>,
    session: Option<Session>,
    volume: f64,
}

impl HeadlessHlsDecoder {
    pub fn new(config: HeadlessDecoderConfig) -> Result<Self> {
        stream_types::install_rustls_provider();
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: HeadlessDecoderConfig) -> Self {
        Self {
            client,
            config,
            timeline: Arc::new(Mutex::new(Timeline::default())),
            session: None,
            volume: 1.0,
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    fn emit(&self, event: DecoderEvent) {
        if let Some(session) = &self.session {
            let _ = session.events.send(event);
        }
    }
}

impl MediaDecoderPort for HeadlessHlsDecoder {
    fn support(&self) -> PlaybackSupport {
        PlaybackSupport::Enhanced
    }

    fn attach(
        &mut self,
        source: &Url,
        mode: AttachMode<'_>,
        events: DecoderEventSender,
    ) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlaybackError::attach(source.as_str(), e.to_string()))?;
        self.detach();

        let request_timeout = match mode {
            AttachMode::Enhanced(buffer) => buffer.fragment_load_timeout(),
            AttachMode::Native => Duration::from_millis(self.config.request_timeout_ms),
        };
        let follower = PlaylistFollower {
            client: self.client.clone(),
            source: source.clone(),
            request_timeout,
            min_refresh: Duration::from_millis(self.config.min_refresh_ms),
            clock_tick: Duration::from_millis(self.config.clock_tick_ms.max(1)),
            timeline: Arc::clone(&self.timeline),
            events: events.clone(),
        };
        let cancel = CancellationToken::new();
        let span = info_span!("headless_hls", url = %source);
        let task = runtime.spawn(follower.run(cancel.clone()).instrument(span));

        self.session = Some(Session {
            events,
            cancel,
            task,
        });
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            session.task.abort();
            debug!("Headless decoder detached");
        }
        // A fresh timeline so an aborting follower cannot touch the next session.
        self.timeline = Arc::default();
    }

    fn buffered_end(&self) -> Option<f64> {
        self.timeline.lock().buffered_end()
    }

    fn current_time(&self) -> f64 {
        self.timeline.lock().current_time(Instant::now())
    }

    fn seek(&mut self, seconds: f64) {
        self.timeline.lock().seek(seconds, Instant::now());
    }

    fn play(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Err(PlaybackError::decoder("no source attached"));
        }
        let started = self.timeline.lock().play(Instant::now());
        self.emit(DecoderEvent::Play);
        if started {
            self.emit(DecoderEvent::Playing);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.timeline.lock().pause(Instant::now());
        self.emit(DecoderEvent::Pause);
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    fn recover_media_error(&mut self) -> Result<()> {
        self.timeline.lock().rebase(Instant::now());
        Ok(())
    }
}

impl Drop for HeadlessHlsDecoder {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            session.task.abort();
        }
    }
}

/// Background half of the decoder: playlist refreshes and the clock tick.
struct PlaylistFollower {
    client: reqwest::Client,
    source: Url,
    request_timeout: Duration,
    min_refresh: Duration,
    clock_tick: Duration,
    timeline: Arc<Mutex<Timeline>>,
    events: DecoderEventSender,
}

impl PlaylistFollower {
    async fn run(self, cancel: CancellationToken) {
        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            loaded = self.load_initial() => loaded,
        };
        let (playlist_url, playlist) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                let details = match &e {
                    PlaybackError::Manifest { .. } => DecoderError::MANIFEST_PARSING,
                    _ => DecoderError::MANIFEST_LOAD,
                };
                warn!(error = %e, "Initial playlist load failed");
                self.send(DecoderEvent::Error(DecoderError::fatal(
                    DecoderErrorKind::Network,
                    details,
                    e.to_string(),
                )));
                return;
            }
        };

        let (started, refresh_interval, ended) = {
            let mut timeline = self.timeline.lock();
            let added = timeline.apply(&playlist);
            debug!(segments = added, "Initial playlist loaded");
            (
                timeline.mark_ready(Instant::now()),
                timeline.refresh_interval(self.min_refresh),
                timeline.is_ended(),
            )
        };
        info!(url = %playlist_url, "Manifest parsed");
        self.send(DecoderEvent::ManifestParsed);
        if started {
            self.send(DecoderEvent::Playing);
        }

        let mut refresh: Timer = if ended { None } else { arm(refresh_interval) };
        let mut clock = time::interval(self.clock_tick);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = fire(&mut refresh) => {
                    refresh = None;
                    let refreshed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        refreshed = self.fetch_media(&playlist_url) => refreshed,
                    };
                    match refreshed {
                        Ok(playlist) => {
                            let mut timeline = self.timeline.lock();
                            let added = timeline.apply(&playlist);
                            if timeline.is_ended() {
                                info!("Playlist ended, refresh stopped");
                            } else {
                                refresh = arm(timeline.refresh_interval(self.min_refresh));
                            }
                            if added > 0 {
                                debug!(segments = added, "Playlist refreshed");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Playlist refresh failed");
                            self.send(DecoderEvent::Error(DecoderError::non_fatal(
                                DecoderErrorKind::Network,
                                DecoderError::LEVEL_LOAD,
                                e.to_string(),
                            )));
                            refresh = arm(self.min_refresh);
                        }
                    }
                }

                _ = clock.tick() => {
                    let (transition, position) = {
                        let mut timeline = self.timeline.lock();
                        let now = Instant::now();
                        (timeline.tick(now), timeline.is_running().then(|| timeline.current_time(now)))
                    };
                    if let Some(event) = transition {
                        self.send(event);
                    }
                    if let Some(position) = position {
                        self.send(DecoderEvent::TimeUpdate(position));
                    }
                }
            }
        }
        debug!("Playlist follower stopped");
    }

    /// Load the source, resolving a master playlist to its best variant.
    async fn load_initial(&self) -> Result<(Url, MediaPlaylist)> {
        match self.fetch(&self.source).await? {
            Playlist::MediaPlaylist(playlist) => Ok((self.source.clone(), playlist)),
            Playlist::MasterPlaylist(master) => {
                let variant = select_variant(&self.source, &master)?;
                debug!(variant = %variant, "Selected variant playlist");
                let playlist = self.fetch_media(&variant).await?;
                Ok((variant, playlist))
            }
        }
    }

    async fn fetch_media(&self, url: &Url) -> Result<MediaPlaylist> {
        match self.fetch(url).await? {
            Playlist::MediaPlaylist(playlist) => Ok(playlist),
            Playlist::MasterPlaylist(_) => Err(PlaybackError::manifest(format!(
                "expected a media playlist at {url}"
            ))),
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Playlist> {
        let bytes = self
            .client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_playlist_res(&bytes)
            .map_err(|e| PlaybackError::manifest(format!("failed to parse {url}: {e}")))
    }

    fn send(&self, event: DecoderEvent) {
        let _ = self.events.send(event);
    }
}

/// Pick the highest-bandwidth regular variant.
fn select_variant(base: &Url, master: &MasterPlaylist) -> Result<Url> {
    let variant = master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .max_by_key(|v| v.bandwidth)
        .ok_or_else(|| PlaybackError::manifest("master playlist has no variants"))?;
    base.join(&variant.uri)
        .map_err(|e| PlaybackError::manifest(format!("invalid variant uri {}: {e}", variant.uri)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::BufferConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:4.0,
seg0.ts
#EXTINF:4.0,
seg1.ts
#EXTINF:4.0,
seg2.ts
";

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720
high/index.m3u8
";

    /// Serve fixed bodies by path over plain HTTP/1.1.
    async fn serve(routes: HashMap<&'static str, &'static str>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");
                    let response = match routes.get(path) {
                        Some(body) => format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/vnd.apple.mpegurl\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        ),
                        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string(),
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<DecoderEvent>) -> DecoderEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for decoder event")
                .expect("decoder event channel closed");
            if !matches!(event, DecoderEvent::TimeUpdate(_)) {
                return event;
            }
        }
    }

    fn decoder() -> HeadlessHlsDecoder {
        HeadlessHlsDecoder::new(HeadlessDecoderConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_media_playlist_reports_buffered_window() {
        let base = serve(HashMap::from([("/live/abc123.m3u8", MEDIA)])).await;
        let source = base.join("live/abc123.m3u8").unwrap();
        let mut decoder = decoder();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let buffer = BufferConfig::default();

        decoder
            .attach(&source, AttachMode::Enhanced(&buffer), tx)
            .unwrap();
        decoder.play().unwrap();

        assert_eq!(next_event(&mut rx).await, DecoderEvent::Play);
        assert_eq!(next_event(&mut rx).await, DecoderEvent::ManifestParsed);
        assert_eq!(next_event(&mut rx).await, DecoderEvent::Playing);
        assert_eq!(decoder.buffered_end(), Some(12.0));
        assert!(decoder.current_time() <= 12.0);

        decoder.seek(10.0);
        assert!(decoder.current_time() >= 10.0);
        decoder.detach();
        assert_eq!(decoder.buffered_end(), None);
    }

    #[tokio::test]
    async fn test_master_playlist_selects_highest_bandwidth() {
        let base = serve(HashMap::from([
            ("/live/abc123.m3u8", MASTER),
            ("/live/high/index.m3u8", MEDIA),
        ]))
        .await;
        let source = base.join("live/abc123.m3u8").unwrap();
        let mut decoder = decoder();
        let (tx, mut rx) = mpsc::unbounded_channel();

        decoder.attach(&source, AttachMode::Native, tx).unwrap();
        assert_eq!(next_event(&mut rx).await, DecoderEvent::ManifestParsed);
        assert_eq!(decoder.buffered_end(), Some(12.0));
    }

    #[tokio::test]
    async fn test_missing_manifest_is_fatal() {
        let base = serve(HashMap::new()).await;
        let source = base.join("live/missing.m3u8").unwrap();
        let mut decoder = decoder();
        let (tx, mut rx) = mpsc::unbounded_channel();

        decoder.attach(&source, AttachMode::Native, tx).unwrap();
        match next_event(&mut rx).await {
            DecoderEvent::Error(err) => {
                assert!(err.fatal);
                assert_eq!(err.details, DecoderError::MANIFEST_LOAD);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_manifest_is_fatal() {
        let base = serve(HashMap::from([("/live/abc123.m3u8", "not a playlist")])).await;
        let source = base.join("live/abc123.m3u8").unwrap();
        let mut decoder = decoder();
        let (tx, mut rx) = mpsc::unbounded_channel();

        decoder.attach(&source, AttachMode::Native, tx).unwrap();
        match next_event(&mut rx).await {
            DecoderEvent::Error(err) => {
                assert!(err.fatal);
                assert_eq!(err.details, DecoderError::MANIFEST_PARSING);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_play_without_source_is_refused() {
        let mut decoder = decoder();
        assert!(matches!(
            decoder.play(),
            Err(PlaybackError::Decoder { .. })
        ));
    }
}
