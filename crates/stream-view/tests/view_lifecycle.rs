use std::time::Duration;

use live_chat::test_support::MockTransport;
use live_chat::{ChatError, ConnectionState, SendRejected};
use live_playback::test_support::MockDecoder;
use live_playback::{DecoderError, DecoderErrorKind, DecoderEvent, PlaybackPhase};
use stream_view::{ChatUser, PageOrigin, StreamIdentity, StreamView, ViewConfig, ViewError};
use tokio::time;

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn config() -> ViewConfig {
    ViewConfig {
        origin: PageOrigin::parse("https://example.com").unwrap(),
        ..ViewConfig::default()
    }
}

fn mount(decoder: &MockDecoder, transport: &MockTransport) -> StreamView {
    StreamView::mount(
        StreamIdentity::new("abc123").unwrap(),
        &config(),
        decoder.clone(),
        transport.clone(),
        Some(ChatUser::new("alice")),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_mount_derives_both_addresses_from_origin() {
    let decoder = MockDecoder::enhanced();
    let transport = MockTransport::new();
    let _view = mount(&decoder, &transport);
    settle().await;

    assert_eq!(
        decoder.attached_url().unwrap().as_str(),
        "https://example.com/live/abc123.m3u8"
    );
    assert_eq!(
        transport.last_address().unwrap().as_str(),
        "wss://example.com/api/streams/ws/abc123/chat"
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_releases_everything_once() {
    let decoder = MockDecoder::enhanced();
    decoder.set_buffered_end(Some(40.0));
    let transport = MockTransport::new();
    let mut view = mount(&decoder, &transport);
    settle().await;
    transport.accept();
    decoder.emit(DecoderEvent::ManifestParsed);
    settle().await;
    assert_eq!(view.chat_state(), ConnectionState::Open);

    view.teardown().await;
    view.teardown().await;
    assert!(view.is_torn_down());
    assert!(view.player().is_finished());
    assert!(view.chat().is_finished());
    assert_eq!(decoder.detach_count(), 1);
    assert!(transport.close_count() >= 1);
    assert_eq!(view.playback().phase, PlaybackPhase::Stopped);

    // A close arriving after teardown must not start a reconnect, and the
    // grace seek died with the playback task.
    transport.drop_connection();
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(transport.open_count(), 1);
    assert!(decoder.seeks().is_empty());

    assert!(matches!(
        view.send_message("hello").await,
        Err(ViewError::Chat(ChatError::Rejected(SendRejected::ShutDown)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_view_cancels_both_tasks() {
    let decoder = MockDecoder::enhanced();
    let transport = MockTransport::new();
    let view = mount(&decoder, &transport);
    settle().await;
    transport.accept();
    settle().await;

    drop(view);
    settle().await;
    assert_eq!(decoder.detach_count(), 1);
    assert!(!decoder.is_attached());

    transport.drop_connection();
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_chat_keeps_running_after_video_failure() {
    let decoder = MockDecoder::enhanced();
    let transport = MockTransport::new();
    let mut view = mount(&decoder, &transport);
    let mut messages = view.take_messages().unwrap();
    settle().await;
    transport.accept();
    settle().await;

    decoder.emit(DecoderEvent::Error(DecoderError::fatal(
        DecoderErrorKind::Media,
        DecoderError::MANIFEST_PARSING,
        "bad playlist",
    )));
    settle().await;
    assert_eq!(view.playback().phase, PlaybackPhase::Failed);
    assert!(view.playback().error.is_some());

    assert_eq!(view.chat_state(), ConnectionState::Open);
    view.send_message("still here").await.unwrap();
    assert_eq!(transport.sent().len(), 1);

    transport.push_frame(r#"{"type":"message","username":"bob","text":"same"}"#);
    settle().await;
    assert_eq!(messages.recv().await.unwrap().text, "same");

    view.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_video_keeps_running_after_chat_gives_up() {
    let decoder = MockDecoder::enhanced();
    decoder.set_buffered_end(Some(40.0));
    let transport = MockTransport::new();
    transport.fail_open(true);
    let mut view = mount(&decoder, &transport);
    settle().await;
    decoder.emit(DecoderEvent::ManifestParsed);
    settle().await;

    for delay_ms in [1000, 2000, 4000, 8000, 10_000] {
        time::advance(Duration::from_millis(delay_ms)).await;
        settle().await;
    }
    assert_eq!(view.chat_state(), ConnectionState::Failed);
    assert_eq!(transport.open_count(), 6);

    assert_eq!(view.playback().phase, PlaybackPhase::Playing);
    assert!(!view.player().is_finished());
    assert_eq!(decoder.seeks(), vec![38.0]);
    assert!(!view.is_live());

    view.teardown().await;
    assert_eq!(decoder.detach_count(), 1);
}

