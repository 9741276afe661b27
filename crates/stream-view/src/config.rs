//! View configuration, loadable from TOML.
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! origin = "https://example.com"
//!
//! [playback.sync]
//! poll_interval_ms = 500
//!
//! [chat.reconnect]
//! max_attempts = 5
//! ```

use std::path::Path;

use live_chat::{ReconnectPolicy, WebSocketConfig};
use live_playback::{HeadlessDecoderConfig, PlaybackConfig};
use serde::{Deserialize, Serialize};
use stream_types::{PageOrigin, TransportSecurity};

use crate::error::{Result, ViewError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub reconnect: ReconnectPolicy,
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Page origin media and chat addresses are derived from
    pub origin: PageOrigin,
    pub playback: PlaybackConfig,
    pub chat: ChatConfig,
    pub headless: HeadlessDecoderConfig,
    /// Tracing filter directive; `RUST_LOG` still takes precedence
    pub log_filter: Option<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            origin: PageOrigin::new(TransportSecurity::Plain, "localhost:8000"),
            playback: PlaybackConfig::default(),
            chat: ChatConfig::default(),
            headless: HeadlessDecoderConfig::default(),
            log_filter: None,
        }
    }
}

impl ViewConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ViewError::config_io(path, e))?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ViewConfig::from_toml_str("").unwrap();
        assert_eq!(config, ViewConfig::default());
        assert_eq!(config.chat.reconnect.max_attempts, 5);
        assert_eq!(config.playback.sync.poll_interval_ms, 500);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = ViewConfig::from_toml_str(
            r#"
            origin = "https://example.com"
            log_filter = "live_chat=debug"

            [chat.reconnect]
            max_attempts = 3

            [chat.websocket]
            cookie = "session=abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.origin.security(), TransportSecurity::Secure);
        assert_eq!(config.origin.host(), "example.com");
        assert_eq!(config.chat.reconnect.max_attempts, 3);
        assert_eq!(config.chat.reconnect.base_delay_ms, 1000);
        assert_eq!(config.chat.websocket.cookie.as_deref(), Some("session=abc"));
        assert_eq!(config.chat.websocket.connect_timeout_ms, 10_000);
        assert_eq!(config.log_filter.as_deref(), Some("live_chat=debug"));
    }

    #[test]
    fn test_bad_origin_is_a_config_error() {
        let err = ViewConfig::from_toml_str(r#"origin = "ftp://example.com""#).unwrap_err();
        assert!(matches!(err, ViewError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.toml");
        std::fs::write(&path, "[playback.sync]\nlive_edge_margin_secs = 3.0\n").unwrap();

        let config = ViewConfig::load(&path).unwrap();
        assert_eq!(config.playback.sync.live_edge_margin_secs, 3.0);

        let missing = ViewConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ViewError::ConfigIo { .. }));
    }
}
