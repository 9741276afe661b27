use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::OriginError;
use crate::identity::StreamIdentity;

/// Whether the hosting page is served over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    Secure,
    Plain,
}

impl TransportSecurity {
    pub fn http_scheme(self) -> &'static str {
        match self {
            Self::Secure => "https",
            Self::Plain => "http",
        }
    }

    pub fn socket_scheme(self) -> &'static str {
        match self {
            Self::Secure => "wss",
            Self::Plain => "ws",
        }
    }
}

/// Scheme and host of the page a stream view lives on.
///
/// Media and chat addresses are derived from this value, so a secure page
/// always gets `https` media and a `wss` chat socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageOrigin {
    security: TransportSecurity,
    /// Host with an optional non-default port, e.g. `example.com:8443`.
    host: String,
}

impl PageOrigin {
    pub fn new(security: TransportSecurity, host: impl Into<String>) -> Self {
        Self {
            security,
            host: host.into(),
        }
    }

    /// Parse an origin such as `https://example.com` or `ws://10.0.0.2:8000`.
    pub fn parse(input: &str) -> Result<Self, OriginError> {
        let url = Url::parse(input.trim())
            .map_err(|e| OriginError::invalid_origin(input, e.to_string()))?;

        let security = match url.scheme() {
            "https" | "wss" => TransportSecurity::Secure,
            "http" | "ws" => TransportSecurity::Plain,
            other => {
                return Err(OriginError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| OriginError::invalid_origin(input, "missing host"))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self { security, host })
    }

    #[inline]
    pub fn security(&self) -> TransportSecurity {
        self.security
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// HLS manifest URL for a stream: `{http|https}://{host}/live/{key}.m3u8`.
    pub fn media_url(&self, identity: &StreamIdentity) -> Result<Url, OriginError> {
        let raw = format!(
            "{}://{}/live/{}.m3u8",
            self.security.http_scheme(),
            self.host,
            identity.path_segment()
        );
        Url::parse(&raw).map_err(|e| OriginError::invalid_address("media", e.to_string()))
    }

    /// Chat socket address: `{ws|wss}://{host}/api/streams/ws/{key}/chat`.
    pub fn chat_url(&self, identity: &StreamIdentity) -> Result<Url, OriginError> {
        let raw = format!(
            "{}://{}/api/streams/ws/{}/chat",
            self.security.socket_scheme(),
            self.host,
            identity.path_segment()
        );
        Url::parse(&raw).map_err(|e| OriginError::invalid_address("chat", e.to_string()))
    }

    /// Base URL of the REST backend, always ending with `/`.
    pub fn api_base(&self) -> Result<Url, OriginError> {
        let raw = format!("{}://{}/api/", self.security.http_scheme(), self.host);
        Url::parse(&raw).map_err(|e| OriginError::invalid_address("api", e.to_string()))
    }
}

impl fmt::Display for PageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.security.http_scheme(), self.host)
    }
}

impl TryFrom<String> for PageOrigin {
    type Error = OriginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PageOrigin> for String {
    fn from(value: PageOrigin) -> Self {
        value.to_string()
    }
}
