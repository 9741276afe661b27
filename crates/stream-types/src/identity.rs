use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::OriginError;

/// Opaque key identifying one live stream.
///
/// Cheap to clone; immutable for the lifetime of a view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamIdentity(Arc<str>);

impl StreamIdentity {
    /// Create an identity from a stream key. Surrounding whitespace is trimmed.
    pub fn new(key: impl AsRef<str>) -> Result<Self, OriginError> {
        let key = key.as_ref().trim();
        if key.is_empty() {
            return Err(OriginError::EmptyStreamKey);
        }
        Ok(Self(Arc::from(key)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key encoded for use as a single URL path segment.
    pub(crate) fn path_segment(&self) -> Cow<'_, str> {
        urlencoding::encode(&self.0)
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StreamIdentity {
    type Error = OriginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StreamIdentity> for String {
    fn from(value: StreamIdentity) -> Self {
        value.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_trims_key() {
        let id = StreamIdentity::new("  abc123 ").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn test_identity_rejects_blank_key() {
        assert_eq!(StreamIdentity::new(""), Err(OriginError::EmptyStreamKey));
        assert_eq!(StreamIdentity::new("   "), Err(OriginError::EmptyStreamKey));
    }

    #[test]
    fn test_identity_path_segment_is_encoded() {
        let id = StreamIdentity::new("a b/c").unwrap();
        assert_eq!(id.path_segment(), "a%20b%2Fc");
    }

    #[test]
    fn test_identity_serde() {
        let id: StreamIdentity = serde_json::from_str("\"key-1\"").unwrap();
        assert_eq!(id.as_str(), "key-1");
        assert!(serde_json::from_str::<StreamIdentity>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"key-1\"");
    }
}
