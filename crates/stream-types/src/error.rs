use thiserror::Error;

/// Errors raised while building stream identities and addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("stream key must not be empty")]
    EmptyStreamKey,

    #[error("invalid origin `{input}`: {reason}")]
    InvalidOrigin { input: String, reason: String },

    #[error("unsupported origin scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    #[error("failed to build {kind} URL: {reason}")]
    InvalidAddress { kind: &'static str, reason: String },
}

impl OriginError {
    pub fn invalid_origin(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOrigin {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_address(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            kind,
            reason: reason.into(),
        }
    }
}
