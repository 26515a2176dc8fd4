//! Error types for token operations.

/// Errors produced by the token codec and sealing layer.
///
/// `verify` never returns these: verification fails closed to `false`.
/// Generation and decoding surface errors to the caller and abort; no
/// partial token is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Required fields were missing/invalid or the crypto primitive failed
    /// while building a token.
    #[error("token generation failed: {0}")]
    Generation(String),

    /// The serialized token was not valid URL-encoded JSON or lacked
    /// required fields.
    #[error("token decode failed: {0}")]
    Decode(String),

    /// Sealing or unsealing merchant data failed.
    #[error("merchant data seal error: {0}")]
    Seal(String),
}

impl From<serde_json::Error> for TokenError {
    fn from(e: serde_json::Error) -> Self {
        TokenError::Decode(e.to_string())
    }
}
