use thiserror::Error;

/// Failures that can occur while turning a raw byte buffer into frames, or a
/// frame into a typed [`crate::message::Request`].
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The buffer was non-empty but the codec could not extract a single
    /// complete frame from it (unbalanced braces, bad UTF-8, cipher failure).
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A frame decoded to valid JSON but was missing fields required for its
    /// declared `type`.
    #[error("request missing required field `{0}` for its kind")]
    MissingField(&'static str),

    #[error("unrecognised request kind {0}")]
    UnknownKind(i64),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
