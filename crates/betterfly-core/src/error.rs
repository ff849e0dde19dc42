use thiserror::Error;

/// Error taxonomy for the connection core (`spec.md` §7).
///
/// Every worker boundary catches down to one of these and applies the
/// propagation policy in `spec.md` §7: `PeerClosed`/`PeerError` enqueue an
/// abnormal disconnect, `ProtocolViolation` during staging enqueues a
/// normal disconnect, `Transient` drops the current operation and keeps
/// the session, `Fatal` disconnects abnormally.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal failure: {0}")]
    Fatal(String),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("peer connection error: {0}")]
    PeerError(std::io::Error),
}

impl From<betterfly_proto::ProtoError> for CoreError {
    fn from(e: betterfly_proto::ProtoError) -> Self {
        CoreError::MalformedFrame(e.to_string())
    }
}

impl From<betterfly_db::DbError> for CoreError {
    fn from(e: betterfly_db::DbError) -> Self {
        if e.is_transient() {
            CoreError::Transient(e.to_string())
        } else {
            CoreError::Fatal(e.to_string())
        }
    }
}
