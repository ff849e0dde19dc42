use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to read APNs signing key at {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to sign APNs JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("APNs request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
