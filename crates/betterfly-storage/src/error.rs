use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to build presigned URL: {0}")]
    Presign(String),

    #[error("object store request failed: {0}")]
    Request(String),
}
