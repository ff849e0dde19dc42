//! Object-store gateway for file upload/download flows (`spec.md` C5).

pub mod config;
pub mod error;
pub mod gateway;

pub use config::StorageConfig;
pub use error::StorageError;
pub use gateway::ObjectStoreGateway;
