//! Persistence gateway over a Postgres-backed schema of stored procedures
//! (`spec.md` C4). Every call is a `CALL`/function invocation; there is no
//! query builder or ORM layer here, mirroring the reference
//! implementation's thin `DBOperator`.

pub mod config;
pub mod error;
pub mod gateway;

pub use config::DbConfig;
pub use error::DbError;
pub use gateway::{DbGateway, SyncedMessage};
