//! APNs push notification gateway (`spec.md` C6).

pub mod client;
pub mod config;
pub mod error;

pub use client::{PushClient, PushOutcome};
pub use config::PushConfig;
pub use error::PushError;
