use serde::Deserialize;

/// Mirrors `apns_config.json` (`spec.md` External interfaces). The signing
/// key itself is read from `key_path`, a `.p8` file, rather than embedded
/// in the config, so it can be rotated and excluded from version control
/// independently.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub team_id: String,
    pub key_id: String,
    pub bundle_id: String,
    pub key_path: String,
    #[serde(default)]
    pub use_sandbox: bool,
}
