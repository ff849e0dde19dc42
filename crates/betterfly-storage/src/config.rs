use serde::Deserialize;

/// Mirrors `cos_config.json` (`spec.md` External interfaces). The field
/// names keep the Tencent COS vocabulary (`region`, `secret_id`,
/// `secret_key`) since that is what the deployment's config file already
/// calls them; the client underneath talks to the bucket over the
/// S3-compatible API.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub region: String,
    pub secret_id: String,
    pub secret_key: String,
    pub endpoint: String,
    pub bucket: String,
}
