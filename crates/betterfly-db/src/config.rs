use serde::Deserialize;

/// Mirrors `database_config.json` (`spec.md` §6: `user, password, ip, port,
/// db, charset`).
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db: String,
    /// tokio-postgres negotiates encoding with the server and has no
    /// connection parameter for it; kept so the config schema stays a
    /// faithful superset and the field round-trips through `check-config`.
    pub charset: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}
