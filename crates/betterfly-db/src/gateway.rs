//! Persistence gateway: one stored-procedure call per method (`spec.md` C4).
//!
//! The dispatcher pool (`betterfly-core`, C9) is a fixed pool of blocking
//! OS threads, not an async runtime, but `deadpool-postgres`/`tokio-postgres`
//! are async-only. `DbGateway` owns a small multi-thread [`tokio::runtime::Runtime`]
//! and bridges every call through [`tokio::runtime::Runtime::block_on`] at
//! this boundary, so callers outside this crate never see a `Future`.

use chrono::NaiveDateTime;
use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime as DeadpoolRuntime,
};
use tokio_postgres::NoTls;
use tracing::{instrument, warn};

use betterfly_proto::MsgType;

use crate::config::DbConfig;
use crate::error::DbError;

/// One message handed back by [`DbGateway::query_sync_message`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedMessage {
    pub from_id: i64,
    pub to_id: i64,
    pub timestamp: NaiveDateTime,
    pub msg: String,
    pub msg_type: MsgType,
    pub is_group: bool,
}

fn msg_type_to_db(msg_type: &MsgType) -> &'static str {
    match msg_type {
        MsgType::Text => "text",
        MsgType::File => "file",
        MsgType::Gif => "gif",
        MsgType::Image => "image",
        MsgType::Other => "other",
    }
}

fn msg_type_from_db(raw: &str) -> MsgType {
    match raw {
        "text" => MsgType::Text,
        "file" => MsgType::File,
        "gif" => MsgType::Gif,
        "image" => MsgType::Image,
        _ => MsgType::Other,
    }
}

pub struct DbGateway {
    pool: Pool,
    rt: tokio::runtime::Runtime,
}

impl DbGateway {
    pub fn connect(config: &DbConfig) -> Result<DbGateway, DbError> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .thread_name("betterfly-db")
            .enable_all()
            .build()
            .map_err(|e| DbError::Config(e.to_string()))?;

        let mut pool_cfg = PgConfig::new();
        pool_cfg.host = Some(config.ip.clone());
        pool_cfg.port = Some(config.port);
        pool_cfg.user = Some(config.user.clone());
        pool_cfg.password = Some(config.password.clone());
        pool_cfg.dbname = Some(config.db.clone());
        pool_cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        // deadpool has no literal "minimum connections" knob (connections are
        // opened lazily on demand); `max_size` is the closest fit for
        // `spec.md` §5's "min 4, max 16" and is floored at 4 so a
        // misconfigured small value doesn't starve the dispatch pool.
        pool_cfg.pool = Some(PoolConfig {
            max_size: config.pool_size.max(4),
            ..PoolConfig::default()
        });

        let pool = rt
            .block_on(async { pool_cfg.create_pool(Some(DeadpoolRuntime::Tokio1), NoTls) })
            .map_err(|e| DbError::Config(e.to_string()))?;

        Ok(DbGateway { pool, rt })
    }

    /// `spec.md` §4.4 invariant: the original schema reserves ids below
    /// 1000 and rejects them before ever touching the pool.
    #[instrument(skip(self))]
    pub fn login(&self, user_id: i64, user_name: &str, last_login: NaiveDateTime) -> Result<(), DbError> {
        if user_id < 1000 {
            return Err(DbError::UserIdTooLow(user_id));
        }
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute("CALL login($1, $2, $3)", &[&user_id, &user_name, &last_login])
                .await?;
            Ok(())
        })
    }

    /// `spec.md` §4.4: `query_user(id) → (name, avatar)`, either half
    /// null-coalesced to `""`. The dispatcher is the one that joins these
    /// into the wire's `"name.avatar"` encoding (`spec.md` §9 open question).
    #[instrument(skip(self))]
    pub fn query_user(&self, user_id: i64) -> Result<(String, String), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            let row = client
                .query_opt("SELECT * FROM query_user($1)", &[&user_id])
                .await?;
            Ok(row
                .map(|r| {
                    (
                        r.get::<_, Option<String>>(0).unwrap_or_default(),
                        r.get::<_, Option<String>>(1).unwrap_or_default(),
                    )
                })
                .unwrap_or_default())
        })
    }

    #[instrument(skip(self))]
    pub fn query_user_name(&self, user_id: i64) -> Result<String, DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            let row = client
                .query_opt("SELECT * FROM query_user_name($1)", &[&user_id])
                .await?;
            Ok(row.and_then(|r| r.get::<_, Option<String>>(0)).unwrap_or_default())
        })
    }

    #[instrument(skip(self))]
    pub fn insert_contact(&self, user_id1: i64, user_id2: i64) -> Result<(), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute("CALL insert_contact($1, $2)", &[&user_id1, &user_id2])
                .await?;
            Ok(())
        })
    }

    #[instrument(skip(self, msg))]
    #[allow(clippy::too_many_arguments)]
    pub fn insert_message(
        &self,
        from_id: i64,
        to_id: i64,
        timestamp: NaiveDateTime,
        msg: &str,
        msg_type: &MsgType,
        is_group: bool,
    ) -> Result<(), DbError> {
        let msg_type = msg_type_to_db(msg_type);
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute(
                    "CALL insert_message($1, $2, $3, $4, $5, $6)",
                    &[&from_id, &to_id, &timestamp, &msg, &msg_type, &is_group],
                )
                .await?;
            Ok(())
        })
    }

    /// `spec.md` §4.4: `query_group(id) → (name, avatar)`.
    #[instrument(skip(self))]
    pub fn query_group(&self, group_id: i64) -> Result<(String, String), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            let row = client
                .query_opt("SELECT * FROM query_group($1)", &[&group_id])
                .await?;
            Ok(row
                .map(|r| {
                    (
                        r.get::<_, Option<String>>(0).unwrap_or_default(),
                        r.get::<_, Option<String>>(1).unwrap_or_default(),
                    )
                })
                .unwrap_or_default())
        })
    }

    #[instrument(skip(self))]
    pub fn insert_group(&self, group_id: i64, group_name: &str) -> Result<(), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute("CALL insert_group($1, $2)", &[&group_id, &group_name])
                .await?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn insert_group_user(&self, group_id: i64, user_id: i64) -> Result<(), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute("CALL insert_group_user($1, $2)", &[&group_id, &user_id])
                .await?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn query_group_user(&self, group_id: i64) -> Result<Vec<i64>, DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            let rows = client
                .query("SELECT * FROM query_group_user($1)", &[&group_id])
                .await?;
            Ok(rows.iter().map(|r| r.get(0)).collect())
        })
    }

    #[instrument(skip(self))]
    pub fn query_file(&self, file_hash: &str, file_suffix: &str) -> Result<bool, DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            let row = client
                .query_opt("SELECT * FROM query_file($1, $2)", &[&file_hash, &file_suffix])
                .await?;
            Ok(row.is_some())
        })
    }

    #[instrument(skip(self))]
    pub fn insert_file(&self, file_hash: &str, file_suffix: &str) -> Result<(), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute("CALL insert_file($1, $2)", &[&file_hash, &file_suffix])
                .await?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn insert_user_apns_token(&self, user_id: i64, apns_token: &str) -> Result<(), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute(
                    "CALL insert_user_apns_token($1, $2)",
                    &[&user_id, &apns_token],
                )
                .await?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn query_user_apns_tokens(&self, user_id: i64) -> Result<Vec<String>, DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            let rows = client
                .query("SELECT * FROM query_user_apns_tokens($1)", &[&user_id])
                .await?;
            Ok(rows
                .iter()
                .filter_map(|r| r.get::<_, Option<String>>(0))
                .collect())
        })
    }

    /// Invoked from the push worker when APNs reports the token as no
    /// longer valid (`spec.md` C6, C8).
    #[instrument(skip(self))]
    pub fn delete_user_apns_token(&self, user_id: i64, apns_token: &str) -> Result<(), DbError> {
        let result = self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute(
                    "CALL delete_user_apns_token($1, $2)",
                    &[&user_id, &apns_token],
                )
                .await
        });
        if let Err(e) = &result {
            warn!(user_id, error = %e, "failed to prune stale APNs token");
        }
        result.map(|_| ()).map_err(DbError::from)
    }

    #[instrument(skip(self))]
    pub fn update_user_avatar(&self, user_id: i64, avatar: &str) -> Result<(), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute("CALL update_user_avatar($1, $2)", &[&user_id, &avatar])
                .await?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn update_group_avatar(&self, group_id: i64, avatar: &str) -> Result<(), DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            client
                .execute("CALL update_group_avatar($1, $2)", &[&group_id, &avatar])
                .await?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn query_sync_message(
        &self,
        user_id: i64,
        since: NaiveDateTime,
    ) -> Result<Vec<SyncedMessage>, DbError> {
        self.rt.block_on(async {
            let client = self.pool.get().await?;
            let rows = client
                .query("SELECT * FROM query_sync_message($1, $2)", &[&user_id, &since])
                .await?;
            Ok(rows
                .iter()
                .map(|r| SyncedMessage {
                    from_id: r.get(0),
                    to_id: r.get(1),
                    timestamp: r.get(2),
                    msg: r.get(3),
                    msg_type: msg_type_from_db(r.get(4)),
                    is_group: r.get(5),
                })
                .collect())
        })
    }
}
