//! Offline sync (`spec.md` §4.10): replay messages addressed to a user
//! since their last login, suppressing push entirely.

use chrono::NaiveDateTime;
use tracing::instrument;

use betterfly_db::DbGateway;
use betterfly_proto::{FrameCipher, Response};

use crate::registry::Registry;

#[instrument(skip(db, registry, cipher))]
pub fn sync_offline_messages(
    db: &DbGateway,
    registry: &Registry,
    cipher: &dyn FrameCipher,
    user_id: i64,
    last_login: NaiveDateTime,
) -> Result<(), betterfly_db::DbError> {
    let Some(entry) = registry.lookup_by_user(user_id) else {
        return Ok(());
    };

    for row in db.query_sync_message(user_id, last_login)? {
        let response = Response::post(
            row.from_id,
            row.to_id,
            row.timestamp,
            row.msg,
            row.msg_type,
            row.is_group,
        );
        if let Err(e) = entry.send_response(&response, cipher) {
            tracing::warn!(user_id, error = %e, "failed writing sync frame");
            break;
        }
    }

    Ok(())
}
