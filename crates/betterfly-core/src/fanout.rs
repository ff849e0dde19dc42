//! Send/fan-out: the single choke point that resolves a destination,
//! writes to live recipient sockets, and enqueues push tasks for absent
//! ones (`spec.md` C10, §4.9).

use betterfly_db::DbGateway;
use betterfly_proto::{FrameCipher, MsgType, Response};
use tracing::warn;

use crate::queues::{PushSender, PushTask};
use crate::registry::Registry;

/// `spec.md` §4.9: special-case preview bodies for non-text kinds, and a
/// stock line for long text.
pub fn push_preview(msg_type: &MsgType, msg: &str) -> String {
    match msg_type {
        MsgType::File => "[文件]".to_string(),
        MsgType::Gif => "[表情符号]".to_string(),
        MsgType::Image => "[图片]".to_string(),
        MsgType::Text | MsgType::Other => {
            if msg.chars().count() > 30 {
                "您有一条新消息".to_string()
            } else {
                msg.to_string()
            }
        }
    }
}

/// Resolves `to_id` under `is_group`/broadcast rules (`spec.md` §4.9) into
/// the list of recipient user ids, excluding `exclude_id`, the id a
/// response is attributed to as its sender. For ordinary posts that is the
/// acting user; a hello carries its own, sometimes synthetic, `from`
/// (`spec.md` §8 scenario 3 uses `from=0` for a group-creation hello), and
/// callers must pass that same value so the real actor isn't excluded from
/// a hello they are in fact a recipient of.
fn resolve_recipients(
    registry: &Registry,
    db: &DbGateway,
    to_id: i64,
    is_group: bool,
    exclude_id: i64,
) -> Result<Vec<i64>, betterfly_db::DbError> {
    if is_group && to_id == -1 {
        return Ok(registry
            .snapshot_authenticated()
            .into_iter()
            .map(|e| e.user_id)
            .filter(|&uid| uid != exclude_id)
            .collect());
    }
    if is_group {
        return Ok(db
            .query_group_user(to_id)?
            .into_iter()
            .filter(|&uid| uid != exclude_id)
            .collect());
    }
    Ok(vec![to_id])
}

/// `send(destination, message, isGroup, withPush)` from `spec.md` §4.9.
///
/// `exclude_id`/`msg_type`/`raw_msg` are needed only to build the push
/// preview body and resolve recipients; they are not re-derived from
/// `response` to keep this function usable for hello/sync responses that
/// carry no `msg_type`. See [`resolve_recipients`] for what `exclude_id`
/// must be when the response is a hello rather than a plain post.
#[allow(clippy::too_many_arguments)]
pub fn send(
    registry: &Registry,
    db: &DbGateway,
    push_queue: &PushSender,
    cipher: &dyn FrameCipher,
    to_id: i64,
    exclude_id: i64,
    is_group: bool,
    with_push: bool,
    msg_type: &MsgType,
    raw_msg: &str,
    response: &Response,
) -> Result<(), betterfly_db::DbError> {
    let recipients = resolve_recipients(registry, db, to_id, is_group, exclude_id)?;

    // Broadcast never pushes, even when the caller asked for it (`spec.md` §4.9).
    let with_push = with_push && !(is_group && to_id == -1);

    for user_id in recipients {
        if with_push {
            let (sender_name, _avatar) = db.query_user(exclude_id)?;
            let body = push_preview(msg_type, raw_msg);
            for device_token in db.query_user_apns_tokens(user_id)? {
                let _ = push_queue.send(Some(PushTask {
                    device_token,
                    display_name: sender_name.clone(),
                    body: body.clone(),
                    recipient_user_id: user_id,
                }));
            }
        }

        match registry.lookup_by_user(user_id) {
            Some(entry) => {
                if let Err(e) = entry.send_response(response, cipher) {
                    warn!(user_id, error = %e, "failed writing frame to recipient, leaving disconnect to the reactor");
                }
            }
            None => {
                // Absent: already persisted (caller's job), push already queued above.
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_uses_fixed_literals_for_media() {
        assert_eq!(push_preview(&MsgType::File, "ignored"), "[文件]");
        assert_eq!(push_preview(&MsgType::Gif, "ignored"), "[表情符号]");
        assert_eq!(push_preview(&MsgType::Image, "ignored"), "[图片]");
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "x".repeat(31);
        assert_eq!(push_preview(&MsgType::Text, &long), "您有一条新消息");
    }

    #[test]
    fn preview_keeps_short_text() {
        assert_eq!(push_preview(&MsgType::Text, "hi"), "hi");
    }
}
