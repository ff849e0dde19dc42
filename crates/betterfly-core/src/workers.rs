//! Connection lifecycle workers (`spec.md` C8): three dedicated
//! single-consumer threads for `initialize_queue`, `disconnect_queue`, and
//! `push_queue`.

use std::io::Read;

use mio::Token;
use tracing::{info, warn};

use betterfly_db::DbGateway;
use betterfly_proto::{FrameCipher, Request, Response};
use betterfly_push::{PushClient, PushOutcome};

use crate::queues::{DisconnectReceiver, DisconnectSender, InitReceiver, PushReceiver};
use crate::registry::{DroppedEntry, Registry};
use crate::sync::sync_offline_messages;

type FrameCipherBox = std::sync::Arc<dyn FrameCipher>;

/// Reads once from `token`'s staged socket, accepts the first Login frame
/// in the batch, and either promotes the session or enqueues a
/// (non-abnormal) disconnect (`spec.md` §4.7).
pub fn initialize_worker(
    rx: InitReceiver,
    registry: &Registry,
    db: &DbGateway,
    cipher: &FrameCipherBox,
    disconnect_queue: &DisconnectSender,
) {
    while let Ok(Some(token)) = rx.recv() {
        if let Err(reason) = initialize_one(token, registry, db, cipher) {
            warn!(?token, %reason, "rejecting unauthenticated connection");
            let _ = disconnect_queue.send(Some((token, false)));
        }
    }
    info!("initialize worker shutting down");
}

fn initialize_one(
    token: Token,
    registry: &Registry,
    db: &DbGateway,
    cipher: &FrameCipherBox,
) -> Result<(), String> {
    let mut buf = [0u8; 40960];
    let read_result = registry.with_staged_stream(token, |stream| stream.read(&mut buf));
    let n = match read_result {
        None => return Err("fileno not found among staged clients".into()),
        Some(Ok(0)) => return Err("peer closed before login".into()),
        Some(Ok(n)) => n,
        Some(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
        Some(Err(e)) => return Err(e.to_string()),
    };

    let frames = betterfly_proto::decode_frames(&buf[..n], cipher.as_ref())
        .map_err(|e| e.to_string())?;

    for text in frames {
        let request = betterfly_proto::parse_request(&text).map_err(|e| e.to_string())?;
        if let Request::Login { from_id, name, timestamp, .. } = request {
            if from_id == 0 {
                return Err("empty user id in login frame".into());
            }
            // The user_id floor check lives in `db.login`; run it before any
            // promotion or Welcome so a rejected id behaves exactly like a
            // missing Login frame (normal disconnect, nothing sent).
            db.login(from_id, &name, timestamp).map_err(|e| e.to_string())?;

            match registry.promote(token, from_id, name.clone()) {
                crate::registry::PromoteOutcome::Ok => {
                    let welcome = Response::server(format!("Welcome to Betterfly, {name}!"));
                    if let Some(entry) = registry.lookup_by_user(from_id) {
                        let _ = entry.send_response(&welcome, cipher.as_ref());
                    }
                    sync_offline_messages(db, registry, cipher.as_ref(), from_id, timestamp)
                        .map_err(|e| e.to_string())?;
                    return Ok(());
                }
                crate::registry::PromoteOutcome::Duplicate => {
                    return Err(format!("user {from_id} already has a live session"));
                }
            }
        }
    }

    Err("no Login frame in batch".into())
}

/// Closes `fileno`'s connection, optionally with a Goodbye frame
/// (`spec.md` §4.7, §7).
pub fn disconnect_worker(rx: DisconnectReceiver, registry: &Registry, cipher: &FrameCipherBox) {
    while let Ok(Some((token, abnormal))) = rx.recv() {
        match registry.drop_by_fd(token) {
            Some(DroppedEntry::Authenticated(entry)) => {
                if !abnormal {
                    let goodbye = Response::server("Goodbye!");
                    let _ = entry.send_response(&goodbye, cipher.as_ref());
                }
                info!(user_id = entry.user_id, abnormal, "connection closed");
            }
            Some(DroppedEntry::Staged(_)) => {
                info!(?token, abnormal, "staged connection closed");
            }
            None => {
                // Already removed by a prior disconnect for the same fd.
            }
        }
    }
    info!("disconnect worker shutting down");
}

/// Sends one APNs notification per task; purges the token on
/// `InvalidToken` (`spec.md` §4.7, §8).
pub fn push_worker(rx: PushReceiver, push: &PushClient, db: &DbGateway) {
    while let Ok(Some(task)) = rx.recv() {
        match push.send_notification(&task.device_token, &task.display_name, &task.body) {
            Ok(PushOutcome::Ok) => {}
            Ok(PushOutcome::InvalidToken) => {
                if let Err(e) = db.delete_user_apns_token(task.recipient_user_id, &task.device_token) {
                    warn!(error = %e, "failed to purge invalid APNs token");
                }
            }
            Ok(PushOutcome::Transient) => {
                warn!(recipient = task.recipient_user_id, "transient APNs failure, dropping notification");
            }
            Err(e) => {
                warn!(error = %e, "push gateway error");
            }
        }
    }
    info!("push worker shutting down");
}
