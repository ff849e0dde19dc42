//! Dispatcher (`spec.md` C9): one handler per request kind, run inside the
//! dispatch pool against an already-authenticated connection.

use std::io::Read;

use chrono::Utc;
use mio::Token;
use tracing::{info, warn};

use betterfly_db::DbGateway;
use betterfly_proto::{FileOperation, FrameCipher, Request, Response};
use betterfly_storage::ObjectStoreGateway;

use crate::error::CoreError;
use crate::fanout;
use crate::queues::{DisconnectSender, PushSender};
use crate::registry::Registry;

/// Whether the caller should keep reading more frames from this batch.
/// `spec.md` §4.8: an Exit frame stops processing the remaining frames in
/// the same batch.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    StopBatch,
}

pub struct Dispatcher<'a> {
    pub registry: &'a Registry,
    pub db: &'a DbGateway,
    pub storage: &'a ObjectStoreGateway,
    pub push_queue: &'a PushSender,
    pub disconnect_queue: &'a DisconnectSender,
    pub cipher: &'a dyn FrameCipher,
}

impl<'a> Dispatcher<'a> {
    fn reply(&self, user_id: i64, response: &Response) {
        if let Some(entry) = self.registry.lookup_by_user(user_id) {
            if let Err(e) = entry.send_response(response, self.cipher) {
                warn!(user_id, error = %e, "failed writing reply");
            }
        }
    }

    pub fn handle(&self, from_user_id: i64, request: Request) -> Result<DispatchOutcome, CoreError> {
        match request {
            Request::Exit { .. } => {
                let token = self.registry.lookup_by_user(from_user_id).map(|e| e.token);
                if let Some(token) = token {
                    let _ = self.disconnect_queue.send(Some((token, false)));
                }
                return Ok(DispatchOutcome::StopBatch);
            }

            Request::Post { from_id, to_id, msg, msg_type, is_group, .. } => {
                let timestamp = Utc::now().naive_utc();
                self.db.insert_message(from_id, to_id, timestamp, &msg, &msg_type, is_group)?;
                let response = Response::post(from_id, to_id, timestamp, msg.clone(), msg_type.clone(), is_group);

                if is_group {
                    fanout::send(
                        self.registry, self.db, self.push_queue, self.cipher,
                        to_id, from_id, true, true, &msg_type, &msg, &response,
                    )?;
                } else {
                    self.reply(from_id, &response);
                    if to_id != from_id {
                        fanout::send(
                            self.registry, self.db, self.push_queue, self.cipher,
                            to_id, from_id, false, true, &msg_type, &msg, &response,
                        )?;
                    }
                }
            }

            Request::QueryUser { to_id, .. } => {
                let (name, avatar) = self.db.query_user(to_id)?;
                let response = Response::user_info(to_id, format!("{name}.{avatar}"));
                self.reply(from_user_id, &response);
            }

            Request::InsertContact { from_id, to_id } => {
                self.db.insert_contact(from_id, to_id)?;
                let (name, avatar) = self.db.query_user(from_id)?;
                let timestamp = Utc::now().naive_utc();
                self.db.insert_message(from_id, to_id, timestamp, "Hello", &betterfly_proto::MsgType::Text, false)?;
                let hello = Response::hello(from_id, to_id, format!("{name}.{avatar}"), false, "Hello");
                self.reply(from_id, &hello);
                self.reply(to_id, &hello);
            }

            Request::QueryGroup { to_id, msg, .. } => {
                let during_add = !msg.is_empty();
                let (name, avatar) = self.db.query_group(to_id)?;
                let response = Response::group_info(to_id, format!("{name}.{avatar}"), during_add);
                self.reply(from_user_id, &response);
            }

            Request::InsertGroup { from_id, to_id, msg } => {
                self.db.insert_group(to_id, &msg)?;
                self.db.insert_group_user(to_id, from_id)?;
                let timestamp = Utc::now().naive_utc();
                self.db.insert_message(0, to_id, timestamp, &msg, &betterfly_proto::MsgType::Text, true)?;
                let hello = Response::hello(0, to_id, "", true, msg);
                // This hello is attributed to `from = 0` (group-creation is a system
                // event, not authored by the creator), so recipients are resolved
                // excluding user 0, not the creator. The creator is a group member
                // and must receive it (`spec.md` §8 scenario 3).
                fanout::send(
                    self.registry, self.db, self.push_queue, self.cipher,
                    to_id, 0, true, false, &betterfly_proto::MsgType::Text, "", &hello,
                )?;
            }

            Request::InsertGroupUser { from_id, to_id } => {
                self.db.insert_group_user(to_id, from_id)?;
                let timestamp = Utc::now().naive_utc();
                self.db.insert_message(from_id, to_id, timestamp, "Hi", &betterfly_proto::MsgType::Text, true)?;
                let hello = Response::hello(from_id, to_id, "", true, "Hi");
                fanout::send(
                    self.registry, self.db, self.push_queue, self.cipher,
                    to_id, from_id, true, false, &betterfly_proto::MsgType::Text, "", &hello,
                )?;
            }

            Request::File { from_id, file_hash, file_suffix, operation } => {
                let exists = self.db.query_file(&file_hash, &file_suffix)?;
                let file_name = format!("{file_hash}.{file_suffix}");
                let response = match operation {
                    FileOperation::Upload => {
                        if !exists {
                            let url = self
                                .storage
                                .presigned_upload(&file_name)
                                .map_err(|e| CoreError::Transient(e.to_string()))?;
                            self.db.insert_file(&file_hash, &file_suffix)?;
                            Response::upload(file_name, url)
                        } else {
                            Response::upload(file_name, "Existed")
                        }
                    }
                    FileOperation::Download => {
                        if exists {
                            let url = self
                                .storage
                                .presigned_download(&file_name)
                                .map_err(|e| CoreError::Transient(e.to_string()))?;
                            Response::download(file_name, url)
                        } else {
                            Response::download(file_name, "Not Exist")
                        }
                    }
                };
                self.reply(from_id, &response);
            }

            Request::ApnsToken { from_id, apns_token } => {
                self.db.insert_user_apns_token(from_id, &apns_token)?;
            }

            Request::UpdateAvatar { from_id, to_id, is_group, avatar } => {
                if is_group {
                    self.db.update_group_avatar(to_id, &avatar)?;
                    let (name, new_avatar) = self.db.query_group(to_id)?;
                    let response = Response::group_info(to_id, format!("{name}.{new_avatar}"), false);
                    fanout::send(
                        self.registry, self.db, self.push_queue, self.cipher,
                        to_id, from_id, true, false, &betterfly_proto::MsgType::Text, "", &response,
                    )?;
                } else {
                    self.db.update_user_avatar(from_id, &avatar)?;
                    let (name, new_avatar) = self.db.query_user(from_id)?;
                    let response = Response::user_info(from_id, format!("{name}.{new_avatar}"));
                    self.reply(from_id, &response);
                }
            }

            Request::Key => {
                info!("received reserved Key frame, ignoring");
            }

            Request::Login { .. } => {
                // Only reachable if a second Login arrives post-authentication;
                // `spec.md` doesn't define re-login, so treat it like an unknown kind.
                warn!(from_user_id, "ignoring Login received outside staging");
            }
        }

        Ok(DispatchOutcome::Continue)
    }

    /// `handleData(fd)` (`spec.md` §4.6, §4.8): read one batch from the
    /// authenticated socket at `token`, decode it into frames, and run each
    /// through [`Dispatcher::handle`] in order. Unknown request kinds are
    /// logged and skipped rather than failing the batch.
    pub fn handle_data(&self, token: Token, cipher: &dyn FrameCipher) -> Result<(), CoreError> {
        let Some(user_id) = self.registry.lookup_by_fd(token) else {
            return Err(CoreError::Fatal("handleData called for unknown fd".into()));
        };
        let Some(entry) = self.registry.lookup_by_user(user_id) else {
            return Err(CoreError::Fatal("handleData called for fd with no session entry".into()));
        };

        let mut buf = [0u8; 40960];
        let n = {
            let mut stream = entry.stream.lock().expect("session stream mutex poisoned");
            match stream.read(&mut buf) {
                Ok(0) => return Err(CoreError::PeerClosed),
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(CoreError::PeerError(e)),
            }
        };
        *entry.last_seen.lock().expect("last_seen mutex poisoned") = Utc::now().naive_utc();

        let frames = betterfly_proto::decode_frames(&buf[..n], cipher)?;

        for text in frames {
            let request = match betterfly_proto::parse_request(&text) {
                Ok(r) => r,
                Err(e) => {
                    warn!(user_id, error = %e, "skipping unparseable frame");
                    continue;
                }
            };
            if self.handle(user_id, request)? == DispatchOutcome::StopBatch {
                break;
            }
        }

        Ok(())
    }
}
