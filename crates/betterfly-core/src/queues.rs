//! The three FIFO queues (`spec.md` §3, §4.7): `initialize_queue`,
//! `disconnect_queue`, `push_queue`. Each is multi-producer single-consumer
//! and shuts its worker down on a `None` sentinel, mirroring the
//! reference's `Queue.put(None)` convention.

use std::sync::mpsc::{self, Receiver, Sender};

use mio::Token;

pub type InitSender = Sender<Option<Token>>;
pub type InitReceiver = Receiver<Option<Token>>;

pub type DisconnectSender = Sender<Option<(Token, bool)>>;
pub type DisconnectReceiver = Receiver<Option<(Token, bool)>>;

/// `(device_token, display_name, body, recipient_user_id)`.
#[derive(Debug, Clone)]
pub struct PushTask {
    pub device_token: String,
    pub display_name: String,
    pub body: String,
    pub recipient_user_id: i64,
}

pub type PushSender = Sender<Option<PushTask>>;
pub type PushReceiver = Receiver<Option<PushTask>>;

pub fn initialize_queue() -> (InitSender, InitReceiver) {
    mpsc::channel()
}

pub fn disconnect_queue() -> (DisconnectSender, DisconnectReceiver) {
    mpsc::channel()
}

pub fn push_queue() -> (PushSender, PushReceiver) {
    mpsc::channel()
}
