//! Session registry (`spec.md` C3, §9 "back-references").
//!
//! Entries are owned once, in an `Arc`, and reached through either of two
//! indices (`authenticated[user_id]`, `fd_to_user[token]`) rather than
//! duplicated or referenced by raw pointer. `staged[token]` holds
//! connections that have not yet sent a Login. A token lives in exactly
//! one of {staged, authenticated} at a time.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Mutex, RwLock};

use chrono::NaiveDateTime;
use mio::net::TcpStream;
use mio::Token;

/// An authenticated client session. Cheap to clone (it's an `Arc` in the
/// registry) and borrowed only transiently by fan-out — nothing caches it
/// across a send.
pub struct SessionEntry {
    pub user_id: i64,
    pub name: String,
    pub token: Token,
    pub peer_addr: SocketAddr,
    pub stream: Mutex<TcpStream>,
    pub last_seen: Mutex<NaiveDateTime>,
}

impl SessionEntry {
    /// Write one already-encoded frame to this session's socket. Per
    /// `spec.md` §5, writes are kept short and blocking; a write error
    /// here is the caller's cue to enqueue an abnormal disconnect.
    pub fn send_frame(&self, wire: &[u8]) -> std::io::Result<()> {
        self.stream.lock().expect("session stream mutex poisoned").write_all(wire)
    }

    /// Serialises `response` and runs it through `cipher` before writing.
    /// Every outbound response must go through this (or `send_frame` with
    /// an already-`encode_frame`d buffer) so that an installed cipher
    /// applies symmetrically to both directions of the connection.
    pub fn send_response(
        &self,
        response: &betterfly_proto::Response,
        cipher: &dyn betterfly_proto::FrameCipher,
    ) -> std::io::Result<()> {
        let wire = betterfly_proto::encode_frame(&response.to_json_string(), cipher);
        self.send_frame(&wire)
    }
}

/// A connection that has not yet completed Login.
pub struct StagedEntry {
    pub token: Token,
    pub peer_addr: SocketAddr,
    pub stream: Mutex<TcpStream>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PromoteOutcome {
    Ok,
    /// `spec.md` §9 open question: the reference lets a second concurrent
    /// Login for the same user id silently orphan the first socket. This
    /// implementation instead rejects the second Login while the first
    /// session is still live — see `DESIGN.md`.
    Duplicate,
}

pub enum DroppedEntry {
    Staged(StagedEntry),
    Authenticated(std::sync::Arc<SessionEntry>),
}

#[derive(Default)]
struct Inner {
    authenticated: HashMap<i64, std::sync::Arc<SessionEntry>>,
    fd_to_user: HashMap<Token, i64>,
    staged: HashMap<Token, StagedEntry>,
}

/// The registry's three indices, guarded by one lock. Mutations happen
/// only on the initialize and disconnect workers (`spec.md` §5); dispatch
/// handlers and fan-out only read.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn stage(&self, token: Token, stream: TcpStream, peer_addr: SocketAddr) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.staged.insert(
            token,
            StagedEntry {
                token,
                peer_addr,
                stream: Mutex::new(stream),
            },
        );
    }

    /// Moves a staged connection into the authenticated registry. Returns
    /// `Duplicate` without mutating anything if `user_id` already has a
    /// live session under a different token.
    pub fn promote(&self, token: Token, user_id: i64, name: String) -> PromoteOutcome {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.authenticated.contains_key(&user_id) {
            return PromoteOutcome::Duplicate;
        }
        let Some(staged) = inner.staged.remove(&token) else {
            return PromoteOutcome::Duplicate;
        };
        let entry = std::sync::Arc::new(SessionEntry {
            user_id,
            name,
            token,
            peer_addr: staged.peer_addr,
            stream: staged.stream,
            last_seen: Mutex::new(chrono::Utc::now().naive_utc()),
        });
        inner.authenticated.insert(user_id, entry);
        inner.fd_to_user.insert(token, user_id);
        PromoteOutcome::Ok
    }

    pub fn lookup_by_user(&self, user_id: i64) -> Option<std::sync::Arc<SessionEntry>> {
        self.inner.read().expect("registry lock poisoned").authenticated.get(&user_id).cloned()
    }

    pub fn lookup_by_fd(&self, token: Token) -> Option<i64> {
        self.inner.read().expect("registry lock poisoned").fd_to_user.get(&token).copied()
    }

    pub fn is_staged(&self, token: Token) -> bool {
        self.inner.read().expect("registry lock poisoned").staged.contains_key(&token)
    }

    /// Runs `f` against the staged socket for `token`, if it still exists.
    /// The registry's read lock is held for the duration, same as any
    /// other lookup; `f` should be a quick non-blocking `read`/`write`.
    pub fn with_staged_stream<F, R>(&self, token: Token, f: F) -> Option<R>
    where
        F: FnOnce(&mut TcpStream) -> R,
    {
        let inner = self.inner.read().expect("registry lock poisoned");
        let staged = inner.staged.get(&token)?;
        let mut stream = staged.stream.lock().expect("staged stream mutex poisoned");
        Some(f(&mut stream))
    }

    /// Removes whichever entry `token` refers to, if any. Calling this
    /// twice for the same token is a no-op the second time (`spec.md` §8
    /// "Disconnect idempotence").
    pub fn drop_by_fd(&self, token: Token) -> Option<DroppedEntry> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(staged) = inner.staged.remove(&token) {
            return Some(DroppedEntry::Staged(staged));
        }
        if let Some(user_id) = inner.fd_to_user.remove(&token) {
            if let Some(entry) = inner.authenticated.remove(&user_id) {
                return Some(DroppedEntry::Authenticated(entry));
            }
        }
        None
    }

    /// Snapshot of every authenticated session. Fan-out MUST iterate a
    /// snapshot rather than the live map, since a broadcast write can run
    /// concurrently with another session being dropped (`spec.md` §5).
    pub fn snapshot_authenticated(&self) -> Vec<std::sync::Arc<SessionEntry>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .authenticated
            .values()
            .cloned()
            .collect()
    }

    pub fn snapshot_staged(&self) -> Vec<Token> {
        self.inner.read().expect("registry lock poisoned").staged.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener as StdListener, TcpStream as StdStream};

    fn loopback_pair() -> (TcpStream, SocketAddr) {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdStream::connect(addr).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        server_side.set_nonblocking(true).unwrap();
        drop(client);
        (TcpStream::from_std(server_side), peer)
    }

    #[test]
    fn promote_moves_staged_to_authenticated() {
        let registry = Registry::new();
        let token = Token(1);
        let (stream, peer) = loopback_pair();
        registry.stage(token, stream, peer);

        assert!(registry.is_staged(token));
        assert_eq!(registry.promote(token, 1001, "Voltline".into()), PromoteOutcome::Ok);
        assert!(!registry.is_staged(token));
        assert_eq!(registry.lookup_by_fd(token), Some(1001));
        assert!(registry.lookup_by_user(1001).is_some());
    }

    #[test]
    fn second_concurrent_login_is_rejected() {
        let registry = Registry::new();
        let (stream_a, peer_a) = loopback_pair();
        let (stream_b, peer_b) = loopback_pair();
        let token_a = Token(1);
        let token_b = Token(2);
        registry.stage(token_a, stream_a, peer_a);
        registry.stage(token_b, stream_b, peer_b);

        assert_eq!(registry.promote(token_a, 1001, "A".into()), PromoteOutcome::Ok);
        assert_eq!(registry.promote(token_b, 1001, "A-again".into()), PromoteOutcome::Duplicate);
        assert!(registry.is_staged(token_b));
    }

    #[test]
    fn drop_by_fd_is_idempotent() {
        let registry = Registry::new();
        let token = Token(1);
        let (stream, peer) = loopback_pair();
        registry.stage(token, stream, peer);
        registry.promote(token, 1001, "Voltline".into());

        assert!(registry.drop_by_fd(token).is_some());
        assert!(registry.drop_by_fd(token).is_none());
    }

    #[test]
    fn snapshot_excludes_staged() {
        let registry = Registry::new();
        let (stream, peer) = loopback_pair();
        registry.stage(Token(1), stream, peer);
        assert!(registry.snapshot_authenticated().is_empty());
        assert_eq!(registry.snapshot_staged().len(), 1);
    }
}
