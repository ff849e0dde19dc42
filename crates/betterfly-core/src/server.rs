//! Wires the reactor, the three lifecycle workers, and the dispatch pool
//! into one runnable value (`spec.md` §9 "process-wide mutable state" —
//! the server is an explicit value, not a static singleton).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use mio::Token;
use tracing::info;

use betterfly_db::DbGateway;
use betterfly_proto::FrameCipher;
use betterfly_push::PushClient;
use betterfly_storage::ObjectStoreGateway;

use crate::dispatcher::Dispatcher;
use crate::queues::{self, DisconnectSender, InitSender, PushSender};
use crate::reactor::Reactor;
use crate::registry::Registry;
use crate::workers;

const DISPATCH_POOL_SIZE: usize = 16;

/// A handle a signal handler can use to ask a running [`Server::run`] to
/// stop. Cloning is cheap; every clone refers to the same flag.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

pub struct Server {
    registry: Registry,
    db: Arc<DbGateway>,
    storage: Arc<ObjectStoreGateway>,
    push: Arc<PushClient>,
    cipher: Arc<dyn FrameCipher>,
    listen_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn new(
        listen_addr: SocketAddr,
        db: DbGateway,
        storage: ObjectStoreGateway,
        push: PushClient,
        cipher: Arc<dyn FrameCipher>,
    ) -> Server {
        Server {
            registry: Registry::new(),
            db: Arc::new(db),
            storage: Arc::new(storage),
            push: Arc::new(push),
            cipher,
            listen_addr,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Blocks until `shutdown_handle().request_shutdown()` is called (or
    /// an unrecoverable bind/accept failure occurs). `spec.md` §5, §6.
    pub fn run(&self) -> std::io::Result<()> {
        let mut reactor = Reactor::bind(self.listen_addr)?;

        let (init_tx, init_rx) = queues::initialize_queue();
        let (disc_tx, disc_rx) = queues::disconnect_queue();
        let (push_tx, push_rx) = queues::push_queue();
        let (dispatch_tx, dispatch_rx) = std::sync::mpsc::channel::<Token>();
        let dispatch_rx = Arc::new(std::sync::Mutex::new(dispatch_rx));

        std::thread::scope(|scope| {
            scope.spawn(|| workers::initialize_worker(init_rx, &self.registry, &self.db, &self.cipher, &disc_tx));
            scope.spawn(|| workers::disconnect_worker(disc_rx, &self.registry, &self.cipher));
            scope.spawn(|| workers::push_worker(push_rx, &self.push, &self.db));

            for worker_id in 0..DISPATCH_POOL_SIZE {
                let dispatch_rx = dispatch_rx.clone();
                let disc_tx = disc_tx.clone();
                let push_tx = push_tx.clone();
                scope.spawn(move || self.dispatch_worker_loop(worker_id, dispatch_rx, &disc_tx, &push_tx));
            }

            let result = reactor.run(&self.registry, &dispatch_tx, &init_tx, &disc_tx, &self.shutdown);

            self.drain_queues(&init_tx, &disc_tx, &push_tx);
            result
        })
    }

    fn dispatch_worker_loop(
        &self,
        worker_id: usize,
        dispatch_rx: Arc<std::sync::Mutex<std::sync::mpsc::Receiver<Token>>>,
        disconnect_queue: &DisconnectSender,
        push_queue: &PushSender,
    ) {
        info!(worker_id, "dispatch worker started");
        loop {
            let token = {
                let rx = dispatch_rx.lock().expect("dispatch receiver mutex poisoned");
                match rx.recv() {
                    Ok(token) => token,
                    Err(_) => break,
                }
            };

            let dispatcher = Dispatcher {
                registry: &self.registry,
                db: &self.db,
                storage: &self.storage,
                push_queue,
                disconnect_queue,
                cipher: self.cipher.as_ref(),
            };

            if let Err(e) = dispatcher.handle_data(token, self.cipher.as_ref()) {
                self.handle_dispatch_error(token, e, disconnect_queue);
            }
        }
        info!(worker_id, "dispatch worker shutting down");
    }

    /// Propagation policy from `spec.md` §7.
    fn handle_dispatch_error(&self, token: Token, error: crate::error::CoreError, disconnect_queue: &DisconnectSender) {
        use crate::error::CoreError;
        match error {
            CoreError::PeerClosed | CoreError::PeerError(_) => {
                let _ = disconnect_queue.send(Some((token, true)));
            }
            CoreError::Fatal(reason) => {
                tracing::error!(?token, reason, "fatal dispatch error, disconnecting abnormally");
                let _ = disconnect_queue.send(Some((token, true)));
            }
            CoreError::Transient(reason) => {
                tracing::warn!(?token, reason, "transient failure, dropping this operation");
            }
            CoreError::MalformedFrame(reason) => {
                tracing::warn!(?token, reason, "malformed frame, dropping this operation");
            }
            CoreError::ProtocolViolation(reason) => {
                tracing::warn!(?token, reason, "protocol violation on authenticated connection");
                let _ = disconnect_queue.send(Some((token, false)));
            }
        }
    }

    fn drain_queues(&self, init_tx: &InitSender, disc_tx: &DisconnectSender, push_tx: &PushSender) {
        let _ = init_tx.send(None);
        let _ = disc_tx.send(None);
        let _ = push_tx.send(None);
    }
}
