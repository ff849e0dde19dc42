//! Reactor (`spec.md` C7): the single thread owning the readiness
//! multiplexer. It never performs I/O against a client socket itself — it
//! only accepts, classifies, and routes to a queue or the dispatch pool.

use std::io;
use std::net::SocketAddr;
use std::sync::mpsc::Sender;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use tracing::{error, info, warn};

use crate::queues::{DisconnectSender, InitSender};
use crate::registry::Registry;

const LISTENER_TOKEN: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    next_token: usize,
}

impl Reactor {
    pub fn bind(addr: SocketAddr) -> io::Result<Reactor> {
        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        Ok(Reactor {
            poll,
            listener,
            // Token 0 is reserved for the listener.
            next_token: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Runs the readiness loop until `shutdown` is observed. `dispatch_tx`
    /// hands readable, already-authenticated descriptors to the dispatch
    /// pool; `initialize_tx`/`disconnect_tx` feed the two lifecycle workers.
    pub fn run(
        &mut self,
        registry: &Registry,
        dispatch_tx: &Sender<Token>,
        initialize_tx: &InitSender,
        disconnect_tx: &DisconnectSender,
        shutdown: &std::sync::atomic::AtomicBool,
    ) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        info!("reactor started");

        while !shutdown.load(std::sync::atomic::Ordering::Relaxed) {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in events.iter() {
                let token = event.token();

                if token == LISTENER_TOKEN {
                    self.accept_all(registry);
                    continue;
                }

                if event.is_error() || (event.is_read_closed() && !event.is_readable()) {
                    let _ = disconnect_tx.send(Some((token, true)));
                    continue;
                }

                if event.is_readable() {
                    if registry.lookup_by_fd(token).is_some() {
                        if dispatch_tx.send(token).is_err() {
                            error!(?token, "dispatch pool channel closed");
                        }
                    } else if registry.is_staged(token) {
                        let _ = initialize_tx.send(Some(token));
                    } else {
                        warn!(?token, "readiness event for unknown token, ignoring");
                    }
                }
            }
        }

        info!("reactor shutting down");
        Ok(())
    }

    fn accept_all(&mut self, registry: &Registry) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer_addr)) => {
                    let token = self.next_token();
                    if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
                        error!(error = %e, "failed to register new connection");
                        continue;
                    }
                    registry.stage(token, stream, peer_addr);
                    info!(%peer_addr, ?token, "accepted connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "error accepting new connection");
                    break;
                }
            }
        }
    }
}
