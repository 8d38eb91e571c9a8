use anyhow::Context;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::gateway::{Application, BaseEnvironment, GatewayError, invoke};
use crate::http::connection::{Connection, ConnectionError, Phase, Watch};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT: usize = 2;

const EVENT_CAPACITY: usize = 1024;

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Requests shutdown and wakes the reactor out of its readiness wait.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake reactor; it will stop on the next poll timeout");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An accepted socket and its state machine.
struct Client {
    stream: TcpStream,
    peer: SocketAddr,
    conn: Connection,
    /// Readiness currently registered with the poller
    watch: Watch,
}

/// Single-threaded readiness-driven HTTP front end.
///
/// Every accepted connection serves exactly one request: it is read,
/// dispatched to the application inline, answered, and closed. The
/// application runs on the reactor thread, so a slow application stalls
/// every other connection.
pub struct Server<A> {
    poll: Poll,
    listener: TcpListener,
    clients: HashMap<Token, Client>,
    next_token: usize,
    base: BaseEnvironment,
    app: A,
    scratch: Vec<u8>,
    poll_timeout: Duration,
    max_head_bytes: usize,
    /// Set when `accept` stopped on an error other than `WouldBlock`; the
    /// backlog is retried on the next loop turn since no new edge will come.
    accept_pending: bool,
    shutdown: ShutdownHandle,
}

impl<A: Application> Server<A> {
    /// Binds the listening socket and registers it for accept-readiness.
    pub fn bind(cfg: &Config, app: A) -> anyhow::Result<Self> {
        cfg.validate()?;
        let addr = cfg
            .listen_addr()
            .to_socket_addrs()
            .with_context(|| format!("invalid listen address {}", cfg.listen_addr()))?
            .next()
            .with_context(|| format!("{} did not resolve to an address", cfg.listen_addr()))?;

        let mut listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        let local = listener.local_addr()?;
        info!("Listening on {}", local);

        Ok(Self {
            poll,
            listener,
            clients: HashMap::new(),
            next_token: FIRST_CLIENT,
            base: BaseEnvironment::from_config(cfg).with_port(local.port()),
            app,
            scratch: vec![0; cfg.read_chunk],
            poll_timeout: cfg.poll_timeout(),
            max_head_bytes: cfg.max_head_bytes,
            accept_pending: false,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
                waker,
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Runs the event loop until shutdown is requested.
    pub fn run(mut self) -> anyhow::Result<()> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);

        while !self.shutdown.is_shutdown() {
            if let Err(e) = self.poll.poll(&mut events, Some(self.poll_timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e).context("readiness wait failed");
            }

            self.retry_accept();

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => {}
                    token => self.service(token, event),
                }
            }
        }

        info!(open = self.clients.len(), "Shutting down");
        let tokens: Vec<Token> = self.clients.keys().copied().collect();
        for token in tokens {
            self.release(token);
        }
        self.poll.registry().deregister(&mut self.listener)?;
        Ok(())
    }

    /// Accepts every pending connection and registers it for reads.
    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(%peer, error = %e, "Failed to register connection");
                        continue;
                    }

                    debug!(conn = token.0, %peer, "Accepted connection");
                    self.clients.insert(
                        token,
                        Client {
                            stream,
                            peer,
                            conn: Connection::new(self.max_head_bytes),
                            watch: Watch::Read,
                        },
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.accept_pending = false;
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept failed; retrying on the next tick");
                    self.accept_pending = true;
                    return;
                }
            }
        }
    }

    /// Drains a backlog left behind by a failed `accept`.
    fn retry_accept(&mut self) {
        if self.accept_pending {
            self.accept();
        }
    }

    /// Routes one readiness event through the connection's state machine.
    fn service(&mut self, token: Token, event: &Event) {
        let Some(client) = self.clients.get_mut(&token) else {
            return;
        };

        if event.is_readable() && client.conn.phase().is_reading() {
            if let Err(e) = client.conn.pump(&mut client.stream, &mut self.scratch) {
                log_failure(token, client.peer, &e);
            }
        }

        if client.conn.phase() == Phase::ReadyToDispatch {
            dispatch(&self.app, &self.base, token, client);
        }

        if event.is_writable() && client.conn.phase() == Phase::WritingResponse {
            if let Err(e) = client.conn.flush(&mut client.stream) {
                log_failure(token, client.peer, &e);
            }
        }

        if client.conn.phase() != Phase::Closing && (event.is_error() || event.is_write_closed()) {
            debug!(conn = token.0, peer = %client.peer, "Connection hung up");
            client.conn.close();
        }

        if client.conn.phase() == Phase::Closing {
            self.release(token);
            return;
        }

        if let Err(e) = sync_interest(self.poll.registry(), token, client) {
            warn!(conn = token.0, error = %e, "Failed to update readiness interest");
            self.release(token);
        }
    }

    /// Deregisters, shuts down and drops a connection.
    fn release(&mut self, token: Token) {
        let Some(mut client) = self.clients.remove(&token) else {
            return;
        };

        if client.watch != Watch::None {
            if let Err(e) = self.poll.registry().deregister(&mut client.stream) {
                trace!(conn = token.0, error = %e, "deregister failed");
            }
        }
        if let Err(e) = client.stream.shutdown(Shutdown::Both) {
            trace!(conn = token.0, error = %e, "shutdown failed");
        }

        debug!(conn = token.0, peer = %client.peer, "Closed connection");
    }
}

/// Runs the application for a connection that has a complete request.
fn dispatch<A: Application>(app: &A, base: &BaseEnvironment, token: Token, client: &mut Client) {
    let Some(environ) = client.conn.prepare_dispatch(base) else {
        return;
    };

    match invoke(app, environ) {
        Ok(response) => {
            info!(
                conn = token.0,
                method = %environ.method,
                path = %environ.path,
                bytes = response.len(),
                "Request dispatched"
            );
            client.conn.respond(response);
        }
        Err(e) => {
            match e.downcast_ref::<GatewayError>() {
                Some(violation) => warn!(
                    conn = token.0,
                    method = %environ.method,
                    path = %environ.path,
                    error = %violation,
                    "Application violated the response protocol"
                ),
                None => warn!(
                    conn = token.0,
                    method = %environ.method,
                    path = %environ.path,
                    error = %e,
                    "Application failed"
                ),
            }
            client.conn.close();
        }
    }
}

/// Switches the registered readiness to what the current phase needs, so a
/// connection never holds more than one interest at a time.
fn sync_interest(registry: &Registry, token: Token, client: &mut Client) -> io::Result<()> {
    let wanted = client.conn.phase().watch();
    if wanted == client.watch {
        return Ok(());
    }

    match wanted {
        Watch::Read => registry.reregister(&mut client.stream, token, Interest::READABLE)?,
        Watch::Write => registry.reregister(&mut client.stream, token, Interest::WRITABLE)?,
        Watch::None => registry.deregister(&mut client.stream)?,
    }
    trace!(conn = token.0, from = ?client.watch, to = ?wanted, "Readiness interest changed");
    client.watch = wanted;
    Ok(())
}

fn log_failure(token: Token, peer: SocketAddr, err: &ConnectionError) {
    match err {
        // Peer going away mid-exchange is a normal termination.
        ConnectionError::Io(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::WriteZero
            ) =>
        {
            debug!(conn = token.0, %peer, error = %e, "Peer disconnected");
        }
        ConnectionError::MissingContentLength { .. } => {
            debug!(conn = token.0, %peer, error = %err, "Rejected request");
        }
        _ => warn!(conn = token.0, %peer, error = %err, "Connection error"),
    }
}
