//! Readiness-driven receive server
//!
//! One thread owns the poller, the listening socket, every client socket and
//! every open output file. The only place it ever blocks is `Poll::poll`;
//! each ready descriptor is serviced until it would block, completes, or
//! fails, and a failure only ever tears down the connection that raised it.
//!
//! Known limitation: there is no idle timeout, so a peer that stops sending
//! holds its socket and output file until it disconnects or the server stops.

use anyhow::{Context, Result};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::connection::{Connection, Step};
use crate::error::TransferError;
use crate::finalize::finalize;
use crate::protocol::tokens;
use crate::receipt::ReceiptLog;

const LISTENER: Token = Token(tokens::LISTENER);
const WAKER: Token = Token(tokens::WAKER);
const EVENTS_CAPACITY: usize = 1024;

/// Stops a running [`Server`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        self.flag.store(true, Ordering::SeqCst);
        self.waker.wake()
    }
}

pub struct Server {
    config: Config,
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    stop: Arc<AtomicBool>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    receipts: ReceiptLog,
    scratch: Vec<u8>,
}

impl Server {
    /// Validate the config, create the target directory and start listening.
    ///
    /// Failures here are fatal: there is no partially started server.
    pub fn bind(config: Config) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!(
                "Failed to create target directory: {}",
                config.directory.display()
            )
        })?;

        let addr = config.bind_addr()?;
        let mut listener = TcpListener::bind(addr).with_context(|| format!("bind {}", addr))?;
        let poll = Poll::new().context("Failed to create poller")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("Failed to register listener")?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER).context("Failed to create waker")?);

        Ok(Self {
            receipts: ReceiptLog::new(&config.directory),
            scratch: vec![0u8; config.chunk_size],
            config,
            poll,
            listener,
            waker,
            stop: Arc::new(AtomicBool::new(false)),
            connections: HashMap::new(),
            next_token: tokens::CONNECTION_START,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: self.stop.clone(),
            waker: self.waker.clone(),
        }
    }

    /// Run the event loop until a [`ShutdownHandle`] stops it.
    pub fn run(&mut self) -> Result<()> {
        let local_addr = self.local_addr()?;
        info!(%local_addr, directory = %self.config.directory.display(), "Server listening");

        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        while !self.stop.load(Ordering::SeqCst) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                self.close_all();
                return Err(e).context("readiness wait failed");
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_connections(),
                    WAKER => trace!("woken"),
                    token => self.service(token),
                }
            }
        }

        self.close_all();
        info!(%local_addr, "Server stopped");
        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(err) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        error!(%peer, ?err, "Failed to register connection");
                        continue;
                    }
                    info!(token = token.0, %peer, "Connection accepted");
                    self.connections.insert(
                        token,
                        Connection::new(stream, peer, self.config.metadata_width),
                    );
                }
                Err(err) => match err.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset => {
                        warn!(?err, "Transient accept error");
                        continue;
                    }
                    _ => {
                        error!(?err, "Error accepting connection");
                        break;
                    }
                },
            }
        }
    }

    fn service(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            trace!(token = token.0, "event for closed connection");
            return;
        };

        match conn.advance(&self.config.directory, &mut self.scratch) {
            Ok(Step::Pending) => {}
            Ok(Step::Complete) => {
                if let Some(conn) = self.close_connection(token) {
                    self.finish(token, conn);
                }
            }
            Err(err @ TransferError::PrematureDisconnect { .. }) => {
                warn!(
                    token = token.0,
                    peer = %conn.peer(),
                    file = conn.filename().unwrap_or("-"),
                    received = conn.received(),
                    size = conn.declared_size().unwrap_or(0),
                    %err,
                    "Peer disconnected before transfer completed"
                );
                self.close_connection(token);
            }
            Err(err) => {
                error!(
                    token = token.0,
                    peer = %conn.peer(),
                    file = conn.filename().unwrap_or("-"),
                    %err,
                    "Transfer failed"
                );
                self.close_connection(token);
            }
        }
    }

    fn finish(&self, token: Token, conn: Connection) {
        let peer = conn.peer();
        let Some(output) = conn.into_output() else {
            return;
        };
        let size = output.size;
        match finalize(output, &self.receipts) {
            Ok(filename) => {
                info!(token = token.0, %peer, file = %filename, size, "File received and saved")
            }
            Err(err) => error!(token = token.0, %peer, %err, "Failed to record receipt"),
        }
    }

    /// Remove a connection from the table and the poller. The caller owns what
    /// is returned; dropping it closes the output file and the socket. A token
    /// that is already gone is a no-op.
    fn close_connection(&mut self, token: Token) -> Option<Connection> {
        let mut conn = self.connections.remove(&token)?;
        if let Err(err) = self.poll.registry().deregister(conn.stream_mut()) {
            warn!(token = token.0, ?err, "Failed to deregister connection");
        }
        debug!(token = token.0, peer = %conn.peer(), "Connection closed");
        Some(conn)
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            if let Some(conn) = self.close_connection(token) {
                if let Some(name) = conn.filename() {
                    warn!(
                        token = token.0,
                        file = name,
                        received = conn.received(),
                        "Dropping incomplete transfer on shutdown"
                    );
                }
            }
        }
    }
}

/// Bind according to `config` and serve until stopped.
pub fn serve(config: Config) -> Result<()> {
    Server::bind(config)?.run()
}

/// Serve `directory` on `host:port` with default framing parameters.
pub fn start(directory: &Path, host: &str, port: u16) -> Result<()> {
    serve(Config::new(directory, host, port))
}
