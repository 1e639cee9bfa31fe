//! Connection Handler
//!
//! Serves one client connection against a `KvStore`.
//!
//! A connection does not own a worker thread. Workers call [`Connection::poll`]
//! to see whether a command has started arriving, serve exactly one command
//! with [`Connection::serve_one`], and hand the connection back to the queue.
//!
//! Commands run under a fresh `Context::background()` on the server. The
//! client's deadline and cancellation bound its own round trip only; they
//! are not carried over the wire.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::protocol::{read_command, write_response, Command, Reply, Response};
use crate::store::KvStore;

/// What a connection needs from its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A command has started arriving
    Ready,

    /// Nothing to read yet
    Idle,

    /// Peer gone, idle timeout reached or server stopping
    Closed,
}

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Store the commands run against
    store: Arc<dyn KvStore>,

    /// Set when the server is stopping
    shutdown: Arc<AtomicBool>,

    /// Close the connection after this long without a command
    idle_timeout: Option<Duration>,

    /// When the last command finished (or the connection opened)
    last_active: Instant,

    /// Peer address for logging
    peer_addr: String,
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Connection {
    /// Create a new connection handler
    pub fn new(
        stream: TcpStream,
        store: Arc<dyn KvStore>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        tracing::debug!("Connection established from {}", peer_addr);

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            store,
            shutdown,
            idle_timeout: None,
            last_active: Instant::now(),
            peer_addr,
        })
    }

    /// Configure connection timeouts (milliseconds, 0 = none)
    ///
    /// The read timeout applies once a command has started arriving.
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64, idle_ms: u64) -> Result<()> {
        self.idle_timeout = millis(idle_ms);
        self.reader.get_ref().set_read_timeout(millis(read_ms))?;
        self.writer.get_ref().set_write_timeout(millis(write_ms))?;
        Ok(())
    }

    /// Check without blocking whether a command is waiting
    ///
    /// Peeks instead of reading so no bytes of a frame are consumed.
    pub fn poll(&mut self) -> Result<Readiness> {
        if self.shutdown.load(Ordering::Relaxed) {
            tracing::debug!("Closing {} for shutdown", self.peer_addr);
            return Ok(Readiness::Closed);
        }
        if !self.reader.buffer().is_empty() {
            return Ok(Readiness::Ready);
        }

        let stream = self.reader.get_ref();
        stream.set_nonblocking(true)?;
        let peeked = stream.peek(&mut [0u8; 1]);
        stream.set_nonblocking(false)?;

        match peeked {
            Ok(0) => {
                tracing::debug!("Client {} disconnected", self.peer_addr);
                Ok(Readiness::Closed)
            }
            Ok(_) => Ok(Readiness::Ready),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                if matches!(self.idle_timeout, Some(limit) if self.last_active.elapsed() >= limit)
                {
                    tracing::debug!("Closing idle connection from {}", self.peer_addr);
                    return Ok(Readiness::Closed);
                }
                Ok(Readiness::Idle)
            }
            Err(ref e) if is_disconnect(e.kind()) => Ok(Readiness::Closed),
            Err(e) => Err(e.into()),
        }
    }

    /// Read, execute and answer one command
    ///
    /// Returns false when the connection should be closed.
    pub fn serve_one(&mut self) -> Result<bool> {
        let command = match read_command(&mut self.reader) {
            Ok(cmd) => cmd,
            Err(StoreError::Io(ref e)) if is_disconnect(e.kind()) => {
                tracing::debug!("Client {} disconnected", self.peer_addr);
                return Ok(false);
            }
            Err(StoreError::Io(ref e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                tracing::debug!("Read timeout for client {}", self.peer_addr);
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                // Send error response if possible
                let _ = write_response(&mut self.writer, &Response::error(&e.to_string()));
                return Err(e);
            }
        };

        tracing::trace!("Received command from {}: {:?}", self.peer_addr, command.command_type());

        let response = self.execute_command(command);

        if let Err(e) = write_response(&mut self.writer, &response) {
            if let StoreError::Io(ref io_err) = e {
                if is_disconnect(io_err.kind()) {
                    tracing::debug!(
                        "Client {} disconnected before response could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(false);
                }
            }
            tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
            return Err(e);
        }

        self.last_active = Instant::now();
        Ok(true)
    }

    /// Execute a command and return a response
    fn execute_command(&self, command: Command) -> Response {
        let result = execute(self.store.as_ref(), &Context::background(), command)
            .and_then(|reply| Response::ok(&reply));
        match result {
            Ok(response) => response,
            Err(e) => Response::error(&e.to_string()),
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

/// Run a command against a store
pub fn execute(store: &dyn KvStore, ctx: &Context, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::Get { key } => Reply::Value(store.get(ctx, &key)?),
        Command::SetNx { key, value } => Reply::Flag(store.set_nx(ctx, &key, &value)?),
        Command::SetXx { key, value } => Reply::Flag(store.set_xx(ctx, &key, &value)?),
        Command::Del { key } => Reply::Flag(store.del(ctx, &key)?),
        Command::SAdd { set, member } => Reply::Flag(store.sadd(ctx, &set, &member)?),
        Command::SRem { set, member } => Reply::Flag(store.srem(ctx, &set, &member)?),
        Command::SScan { set, cursor, count } => {
            let scan = store.sscan(ctx, &set, cursor, count as usize)?;
            Reply::Scan {
                members: scan.members,
                cursor: scan.cursor,
            }
        }
        Command::MGet { keys } => Reply::Values(store.mget(ctx, &keys)?),
        Command::Exec { batch } => Reply::Batch(store.exec(ctx, &batch)?),
        Command::Ping => {
            store.ping(ctx)?;
            Reply::Pong
        }
    };
    Ok(reply)
}
