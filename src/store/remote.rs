//! Remote store client
//!
//! `KvStore` over TCP to an orderkv server. One `RemoteStore` is shared by
//! every caller; each call checks out a pooled connection for exclusive use
//! and hands it back afterwards. Connections that hit an error are dropped.
//!
//! The caller's deadline bounds the connect, read and write timeouts of the
//! call. While waiting for a reply the client wakes every `CANCEL_POLL` to
//! check the context, so cancelling or passing the deadline aborts the
//! call in flight. The connection is then dropped, since a late reply would
//! leave it out of sync.

use std::io::{self, BufReader, BufWriter, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{Batch, BatchOutcome, KvStore, SetScan};
use crate::config::Config;
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::protocol::{read_response, write_command, Command, Reply};

/// Smallest socket timeout handed to the OS; a zero timeout is rejected
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Longest a waiting call goes without looking at its context
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// A single client connection
struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn open(addr: &SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(addr, timeout.max(MIN_TIMEOUT))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    fn set_write_timeout(&self, write: Option<Duration>) -> Result<()> {
        self.writer
            .get_ref()
            .set_write_timeout(write.map(|d| d.max(MIN_TIMEOUT)))?;
        Ok(())
    }

    /// Whether the server still holds the connection open
    ///
    /// The server closes idle connections, so a pooled connection may have
    /// been shut down while it sat in the pool.
    fn is_alive(&self) -> bool {
        let stream = self.reader.get_ref();
        if !self.reader.buffer().is_empty() || stream.set_nonblocking(true).is_err() {
            return false;
        }
        let alive = match stream.peek(&mut [0u8; 1]) {
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => true,
            _ => false,
        };
        alive && stream.set_nonblocking(false).is_ok()
    }

    /// Send `command` and read its reply
    ///
    /// `read_timeout` limits the wait for the reply (None = unlimited).
    fn round_trip(
        &mut self,
        ctx: &Context,
        command: &Command,
        read_timeout: Option<Duration>,
    ) -> Result<Reply> {
        write_command(&mut self.writer, command)?;
        self.await_reply(ctx, read_timeout)?;

        // The reply has started arriving; bound the rest of the frame
        let rest = bound_duration(read_timeout, ctx.remaining());
        self.reader
            .get_ref()
            .set_read_timeout(rest.map(|d| d.max(MIN_TIMEOUT)))?;
        read_response(&mut self.reader)?.into_reply()
    }

    /// Block until the first byte of a reply is readable
    fn await_reply(&mut self, ctx: &Context, read_timeout: Option<Duration>) -> Result<()> {
        let started = Instant::now();

        while self.reader.buffer().is_empty() {
            ctx.check()?;

            let mut slice = CANCEL_POLL;
            if let Some(limit) = read_timeout {
                let left = limit.saturating_sub(started.elapsed());
                if left.is_zero() {
                    let timeout = io::Error::new(ErrorKind::TimedOut, "timed out waiting for reply");
                    return Err(timeout.into());
                }
                slice = slice.min(left);
            }
            if let Some(left) = ctx.remaining() {
                slice = slice.min(left);
            }

            let stream = self.reader.get_ref();
            stream.set_read_timeout(Some(slice.max(MIN_TIMEOUT)))?;
            match stream.peek(&mut [0u8; 1]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    )
                    .into())
                }
                Ok(_) => break,
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Pick the tighter of a configured timeout (0 = none) and the time left
fn bound(configured_ms: u64, remaining: Option<Duration>) -> Option<Duration> {
    bound_duration(millis(configured_ms), remaining)
}

fn bound_duration(configured: Option<Duration>, remaining: Option<Duration>) -> Option<Duration> {
    match (configured, remaining) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// TCP client for an orderkv server
pub struct RemoteStore {
    addr: SocketAddr,
    config: Config,
    idle: Mutex<Vec<Connection>>,
}

impl RemoteStore {
    /// Create a client for `config.server_addr`
    ///
    /// No connection is opened until the first call.
    pub fn new(config: Config) -> Result<Self> {
        let addr = config
            .server_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                StoreError::Config(format!("cannot resolve address {}", config.server_addr))
            })?;

        Ok(Self {
            addr,
            config,
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Create a client for `addr` with otherwise default settings
    pub fn connect(addr: impl Into<String>) -> Result<Self> {
        Self::new(Config::builder().server_addr(addr).build())
    }

    /// Address of the server
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of idle pooled connections
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    fn checkout(&self, ctx: &Context) -> Result<Connection> {
        loop {
            let Some(conn) = self.idle.lock().pop() else {
                break;
            };
            if conn.is_alive() {
                return Ok(conn);
            }
            tracing::debug!(addr = %self.addr, "dropping closed pooled connection");
        }

        let timeout = bound(self.config.connect_timeout_ms, ctx.remaining())
            .unwrap_or(Duration::from_secs(30));
        tracing::debug!(addr = %self.addr, "opening store connection");
        Connection::open(&self.addr, timeout)
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.pool_size {
            idle.push(conn);
        }
    }

    /// Send one command and wait for its reply
    fn call(&self, ctx: &Context, command: Command) -> Result<Reply> {
        ctx.check()?;

        let mut conn = self.checkout(ctx)?;
        conn.set_write_timeout(bound(self.config.write_timeout_ms, ctx.remaining()))?;

        tracing::trace!(command = ?command.command_type(), "sending command");
        match conn.round_trip(ctx, &command, millis(self.config.read_timeout_ms)) {
            Ok(reply) => {
                self.checkin(conn);
                Ok(reply)
            }
            // The server answered; the connection is still in sync.
            Err(StoreError::Server(message)) => {
                self.checkin(conn);
                Err(StoreError::Server(message))
            }
            Err(err) => {
                tracing::debug!(addr = %self.addr, error = %err, "dropping store connection");
                if ctx.is_cancelled() {
                    return Err(StoreError::Cancelled);
                }
                if matches!(ctx.remaining(), Some(left) if left.is_zero()) {
                    return Err(StoreError::DeadlineExceeded);
                }
                Err(err)
            }
        }
    }
}

fn unexpected(reply: Reply, wanted: &str) -> StoreError {
    StoreError::Protocol(format!("expected {} reply, got {:?}", wanted, reply))
}

fn into_flag(reply: Reply) -> Result<bool> {
    match reply {
        Reply::Flag(flag) => Ok(flag),
        other => Err(unexpected(other, "flag")),
    }
}

impl KvStore for RemoteStore {
    fn get(&self, ctx: &Context, key: &str) -> Result<Option<Vec<u8>>> {
        match self.call(ctx, Command::Get { key: key.to_string() })? {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected(other, "value")),
        }
    }

    fn set_nx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool> {
        into_flag(self.call(
            ctx,
            Command::SetNx {
                key: key.to_string(),
                value: value.to_vec(),
            },
        )?)
    }

    fn set_xx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool> {
        into_flag(self.call(
            ctx,
            Command::SetXx {
                key: key.to_string(),
                value: value.to_vec(),
            },
        )?)
    }

    fn del(&self, ctx: &Context, key: &str) -> Result<bool> {
        into_flag(self.call(ctx, Command::Del { key: key.to_string() })?)
    }

    fn sadd(&self, ctx: &Context, set: &str, member: &str) -> Result<bool> {
        into_flag(self.call(
            ctx,
            Command::SAdd {
                set: set.to_string(),
                member: member.to_string(),
            },
        )?)
    }

    fn srem(&self, ctx: &Context, set: &str, member: &str) -> Result<bool> {
        into_flag(self.call(
            ctx,
            Command::SRem {
                set: set.to_string(),
                member: member.to_string(),
            },
        )?)
    }

    fn sscan(&self, ctx: &Context, set: &str, cursor: u64, count: usize) -> Result<SetScan> {
        let command = Command::SScan {
            set: set.to_string(),
            cursor,
            count: u32::try_from(count).unwrap_or(u32::MAX),
        };
        match self.call(ctx, command)? {
            Reply::Scan { members, cursor } => Ok(SetScan { members, cursor }),
            other => Err(unexpected(other, "scan")),
        }
    }

    fn mget(&self, ctx: &Context, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let command = Command::MGet { keys: keys.to_vec() };
        match self.call(ctx, command)? {
            Reply::Values(values) if values.len() == keys.len() => Ok(values),
            Reply::Values(values) => Err(StoreError::Protocol(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            ))),
            other => Err(unexpected(other, "values")),
        }
    }

    fn exec(&self, ctx: &Context, batch: &Batch) -> Result<BatchOutcome> {
        let command = Command::Exec { batch: batch.clone() };
        match self.call(ctx, command)? {
            Reply::Batch(outcome) => Ok(outcome),
            other => Err(unexpected(other, "batch")),
        }
    }

    fn ping(&self, ctx: &Context) -> Result<()> {
        match self.call(ctx, Command::Ping)? {
            Reply::Pong => Ok(()),
            other => Err(unexpected(other, "pong")),
        }
    }
}
