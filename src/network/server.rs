//! TCP Server
//!
//! Accepts connections and dispatches them to worker threads.
//!
//! Open connections circulate through one queue. A worker takes a
//! connection, serves at most one command, and puts it back, so a client
//! holding many idle pooled connections never pins a worker.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::{Connection, Readiness};
use crate::config::Config;
use crate::error::Result;
use crate::store::KvStore;

/// Sleep between accept attempts when no client is waiting
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Sleep after a worker has found every queued connection idle
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// How long a worker waits on an empty queue before rechecking shutdown
const WORKER_POLL: Duration = Duration::from_millis(100);

/// Cloneable handle that stops a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the server to stop accepting and close its connections
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// An open connection counted against `max_connections`
struct Tracked {
    conn: Connection,
    open: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::Relaxed);
        tracing::trace!("Closed connection from {}", self.conn.peer_addr());
    }
}

/// TCP server exposing a `KvStore`
pub struct Server {
    config: Config,
    store: Arc<dyn KvStore>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    open: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, store: Arc<dyn KvStore>) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.listen_addr)?;
        // Non-blocking accept so the loop can observe shutdown
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            store,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            open: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for stopping the server from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&self) -> Result<()> {
        let (tx, rx) = channel::unbounded::<Tracked>();

        let workers: Vec<_> = (0..self.config.workers)
            .map(|id| {
                let tx = tx.clone();
                let rx = rx.clone();
                let shutdown = Arc::clone(&self.shutdown);
                thread::Builder::new()
                    .name(format!("orderkv-worker-{}", id))
                    .spawn(move || worker_loop(tx, rx, shutdown))
            })
            .collect::<std::io::Result<_>>()?;

        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.open.load(Ordering::Relaxed) >= self.config.max_connections {
                        tracing::warn!("Connection limit reached, rejecting {}", peer);
                        continue;
                    }
                    match self.open_connection(stream) {
                        Ok(tracked) => {
                            if tx.send(tracked).is_err() {
                                break;
                            }
                            tracing::trace!("Queued connection from {}", peer);
                        }
                        Err(e) => tracing::warn!("Failed to set up {}: {}", peer, e),
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }

        tracing::info!("Shutting down, waiting for {} workers", workers.len());
        drop(tx);
        for worker in workers {
            let _ = worker.join();
        }
        // Connections still queued are closed with the receiver
        drop(rx);

        Ok(())
    }

    fn open_connection(&self, stream: TcpStream) -> Result<Tracked> {
        let mut conn = Connection::new(
            stream,
            Arc::clone(&self.store),
            Arc::clone(&self.shutdown),
        )?;
        conn.set_timeouts(
            self.config.read_timeout_ms,
            self.config.write_timeout_ms,
            self.config.idle_timeout_ms,
        )?;

        self.open.fetch_add(1, Ordering::Relaxed);
        Ok(Tracked {
            conn,
            open: Arc::clone(&self.open),
        })
    }
}

fn worker_loop(tx: Sender<Tracked>, rx: Receiver<Tracked>, shutdown: Arc<AtomicBool>) {
    // Idle connections seen in a row; a full lap of them means nothing to do
    let mut idle_streak = 0usize;

    while !shutdown.load(Ordering::Relaxed) {
        let mut tracked = match rx.recv_timeout(WORKER_POLL) {
            Ok(tracked) => tracked,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let keep = match tracked.conn.poll() {
            Ok(Readiness::Ready) => {
                idle_streak = 0;
                match tracked.conn.serve_one() {
                    Ok(keep) => keep,
                    Err(e) => {
                        tracing::warn!("Connection ended with error: {}", e);
                        false
                    }
                }
            }
            Ok(Readiness::Idle) => {
                idle_streak += 1;
                if idle_streak > rx.len() {
                    idle_streak = 0;
                    thread::sleep(IDLE_BACKOFF);
                }
                true
            }
            Ok(Readiness::Closed) => false,
            Err(e) => {
                tracing::warn!("Connection ended with error: {}", e);
                false
            }
        };

        if keep && tx.send(tracked).is_err() {
            break;
        }
    }
}
