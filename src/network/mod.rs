//! Network Module
//!
//! TCP server exposing a `KvStore` to `RemoteStore` clients.
//!
//! ## Architecture
//! - Single acceptor thread
//! - Fixed worker pool sharing one queue of open connections
//! - One command served per turn, then the connection goes back in the queue
//! - Commands routed to the store by `execute`

mod server;
mod connection;

pub use server::{Server, ShutdownHandle};
pub use connection::{execute, Connection, Readiness};
