//! Configuration for orderkv
//!
//! Centralized configuration with sensible defaults, shared by the
//! repository, the remote store client and the server.

use crate::error::{Result, StoreError};

/// Main configuration for an orderkv deployment
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Repository Configuration
    // -------------------------------------------------------------------------
    /// Prefix of every primary record key (`{prefix}:{order_id}`)
    pub key_prefix: String,

    /// Store key of the membership index set
    pub index_key: String,

    /// Page size used when a caller asks for a page of size 0
    pub default_page_size: usize,

    /// Upper bound on the page size of a single scan
    pub max_page_size: usize,

    // -------------------------------------------------------------------------
    // Client Configuration
    // -------------------------------------------------------------------------
    /// Address of the orderkv server the remote client dials
    pub server_addr: String,

    /// Max idle connections kept by the remote client
    pub pool_size: usize,

    /// Connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Server Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Number of connection worker threads
    pub workers: usize,

    /// Max client connections open at once; further accepts are closed
    pub max_connections: usize,

    // -------------------------------------------------------------------------
    // Shared Network Configuration
    // -------------------------------------------------------------------------
    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// The server closes connections idle this long (milliseconds, 0 = never)
    pub idle_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: "order".to_string(),
            index_key: "orders".to_string(),
            default_page_size: 50,
            max_page_size: 1000,
            server_addr: "127.0.0.1:6380".to_string(),
            pool_size: 8,
            connect_timeout_ms: 2000,
            listen_addr: "127.0.0.1:6380".to_string(),
            workers: 8,
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            idle_timeout_ms: 60_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the invariants the repository and server rely on
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() || self.key_prefix.contains(':') {
            return Err(StoreError::Config(format!(
                "key prefix must be non-empty and must not contain ':', got {:?}",
                self.key_prefix
            )));
        }
        if self.index_key.is_empty() {
            return Err(StoreError::Config("index key must be non-empty".to_string()));
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(StoreError::Config("page sizes must be positive".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(StoreError::Config(format!(
                "default page size {} exceeds max page size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.workers == 0 {
            return Err(StoreError::Config("workers must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the primary key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Set the membership index key
    pub fn index_key(mut self, key: impl Into<String>) -> Self {
        self.config.index_key = key.into();
        self
    }

    /// Set the page size used for size-0 requests
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size;
        self
    }

    /// Set the maximum page size
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.config.max_page_size = size;
        self
    }

    /// Set the server address the client connects to
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the number of pooled idle connections
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the number of worker threads
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = count;
        self
    }

    /// Set the maximum number of queued connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the idle connection timeout (in milliseconds)
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
