//! Order repository
//!
//! Public operation set over a `KvStore`:
//!
//! | Operation      | Store traffic                          |
//! |----------------|----------------------------------------|
//! | `insert`       | one EXEC: SETNX record + index add     |
//! | `find_by_id`   | one GET                                |
//! | `update`       | one SETXX (index untouched)            |
//! | `delete_by_id` | one EXEC: DEL record + index remove    |
//! | `find_all`     | index scan, then one MGET if non-empty |
//!
//! ## Invariants
//! - The primary records and the membership index change together or not
//!   at all: both writes of `insert`/`delete_by_id` share one batch.
//! - `update` never creates a record or an index entry.
//! - Nothing is retried; every failure carries the failing operation.

use crate::config::Config;
use crate::context::Context;
use crate::error::{RepoError, RepoOp, RepoResult, StoreError};
use crate::key::KeyCodec;
use crate::model::{Order, OrderId};
use crate::serializer::{decode_order, encode_order};
use crate::store::{BatchOutcome, KvStore};

use super::{Cursor, MembershipIndex, SetIndex, Transaction};

/// A page request for [`OrderRepository::find_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindAllPage {
    /// Maximum number of orders; 0 means the configured default
    pub size: usize,

    /// Where to resume; `Cursor::start()` for the first page
    pub cursor: Cursor,
}

impl FindAllPage {
    /// Request the first page
    pub fn first(size: usize) -> Self {
        Self {
            size,
            cursor: Cursor::start(),
        }
    }

    /// Request the page at `cursor`
    pub fn at(size: usize, cursor: Cursor) -> Self {
        Self { size, cursor }
    }
}

/// One page of orders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindResult {
    pub orders: Vec<Order>,

    /// Cursor of the next page, `None` once every order has been listed
    pub next: Option<Cursor>,
}

/// Repository of orders over a key-value store
pub struct OrderRepository<S, I = SetIndex> {
    store: S,
    index: I,
    keys: KeyCodec,
    default_page_size: usize,
    max_page_size: usize,
}

impl<S: KvStore> OrderRepository<S> {
    /// Repository with the default key prefix and index
    pub fn new(store: S) -> Self {
        let config = Config::default();
        Self::from_parts(store, SetIndex::new(config.index_key.clone()), &config)
    }

    /// Repository using the key space, index and page limits in `config`
    pub fn with_config(store: S, config: &Config) -> Result<Self, StoreError> {
        Self::with_index(store, SetIndex::new(config.index_key.clone()), config)
    }
}

impl<S: KvStore, I: MembershipIndex> OrderRepository<S, I> {
    /// Repository over a custom membership index
    pub fn with_index(store: S, index: I, config: &Config) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self::from_parts(store, index, config))
    }

    /// Build from an already validated config
    fn from_parts(store: S, index: I, config: &Config) -> Self {
        Self {
            store,
            index,
            keys: KeyCodec::new(config.key_prefix.clone()),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Store an order whose id is not in use yet
    ///
    /// Fails with `AlreadyExists` if the id is taken; storage is unchanged.
    pub fn insert(&self, ctx: &Context, order: &Order) -> RepoResult<()> {
        let op = RepoOp::Insert;
        let data = encode_order(order).map_err(|source| RepoError::Encode { op, source })?;
        let key = self.keys.key(order.order_id);

        let mut txn = Transaction::new(&self.store);
        txn.set_nx(&key, data);
        self.index.add(&mut txn, &key);

        match txn.commit(ctx).map_err(RepoError::transport(op))? {
            BatchOutcome::Committed => {
                tracing::debug!(order_id = order.order_id, %key, "order inserted");
                Ok(())
            }
            BatchOutcome::Aborted { index: 0 } => {
                tracing::debug!(order_id = order.order_id, %key, "insert rejected, id in use");
                Err(RepoError::AlreadyExists {
                    op,
                    id: order.order_id,
                })
            }
            BatchOutcome::Aborted { index } => Err(unexpected_abort(op, index)),
        }
    }

    /// Load the order with `id`
    pub fn find_by_id(&self, ctx: &Context, id: OrderId) -> RepoResult<Order> {
        let op = RepoOp::FindById;
        let key = self.keys.key(id);

        let bytes = self
            .store
            .get(ctx, &key)
            .map_err(RepoError::transport(op))?
            .ok_or(RepoError::NotExist { op, id })?;

        decode_order(&bytes).map_err(|source| {
            tracing::warn!(order_id = id, %key, "stored order does not decode");
            RepoError::Decode { op, key, source }
        })
    }

    /// Replace a stored order
    ///
    /// Only existing ids are written; the membership index is not touched.
    pub fn update(&self, ctx: &Context, order: &Order) -> RepoResult<()> {
        let op = RepoOp::Update;
        let data = encode_order(order).map_err(|source| RepoError::Encode { op, source })?;
        let key = self.keys.key(order.order_id);

        let written = self
            .store
            .set_xx(ctx, &key, &data)
            .map_err(RepoError::transport(op))?;

        if !written {
            return Err(RepoError::NotExist {
                op,
                id: order.order_id,
            });
        }

        tracing::debug!(order_id = order.order_id, %key, "order updated");
        Ok(())
    }

    /// Remove the order with `id` and its index entry
    pub fn delete_by_id(&self, ctx: &Context, id: OrderId) -> RepoResult<()> {
        let op = RepoOp::DeleteById;
        let key = self.keys.key(id);

        let mut txn = Transaction::new(&self.store);
        txn.del(&key);
        self.index.remove(&mut txn, &key);

        match txn.commit(ctx).map_err(RepoError::transport(op))? {
            BatchOutcome::Committed => {
                tracing::debug!(order_id = id, %key, "order deleted");
                Ok(())
            }
            BatchOutcome::Aborted { index: 0 } => Err(RepoError::NotExist { op, id }),
            BatchOutcome::Aborted { index } => Err(unexpected_abort(op, index)),
        }
    }

    /// List one page of orders
    ///
    /// Order within and across pages is unspecified. Orders written or
    /// deleted while paging may be missed or listed twice. A key whose
    /// record vanished between the scan and the fetch is skipped.
    pub fn find_all(&self, ctx: &Context, page: FindAllPage) -> RepoResult<FindResult> {
        let op = RepoOp::FindAll;
        let size = self.page_size(page.size);

        let scan = self
            .index
            .scan(&self.store, ctx, page.cursor, size)
            .map_err(RepoError::transport(op))?;

        if scan.keys.is_empty() {
            return Ok(FindResult {
                orders: Vec::new(),
                next: scan.next,
            });
        }

        let values = self
            .store
            .mget(ctx, &scan.keys)
            .map_err(RepoError::transport(op))?;

        let mut orders = Vec::with_capacity(values.len());
        for (key, value) in scan.keys.into_iter().zip(values) {
            let Some(bytes) = value else {
                tracing::debug!(%key, "indexed order missing, skipped");
                continue;
            };
            match decode_order(&bytes) {
                Ok(order) => orders.push(order),
                Err(source) => {
                    tracing::warn!(%key, "stored order does not decode, page aborted");
                    return Err(RepoError::Decode { op, key, source });
                }
            }
        }

        tracing::debug!(count = orders.len(), more = scan.next.is_some(), "page listed");
        Ok(FindResult {
            orders,
            next: scan.next,
        })
    }

    /// Store key of the order with `id`
    pub fn key_of(&self, id: OrderId) -> String {
        self.keys.key(id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    fn page_size(&self, requested: usize) -> usize {
        match requested {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        }
    }
}

fn unexpected_abort(op: RepoOp, index: usize) -> RepoError {
    tracing::warn!(%op, index, "batch aborted on an unconditional op");
    RepoError::Transport {
        op,
        source: StoreError::Server(format!("batch aborted at op {}", index)),
    }
}
