//! Tests for OrderRepository
//!
//! These tests verify:
//! - Insert / find / update / delete semantics and the error taxonomy
//! - Index and records staying in step, including on failed batches
//! - Cursor pagination over the membership index
//! - Concurrent inserts of one id
//! - Context cancellation surfacing as transport failures

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

use orderkv::store::{Batch, BatchOutcome, SetScan};
use orderkv::{
    Config, Context, ErrorKind, FindAllPage, KvStore, LineItem, MemoryStore, Order,
    OrderRepository, RepoOp, StoreError,
};
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_repo() -> OrderRepository<MemoryStore> {
    OrderRepository::new(MemoryStore::new())
}

fn sample_order(id: u64) -> Order {
    Order::new(id, Uuid::new_v4()).with_item(LineItem::new(Uuid::new_v4(), 2, 500))
}

fn index_members(repo: &OrderRepository<MemoryStore>) -> Vec<String> {
    repo.store().members("orders")
}

/// MemoryStore wrapper that counts calls and can fail batches
#[derive(Default)]
struct InstrumentedStore {
    inner: MemoryStore,
    fail_exec: AtomicBool,
    exec_calls: AtomicUsize,
    mget_calls: AtomicUsize,
}

impl KvStore for InstrumentedStore {
    fn get(&self, ctx: &Context, key: &str) -> orderkv::Result<Option<Vec<u8>>> {
        self.inner.get(ctx, key)
    }

    fn set_nx(&self, ctx: &Context, key: &str, value: &[u8]) -> orderkv::Result<bool> {
        self.inner.set_nx(ctx, key, value)
    }

    fn set_xx(&self, ctx: &Context, key: &str, value: &[u8]) -> orderkv::Result<bool> {
        self.inner.set_xx(ctx, key, value)
    }

    fn del(&self, ctx: &Context, key: &str) -> orderkv::Result<bool> {
        self.inner.del(ctx, key)
    }

    fn sadd(&self, ctx: &Context, set: &str, member: &str) -> orderkv::Result<bool> {
        self.inner.sadd(ctx, set, member)
    }

    fn srem(&self, ctx: &Context, set: &str, member: &str) -> orderkv::Result<bool> {
        self.inner.srem(ctx, set, member)
    }

    fn sscan(
        &self,
        ctx: &Context,
        set: &str,
        cursor: u64,
        count: usize,
    ) -> orderkv::Result<SetScan> {
        self.inner.sscan(ctx, set, cursor, count)
    }

    fn mget(&self, ctx: &Context, keys: &[String]) -> orderkv::Result<Vec<Option<Vec<u8>>>> {
        self.mget_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.mget(ctx, keys)
    }

    fn exec(&self, ctx: &Context, batch: &Batch) -> orderkv::Result<BatchOutcome> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exec.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset during EXEC",
            )));
        }
        self.inner.exec(ctx, batch)
    }

    fn ping(&self, ctx: &Context) -> orderkv::Result<()> {
        self.inner.ping(ctx)
    }
}

fn collect_all_ids(repo: &OrderRepository<MemoryStore>, size: usize) -> (Vec<u64>, usize) {
    let ctx = Context::background();
    let mut ids = Vec::new();
    let mut page = FindAllPage::first(size);
    let mut pages = 0;

    loop {
        pages += 1;
        assert!(pages <= 100, "pagination did not terminate");

        let result = repo.find_all(&ctx, page).unwrap();
        assert!(result.orders.len() <= size);
        ids.extend(result.orders.iter().map(|o| o.order_id));

        match result.next {
            Some(cursor) => page = FindAllPage::at(size, cursor),
            None => break,
        }
    }

    (ids, pages)
}

// =============================================================================
// Insert Tests
// =============================================================================

#[test]
fn test_insert_then_find_returns_equal_order() {
    let repo = setup_repo();
    let ctx = Context::background();
    let order = sample_order(1);

    repo.insert(&ctx, &order).unwrap();

    assert_eq!(repo.find_by_id(&ctx, 1).unwrap(), order);
    assert_eq!(index_members(&repo), vec!["order:1".to_string()]);
}

#[test]
fn test_insert_existing_id_fails_and_leaves_storage_unchanged() {
    let repo = setup_repo();
    let ctx = Context::background();
    let original = sample_order(7);
    repo.insert(&ctx, &original).unwrap();

    let mut other = sample_order(7);
    other.line_items.clear();
    let err = repo.insert(&ctx, &other).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.op(), RepoOp::Insert);
    assert_eq!(repo.find_by_id(&ctx, 7).unwrap(), original);
    assert_eq!(index_members(&repo).len(), 1);
    assert_eq!(repo.store().key_count(), 1);
}

#[test]
fn test_insert_order_without_items_or_timestamps() {
    let repo = setup_repo();
    let ctx = Context::background();
    let order = Order::new(3, Uuid::nil());

    repo.insert(&ctx, &order).unwrap();

    let loaded = repo.find_by_id(&ctx, 3).unwrap();
    assert!(loaded.line_items.is_empty());
    assert!(loaded.created_at.is_none());
    assert_eq!(loaded, order);
}

#[test]
fn test_insert_transport_failure_applies_nothing() {
    let store = InstrumentedStore::default();
    store.fail_exec.store(true, Ordering::SeqCst);
    let repo = OrderRepository::new(store);
    let ctx = Context::background();

    let err = repo.insert(&ctx, &sample_order(1)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(repo.store().inner.key_count(), 0);
    assert!(repo.store().inner.members("orders").is_empty());
}

// =============================================================================
// Find Tests
// =============================================================================

#[test]
fn test_find_missing_id_fails_not_exist() {
    let repo = setup_repo();
    let err = repo.find_by_id(&Context::background(), 404).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotExist);
    assert_eq!(err.op(), RepoOp::FindById);
}

#[test]
fn test_find_undecodable_record_fails_decode() {
    let repo = setup_repo();
    let ctx = Context::background();
    repo.store().set_nx(&ctx, "order:5", b"{broken").unwrap();

    let err = repo.find_by_id(&ctx, 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeFailure);
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_existing_order() {
    let repo = setup_repo();
    let ctx = Context::background();
    let mut order = sample_order(2);
    repo.insert(&ctx, &order).unwrap();

    order.line_items[0].quantity = 9;
    order.shipped_at = Some(chrono::Utc::now());
    repo.update(&ctx, &order).unwrap();

    assert_eq!(repo.find_by_id(&ctx, 2).unwrap(), order);
    assert_eq!(index_members(&repo).len(), 1);
}

#[test]
fn test_update_absent_id_fails_without_mutation() {
    let repo = setup_repo();
    let ctx = Context::background();

    let err = repo.update(&ctx, &sample_order(11)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotExist);
    assert_eq!(err.op(), RepoOp::Update);
    assert_eq!(repo.store().key_count(), 0);
    assert!(index_members(&repo).is_empty());
}

#[test]
fn test_update_does_not_touch_index() {
    let repo = setup_repo();
    let ctx = Context::background();
    let order = sample_order(4);
    repo.insert(&ctx, &order).unwrap();

    // Drop the index entry behind the repository's back
    repo.store().srem(&ctx, "orders", "order:4").unwrap();
    repo.update(&ctx, &order).unwrap();

    assert!(index_members(&repo).is_empty());
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_removes_record_and_index_entry() {
    let repo = setup_repo();
    let ctx = Context::background();
    repo.insert(&ctx, &sample_order(8)).unwrap();
    repo.insert(&ctx, &sample_order(9)).unwrap();

    repo.delete_by_id(&ctx, 8).unwrap();

    assert_eq!(repo.find_by_id(&ctx, 8).unwrap_err().kind(), ErrorKind::NotExist);
    assert_eq!(index_members(&repo), vec!["order:9".to_string()]);
}

#[test]
fn test_delete_never_inserted_fails_not_exist() {
    let repo = setup_repo();
    let err = repo.delete_by_id(&Context::background(), 123).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotExist);
    assert_eq!(err.op(), RepoOp::DeleteById);
}

#[test]
fn test_delete_twice_fails_not_exist() {
    let repo = setup_repo();
    let ctx = Context::background();
    repo.insert(&ctx, &sample_order(6)).unwrap();

    repo.delete_by_id(&ctx, 6).unwrap();
    let err = repo.delete_by_id(&ctx, 6).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotExist);
}

#[test]
fn test_delete_transport_failure_keeps_record_and_index() {
    let repo = OrderRepository::new(InstrumentedStore::default());
    let ctx = Context::background();
    repo.insert(&ctx, &sample_order(1)).unwrap();

    repo.store().fail_exec.store(true, Ordering::SeqCst);
    let err = repo.delete_by_id(&ctx, 1).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(repo.store().inner.key_count(), 1);
    assert_eq!(repo.store().inner.members("orders"), vec!["order:1".to_string()]);
}

// =============================================================================
// FindAll Tests
// =============================================================================

#[test]
fn test_find_all_chains_cursors_over_every_order() {
    let repo = setup_repo();
    let ctx = Context::background();
    let inserted: HashSet<u64> = [10, 20, 30, 40, 50].into_iter().collect();
    for id in &inserted {
        repo.insert(&ctx, &sample_order(*id)).unwrap();
    }

    let (ids, pages) = collect_all_ids(&repo, 2);

    let unique: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 5, "no order listed twice");
    assert_eq!(unique, inserted);
    assert_eq!(pages, 3);
}

#[test]
fn test_find_all_on_empty_index_is_complete() {
    let store = InstrumentedStore::default();
    let repo = OrderRepository::new(store);

    let result = repo
        .find_all(&Context::background(), FindAllPage::first(10))
        .unwrap();

    assert!(result.orders.is_empty());
    assert!(result.next.is_none());
    assert_eq!(repo.store().mget_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_find_all_single_page_uses_one_fetch() {
    let repo = OrderRepository::new(InstrumentedStore::default());
    let ctx = Context::background();
    for id in 1..=3 {
        repo.insert(&ctx, &sample_order(id)).unwrap();
    }

    let result = repo.find_all(&ctx, FindAllPage::first(10)).unwrap();

    assert_eq!(result.orders.len(), 3);
    assert!(result.next.is_none());
    assert_eq!(repo.store().mget_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_find_all_decode_failure_aborts_page() {
    let repo = setup_repo();
    let ctx = Context::background();
    repo.insert(&ctx, &sample_order(1)).unwrap();
    repo.store().set_nx(&ctx, "order:2", b"not an order").unwrap();
    repo.store().sadd(&ctx, "orders", "order:2").unwrap();

    let err = repo.find_all(&ctx, FindAllPage::first(10)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DecodeFailure);
    assert_eq!(err.op(), RepoOp::FindAll);
}

#[test]
fn test_find_all_skips_index_entry_without_record() {
    let repo = setup_repo();
    let ctx = Context::background();
    repo.insert(&ctx, &sample_order(1)).unwrap();
    repo.store().sadd(&ctx, "orders", "order:2").unwrap();

    let result = repo.find_all(&ctx, FindAllPage::first(10)).unwrap();

    assert_eq!(result.orders.len(), 1);
    assert_eq!(result.orders[0].order_id, 1);
}

#[test]
fn test_find_all_zero_size_uses_default_page_size() {
    let config = Config::builder().default_page_size(3).build();
    let repo = OrderRepository::with_config(MemoryStore::new(), &config).unwrap();
    let ctx = Context::background();
    for id in 1..=5 {
        repo.insert(&ctx, &sample_order(id)).unwrap();
    }

    let result = repo.find_all(&ctx, FindAllPage::first(0)).unwrap();

    assert_eq!(result.orders.len(), 3);
    assert!(result.next.is_some());
}

#[test]
fn test_find_all_clamps_to_max_page_size() {
    let config = Config::builder()
        .default_page_size(2)
        .max_page_size(2)
        .build();
    let repo = OrderRepository::with_config(MemoryStore::new(), &config).unwrap();
    let ctx = Context::background();
    for id in 1..=5 {
        repo.insert(&ctx, &sample_order(id)).unwrap();
    }

    let result = repo.find_all(&ctx, FindAllPage::first(100)).unwrap();

    assert_eq!(result.orders.len(), 2);
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_custom_key_space() {
    let config = Config::builder()
        .key_prefix("ord")
        .index_key("all-orders")
        .build();
    let repo = OrderRepository::with_config(MemoryStore::new(), &config).unwrap();
    let ctx = Context::background();

    repo.insert(&ctx, &sample_order(1)).unwrap();

    assert_eq!(repo.key_of(1), "ord:1");
    assert_eq!(repo.store().members("all-orders"), vec!["ord:1".to_string()]);
    assert!(repo.store().members("orders").is_empty());
}

#[test]
fn test_new_matches_default_config() {
    let ctx = Context::background();
    let plain = setup_repo();
    let configured = OrderRepository::with_config(MemoryStore::new(), &Config::default()).unwrap();

    for id in 0..60 {
        plain.insert(&ctx, &sample_order(id)).unwrap();
        configured.insert(&ctx, &sample_order(id)).unwrap();
    }

    assert_eq!(plain.key_of(9), configured.key_of(9));
    assert_eq!(plain.index().set_key(), configured.index().set_key());

    let plain_page = plain.find_all(&ctx, FindAllPage::first(0)).unwrap();
    let configured_page = configured.find_all(&ctx, FindAllPage::first(0)).unwrap();
    assert_eq!(plain_page.orders.len(), Config::default().default_page_size);
    assert_eq!(plain_page.orders.len(), configured_page.orders.len());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = Config::builder().key_prefix("a:b").build();
    assert!(OrderRepository::with_config(MemoryStore::new(), &config).is_err());
}

// =============================================================================
// Context Tests
// =============================================================================

#[test]
fn test_cancelled_context_fails_as_transport() {
    let repo = setup_repo();
    let ctx = Context::background();
    ctx.cancel();

    let err = repo.insert(&ctx, &sample_order(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert!(matches!(
        err,
        orderkv::RepoError::Transport {
            source: StoreError::Cancelled,
            ..
        }
    ));

    assert_eq!(repo.store().key_count(), 0);
    assert_eq!(
        repo.find_all(&ctx, FindAllPage::first(5)).unwrap_err().kind(),
        ErrorKind::TransportFailure
    );
}

#[test]
fn test_expired_deadline_fails_as_transport() {
    let repo = setup_repo();
    let ctx = Context::with_deadline(std::time::Instant::now());

    let err = repo.find_by_id(&ctx, 1).unwrap_err();
    assert!(matches!(
        err,
        orderkv::RepoError::Transport {
            source: StoreError::DeadlineExceeded,
            ..
        }
    ));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_inserts_of_same_id() {
    let repo = setup_repo();
    let threads = 8;
    let barrier = Barrier::new(threads);
    let (repo_ref, barrier) = (&repo, &barrier);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(move || {
                    let repo = repo_ref;
                    barrier.wait();
                    repo.insert(&Context::background(), &sample_order(42))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_eq!(result.as_ref().unwrap_err().kind(), ErrorKind::AlreadyExists);
    }
    assert_eq!(index_members(&repo), vec!["order:42".to_string()]);
    assert_eq!(repo.store().key_count(), 1);
}

#[test]
fn test_concurrent_inserts_of_distinct_ids() {
    let repo = setup_repo();

    thread::scope(|s| {
        for t in 0..4u64 {
            let repo = &repo;
            s.spawn(move || {
                for i in 0..25u64 {
                    repo.insert(&Context::background(), &sample_order(t * 100 + i))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(index_members(&repo).len(), 100);
    let (ids, _) = collect_all_ids(&repo, 7);
    assert_eq!(ids.iter().copied().collect::<HashSet<_>>().len(), 100);
}

// =============================================================================
// Lifecycle Scenario
// =============================================================================

#[test]
fn test_order_lifecycle() {
    let repo = setup_repo();
    let ctx = Context::background();
    let customer = Uuid::new_v4();
    let item = Uuid::new_v4();

    let mut order = Order::new(1, customer).with_item(LineItem::new(item, 2, 500));
    repo.insert(&ctx, &order).unwrap();

    let loaded = repo.find_by_id(&ctx, 1).unwrap();
    assert_eq!(loaded.customer_id, customer);
    assert_eq!(loaded.line_items, vec![LineItem::new(item, 2, 500)]);

    order.line_items[0].quantity = 3;
    repo.update(&ctx, &order).unwrap();
    assert_eq!(repo.find_by_id(&ctx, 1).unwrap().line_items[0].quantity, 3);

    repo.delete_by_id(&ctx, 1).unwrap();
    assert_eq!(repo.find_by_id(&ctx, 1).unwrap_err().kind(), ErrorKind::NotExist);
    assert!(index_members(&repo).is_empty());
}
