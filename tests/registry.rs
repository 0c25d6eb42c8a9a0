use std::sync::Arc;
use std::time::Duration;

use exchange_core::cache::{BookCache, MemoryBookCache};
use exchange_core::error::TradingError;
use exchange_core::lock::{InstrumentLock, LocalInstrumentLock};
use exchange_core::orderbook::BookEntry;
use exchange_core::persistence::{MemoryOrderStore, OrderStore};
use exchange_core::registry::OrderBookRegistry;
use exchange_core::types::order::{InvestorType, Order, OrderKind, OrderSide};
use uuid::Uuid;

const STOCK: &str = "SSE-1";

fn registry_with(
    cache: Arc<MemoryBookCache>,
    orders: Arc<MemoryOrderStore>,
    lock: Arc<dyn InstrumentLock>,
) -> OrderBookRegistry {
    OrderBookRegistry::new(cache as Arc<dyn BookCache>, orders as Arc<dyn OrderStore>, lock)
}

fn entry(user: &str, price: i64, quantity: i64) -> BookEntry {
    BookEntry::new(Uuid::new_v4(), user.to_string(), price, quantity)
}

#[tokio::test]
async fn unknown_stocks_get_a_fresh_empty_book() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());
    let registry = registry_with(cache, orders, Arc::new(LocalInstrumentLock::default()));

    let snapshot = registry.snapshot(STOCK, 10).await.unwrap();
    assert!(snapshot.bids.is_empty());
    assert!(snapshot.asks.is_empty());
}

#[tokio::test]
async fn mutations_are_written_through_to_the_cache() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());
    let registry = registry_with(
        cache.clone(),
        orders,
        Arc::new(LocalInstrumentLock::default()),
    );

    let resting = entry("buyer", 5_000, 100);
    let resting_id = resting.order_id;
    let matches = registry
        .place_order(STOCK, resting, OrderSide::Buy, OrderKind::Limit)
        .await
        .unwrap();
    assert!(matches.is_empty());

    let cached = cache.load_entries(STOCK, OrderSide::Buy).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].order_id, resting_id);
    assert_eq!(cached[0].remaining_quantity, 100);

    // The denormalized snapshot is cached alongside the entries.
    let snapshot = cache.snapshot_for(STOCK).await.unwrap();
    assert_eq!(snapshot.best_bid, Some(5_000));

    // Cancelling rewrites the cache too.
    assert!(registry.cancel_order(STOCK, resting_id).await.unwrap());
    let cached = cache.load_entries(STOCK, OrderSide::Buy).await.unwrap();
    assert!(cached.is_empty());
}

#[tokio::test]
async fn a_fresh_registry_restores_its_book_from_the_cache() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());

    let first = registry_with(
        cache.clone(),
        orders.clone(),
        Arc::new(LocalInstrumentLock::default()),
    );
    first
        .place_order(STOCK, entry("buyer", 5_000, 100), OrderSide::Buy, OrderKind::Limit)
        .await
        .unwrap();
    drop(first);

    // Same cache, new process.
    let second = registry_with(cache, orders, Arc::new(LocalInstrumentLock::default()));
    let snapshot = second.snapshot(STOCK, 10).await.unwrap();
    assert_eq!(snapshot.best_bid, Some(5_000));
    assert_eq!(snapshot.bids[0].quantity, 100);
}

#[tokio::test]
async fn with_an_empty_cache_the_book_is_rebuilt_from_open_orders() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());

    let mut open = Order::new_limit(
        "buyer".to_string(),
        STOCK.to_string(),
        OrderSide::Buy,
        5_000,
        100,
        InvestorType::User,
    )
    .unwrap();
    open.fill(40).unwrap();
    orders.insert(&open).await.unwrap();

    let mut done = Order::new_limit(
        "buyer".to_string(),
        STOCK.to_string(),
        OrderSide::Buy,
        5_010,
        10,
        InvestorType::User,
    )
    .unwrap();
    done.fill(10).unwrap();
    orders.insert(&done).await.unwrap();

    let registry = registry_with(
        cache.clone(),
        orders,
        Arc::new(LocalInstrumentLock::default()),
    );
    let snapshot = registry.snapshot(STOCK, 10).await.unwrap();

    // Only the unfilled remainder of the open order comes back.
    assert_eq!(snapshot.bids.len(), 1);
    assert_eq!(snapshot.bids[0].price, 5_000);
    assert_eq!(snapshot.bids[0].quantity, 60);

    // The rebuild primes the cache for the next restart.
    let cached = cache.load_entries(STOCK, OrderSide::Buy).await.unwrap();
    assert_eq!(cached.len(), 1);
}

#[tokio::test]
async fn a_persisted_order_is_not_restored_into_its_own_placement() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());

    // The command flow persists the Pending record before the book is
    // first materialized for its stock; the store fallback must not hand
    // that same order back to the placement that is about to insert it.
    let order = Order::new_limit(
        "buyer".to_string(),
        STOCK.to_string(),
        OrderSide::Buy,
        5_000,
        100,
        InvestorType::User,
    )
    .unwrap();
    orders.insert(&order).await.unwrap();

    let registry = registry_with(
        cache,
        orders,
        Arc::new(LocalInstrumentLock::default()),
    );
    let matches = registry
        .place_order(
            STOCK,
            BookEntry::new(order.id, order.user_id.clone(), 5_000, 100),
            OrderSide::Buy,
            OrderKind::Limit,
        )
        .await
        .unwrap();
    assert!(matches.is_empty());

    let snapshot = registry.snapshot(STOCK, 10).await.unwrap();
    assert_eq!(snapshot.bids.len(), 1);
    assert_eq!(snapshot.bids[0].quantity, 100);
    assert_eq!(snapshot.bids[0].order_count, 1);
}

#[tokio::test]
async fn seeding_skips_its_own_persisted_orders() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());

    let order = Order::new_limit(
        "mm".to_string(),
        STOCK.to_string(),
        OrderSide::Sell,
        10_000,
        500,
        InvestorType::MarketMaker,
    )
    .unwrap();
    orders.insert(&order).await.unwrap();

    let registry = registry_with(
        cache,
        orders,
        Arc::new(LocalInstrumentLock::default()),
    );
    registry
        .seed_ipo_orders(
            STOCK,
            vec![BookEntry::new(order.id, order.user_id.clone(), 10_000, 500)],
        )
        .await
        .unwrap();

    let snapshot = registry.snapshot(STOCK, 10).await.unwrap();
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].quantity, 500);
    assert_eq!(snapshot.asks[0].order_count, 1);
}

#[tokio::test]
async fn seeded_entries_skip_matching() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());
    let registry = registry_with(cache, orders, Arc::new(LocalInstrumentLock::default()));

    registry
        .seed_ipo_orders(
            STOCK,
            vec![entry("mm", 10_000, 500), entry("mm", 10_100, 300)],
        )
        .await
        .unwrap();

    let snapshot = registry.snapshot(STOCK, 10).await.unwrap();
    assert_eq!(snapshot.asks.len(), 2);
    assert_eq!(snapshot.best_ask, Some(10_000));
}

#[tokio::test]
async fn a_held_instrument_lock_times_out_the_caller() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());
    let lock: Arc<dyn InstrumentLock> =
        Arc::new(LocalInstrumentLock::new(Duration::from_millis(50)));
    let registry = registry_with(cache, orders, lock.clone());

    // Hold the instrument's critical section from outside the registry.
    let lease = lock.acquire(STOCK).await.unwrap();

    let err = registry.snapshot(STOCK, 10).await.unwrap_err();
    assert!(matches!(err, TradingError::LockTimeout { .. }));

    // Released, the registry works again.
    lease.release().await;
    assert!(registry.snapshot(STOCK, 10).await.is_ok());
}

#[tokio::test]
async fn cancelling_an_unknown_order_reports_false() {
    let cache = Arc::new(MemoryBookCache::new());
    let orders = Arc::new(MemoryOrderStore::new());
    let registry = registry_with(cache, orders, Arc::new(LocalInstrumentLock::default()));

    let cancelled = registry.cancel_order(STOCK, Uuid::new_v4()).await.unwrap();
    assert!(!cancelled);
}
