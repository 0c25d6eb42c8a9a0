use std::sync::Arc;

use exchange_core::cache::{BookCache, MemoryBookCache};
use exchange_core::events::{EventBus, PlaceOrder, StockListed, TradingEvent};
use exchange_core::handlers::{
    IpoSeedingHandler, MARKET_MAKER_ID, OrderCommandHandler, SettlementHandler,
};
use exchange_core::lock::{InstrumentLock, LocalInstrumentLock};
use exchange_core::persistence::{
    BalanceStore, HoldingStore, MemoryBalanceStore, MemoryHoldingStore, MemoryOrderStore,
    MemoryTradeStore, OrderStore, TradeStore,
};
use exchange_core::pricing;
use exchange_core::registry::OrderBookRegistry;
use exchange_core::types::order::{InvestorType, OrderKind, OrderSide, OrderStatus};
use exchange_core::types::portfolio::InvestorBalance;

const STOCK: &str = "SSE-9";
const BASE_PRICE: i64 = 10_000;
const TOTAL_SHARES: i64 = 1_000_000;

struct Harness {
    orders: Arc<MemoryOrderStore>,
    holdings: Arc<MemoryHoldingStore>,
    balances: Arc<MemoryBalanceStore>,
    trades: Arc<MemoryTradeStore>,
    registry: Arc<OrderBookRegistry>,
    events: EventBus,
    ipo: IpoSeedingHandler,
}

fn harness() -> Harness {
    let orders = Arc::new(MemoryOrderStore::new());
    let holdings = Arc::new(MemoryHoldingStore::new());
    let balances = Arc::new(MemoryBalanceStore::new());
    let trades = Arc::new(MemoryTradeStore::new());
    let cache: Arc<dyn BookCache> = Arc::new(MemoryBookCache::new());
    let lock: Arc<dyn InstrumentLock> = Arc::new(LocalInstrumentLock::default());
    let events = EventBus::default();

    let registry = Arc::new(OrderBookRegistry::new(
        cache,
        orders.clone() as Arc<dyn OrderStore>,
        lock,
    ));
    let ipo = IpoSeedingHandler::new(
        orders.clone() as Arc<dyn OrderStore>,
        holdings.clone() as Arc<dyn HoldingStore>,
        registry.clone(),
        events.clone(),
        20,
        1_500,
        3,
        10,
    );

    Harness {
        orders,
        holdings,
        balances,
        trades,
        registry,
        events,
        ipo,
    }
}

fn listing() -> StockListed {
    StockListed {
        stock_id: STOCK.to_string(),
        stock_name: "Seed Corp".to_string(),
        base_price: BASE_PRICE,
        total_shares: TOTAL_SHARES,
    }
}

#[tokio::test]
async fn market_maker_starts_with_the_whole_float() {
    let h = harness();
    h.ipo.on_stock_listed(listing()).await.unwrap();

    let holding = h
        .holdings
        .find(MARKET_MAKER_ID, InvestorType::MarketMaker, STOCK)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(holding.quantity, TOTAL_SHARES);
    assert_eq!(holding.average_price, BASE_PRICE);
}

#[tokio::test]
async fn seeded_asks_cover_the_float_exactly() {
    let h = harness();
    h.ipo.on_stock_listed(listing()).await.unwrap();

    let snapshot = h.registry.snapshot(STOCK, 100).await.unwrap();
    assert!(snapshot.bids.is_empty());
    assert_eq!(snapshot.asks.len(), 20);

    let total: i64 = snapshot.asks.iter().map(|l| l.quantity).sum();
    assert_eq!(total, TOTAL_SHARES);
}

#[tokio::test]
async fn ladder_prices_start_at_base_and_stay_inside_the_spread() {
    let h = harness();
    h.ipo.on_stock_listed(listing()).await.unwrap();

    let snapshot = h.registry.snapshot(STOCK, 100).await.unwrap();
    assert_eq!(snapshot.best_ask, Some(BASE_PRICE));

    let ceiling = BASE_PRICE + BASE_PRICE * 1_500 / 10_000;
    for level in &snapshot.asks {
        assert!(level.price >= BASE_PRICE);
        assert!(level.price <= ceiling);
        assert!(pricing::is_valid_tick(level.price));
    }
}

#[tokio::test]
async fn cheaper_levels_carry_more_shares() {
    let h = harness();
    h.ipo.on_stock_listed(listing()).await.unwrap();

    let snapshot = h.registry.snapshot(STOCK, 100).await.unwrap();
    let quantities: Vec<i64> = snapshot.asks.iter().map(|l| l.quantity).collect();
    for pair in quantities.windows(2) {
        assert!(
            pair[0] >= pair[1],
            "level quantities must not grow with price: {quantities:?}"
        );
    }
}

#[tokio::test]
async fn each_level_is_split_into_multiple_orders() {
    let h = harness();
    h.ipo.on_stock_listed(listing()).await.unwrap();

    let snapshot = h.registry.snapshot(STOCK, 100).await.unwrap();
    for level in &snapshot.asks {
        assert_eq!(level.order_count, 3);
    }

    let open = h.orders.find_open_by_stock(STOCK).await.unwrap();
    assert_eq!(open.len(), 60);
    for order in &open {
        assert_eq!(order.user_id, MARKET_MAKER_ID);
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.status, OrderStatus::Pending);
    }
}

#[tokio::test]
async fn seeding_publishes_the_new_book() {
    let h = harness();
    let mut rx = h.events.subscribe();
    h.ipo.on_stock_listed(listing()).await.unwrap();

    let event = rx.try_recv().unwrap();
    match event {
        TradingEvent::OrderBookChanged {
            stock_id, best_ask, ..
        } => {
            assert_eq!(stock_id, STOCK);
            assert_eq!(best_ask, Some(BASE_PRICE));
        }
        other => panic!("expected a book change, got {other:?}"),
    }
}

#[tokio::test]
async fn a_funded_buyer_can_trade_immediately_after_listing() {
    let h = harness();
    h.ipo.on_stock_listed(listing()).await.unwrap();

    let settlement = Arc::new(SettlementHandler::new(
        h.trades.clone() as Arc<dyn TradeStore>,
        h.holdings.clone() as Arc<dyn HoldingStore>,
        h.balances.clone() as Arc<dyn BalanceStore>,
    ));
    let handler = OrderCommandHandler::new(
        h.orders.clone() as Arc<dyn OrderStore>,
        h.holdings.clone() as Arc<dyn HoldingStore>,
        h.balances.clone() as Arc<dyn BalanceStore>,
        h.registry.clone(),
        settlement,
        h.events.clone(),
        10,
    );

    let balance = InvestorBalance::new("buyer".to_string(), InvestorType::User, 10_000_000);
    h.balances.upsert(&balance).await.unwrap();

    let outcome = handler
        .place_order(PlaceOrder {
            user_id: "buyer".to_string(),
            stock_id: STOCK.to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Market,
            price: None,
            quantity: 500,
            investor_type: InvestorType::User,
        })
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Filled);
    assert!(!outcome.trades.is_empty());
    // The cheapest seeded level fills first.
    assert_eq!(outcome.trades[0].price, BASE_PRICE);
    assert_eq!(outcome.trades[0].seller_id, MARKET_MAKER_ID);
    assert_eq!(outcome.trades[0].seller_type, InvestorType::MarketMaker);
}

#[tokio::test]
async fn listings_with_bad_parameters_are_rejected() {
    let h = harness();

    let mut bad = listing();
    bad.base_price = 0;
    assert!(h.ipo.on_stock_listed(bad).await.is_err());

    let mut bad = listing();
    bad.total_shares = -1;
    assert!(h.ipo.on_stock_listed(bad).await.is_err());
}
