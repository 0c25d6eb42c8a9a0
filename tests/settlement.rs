use std::sync::Arc;

use chrono::Utc;
use exchange_core::handlers::SettlementHandler;
use exchange_core::persistence::{
    BalanceStore, HoldingStore, MemoryBalanceStore, MemoryHoldingStore, MemoryTradeStore,
    TradeStore,
};
use exchange_core::types::order::{InvestorType, Price, Qty};
use exchange_core::types::portfolio::{Holding, InvestorBalance};
use exchange_core::types::trade::Trade;
use uuid::Uuid;

const STOCK: &str = "SSE-1";

struct Harness {
    trades: Arc<MemoryTradeStore>,
    holdings: Arc<MemoryHoldingStore>,
    balances: Arc<MemoryBalanceStore>,
    handler: SettlementHandler,
}

fn harness() -> Harness {
    let trades = Arc::new(MemoryTradeStore::new());
    let holdings = Arc::new(MemoryHoldingStore::new());
    let balances = Arc::new(MemoryBalanceStore::new());
    let handler = SettlementHandler::new(
        trades.clone() as Arc<dyn TradeStore>,
        holdings.clone() as Arc<dyn HoldingStore>,
        balances.clone() as Arc<dyn BalanceStore>,
    );
    Harness {
        trades,
        holdings,
        balances,
        handler,
    }
}

fn trade(buyer: &str, seller: &str, price: Price, quantity: Qty) -> Trade {
    Trade {
        id: Uuid::new_v4(),
        buy_order_id: Uuid::new_v4(),
        sell_order_id: Uuid::new_v4(),
        buyer_id: buyer.to_string(),
        buyer_type: InvestorType::User,
        seller_id: seller.to_string(),
        seller_type: InvestorType::User,
        stock_id: STOCK.to_string(),
        price,
        quantity,
        traded_at: Utc::now(),
    }
}

async fn fund(h: &Harness, investor: &str, cash: i64) {
    let balance = InvestorBalance::new(investor.to_string(), InvestorType::User, cash);
    h.balances.upsert(&balance).await.unwrap();
}

async fn grant(h: &Harness, investor: &str, quantity: Qty, price: Price) {
    let holding = Holding::with_quantity(
        investor.to_string(),
        InvestorType::User,
        STOCK.to_string(),
        quantity,
        price,
    );
    h.holdings.upsert(&holding).await.unwrap();
}

async fn cash_of(h: &Harness, investor: &str) -> i64 {
    h.balances
        .find(investor, InvestorType::User)
        .await
        .unwrap()
        .unwrap()
        .cash
}

async fn holding_of(h: &Harness, investor: &str) -> Holding {
    h.holdings
        .find(investor, InvestorType::User, STOCK)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn settlement_conserves_cash_and_shares() {
    let h = harness();
    fund(&h, "buyer", 1_000_000).await;
    fund(&h, "seller", 100_000).await;
    grant(&h, "seller", 200, 4_000).await;

    h.handler
        .settle_trade(&trade("buyer", "seller", 5_000, 100))
        .await
        .unwrap();

    assert_eq!(cash_of(&h, "buyer").await, 500_000);
    assert_eq!(cash_of(&h, "seller").await, 600_000);
    assert_eq!(holding_of(&h, "buyer").await.quantity, 100);
    assert_eq!(holding_of(&h, "seller").await.quantity, 100);
    assert_eq!(h.trades.len().await, 1);
}

#[tokio::test]
async fn buyer_average_price_is_volume_weighted() {
    let h = harness();
    fund(&h, "buyer", 10_000_000).await;
    fund(&h, "seller", 0).await;
    grant(&h, "seller", 300, 4_000).await;

    h.handler
        .settle_trade(&trade("buyer", "seller", 5_000, 100))
        .await
        .unwrap();
    h.handler
        .settle_trade(&trade("buyer", "seller", 6_000, 100))
        .await
        .unwrap();

    let holding = holding_of(&h, "buyer").await;
    assert_eq!(holding.quantity, 200);
    assert_eq!(holding.average_price, 5_500);
    assert_eq!(holding.total_invested, 1_100_000);
}

#[tokio::test]
async fn selling_down_to_zero_clears_the_cost_basis() {
    let h = harness();
    fund(&h, "buyer", 1_000_000).await;
    fund(&h, "seller", 0).await;
    grant(&h, "seller", 100, 4_000).await;

    h.handler
        .settle_trade(&trade("buyer", "seller", 5_000, 100))
        .await
        .unwrap();

    let holding = holding_of(&h, "seller").await;
    assert_eq!(holding.quantity, 0);
    assert_eq!(holding.total_invested, 0);
    assert_eq!(holding.average_price, 4_000);
}

#[tokio::test]
async fn insufficient_cash_skips_the_debit_but_delivers_the_shares() {
    let h = harness();
    fund(&h, "buyer", 100).await;
    fund(&h, "seller", 0).await;
    grant(&h, "seller", 100, 4_000).await;

    h.handler
        .settle_trade(&trade("buyer", "seller", 5_000, 100))
        .await
        .unwrap();

    // Shares moved, the debit was skipped; nothing went negative.
    assert_eq!(holding_of(&h, "buyer").await.quantity, 100);
    assert_eq!(cash_of(&h, "buyer").await, 100);
    assert_eq!(cash_of(&h, "seller").await, 500_000);
}

#[tokio::test]
async fn insufficient_holdings_skip_the_decrement_but_credit_the_cash() {
    let h = harness();
    fund(&h, "buyer", 1_000_000).await;
    fund(&h, "seller", 0).await;
    grant(&h, "seller", 10, 4_000).await;

    h.handler
        .settle_trade(&trade("buyer", "seller", 5_000, 100))
        .await
        .unwrap();

    assert_eq!(holding_of(&h, "seller").await.quantity, 10);
    assert_eq!(cash_of(&h, "seller").await, 500_000);
    assert_eq!(cash_of(&h, "buyer").await, 500_000);
}

#[tokio::test]
async fn missing_balance_rows_never_fail_settlement() {
    let h = harness();
    grant(&h, "seller", 100, 4_000).await;

    // Neither party has a balance row; settlement still records the trade
    // and moves the shares.
    h.handler
        .settle_trade(&trade("buyer", "seller", 5_000, 100))
        .await
        .unwrap();

    assert_eq!(holding_of(&h, "buyer").await.quantity, 100);
    assert_eq!(holding_of(&h, "seller").await.quantity, 0);
    assert_eq!(h.trades.len().await, 1);
}

#[tokio::test]
async fn redelivered_trades_settle_exactly_once() {
    let h = harness();
    fund(&h, "buyer", 1_000_000).await;
    fund(&h, "seller", 0).await;
    grant(&h, "seller", 100, 4_000).await;

    let t = trade("buyer", "seller", 5_000, 100);
    h.handler.settle_trade(&t).await.unwrap();
    h.handler.settle_trade(&t).await.unwrap();

    assert_eq!(h.trades.len().await, 1);
    assert_eq!(cash_of(&h, "buyer").await, 500_000);
    assert_eq!(cash_of(&h, "seller").await, 500_000);
    assert_eq!(holding_of(&h, "buyer").await.quantity, 100);
}

#[tokio::test]
async fn ensure_balance_initializes_once() {
    let h = harness();

    h.handler
        .ensure_balance("npc-7", InvestorType::Npc, 2_000_000)
        .await
        .unwrap();
    let cash = h
        .balances
        .find("npc-7", InvestorType::Npc)
        .await
        .unwrap()
        .unwrap()
        .cash;
    assert_eq!(cash, 2_000_000);

    // A second call never resets an existing balance.
    h.handler
        .ensure_balance("npc-7", InvestorType::Npc, 9_000_000)
        .await
        .unwrap();
    let cash = h
        .balances
        .find("npc-7", InvestorType::Npc)
        .await
        .unwrap()
        .unwrap()
        .cash;
    assert_eq!(cash, 2_000_000);
}
