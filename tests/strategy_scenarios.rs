//! End-to-end scenarios across crate boundaries: position/ladder/trailing-stop
//! interplay, credential round-tripping, and trade persistence through the
//! public `TradeStore` trait object.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use upbit_trading_bot::domain::entities::ledger::{TradeQuery, TradeRecord};
use upbit_trading_bot::domain::entities::order::OrderSide;
use upbit_trading_bot::domain::repositories::trade_store::TradeStore;
use upbit_trading_bot::domain::services::partial_sell_ladder::PartialSellLadder;
use upbit_trading_bot::domain::services::position_manager::PositionManager;
use upbit_trading_bot::domain::services::trailing_stop::TrailingStopTracker;
use upbit_trading_bot::infrastructure::credential_store;
use upbit_trading_bot::persistence::{self, repository::TradeRepository};

#[test]
fn credential_blob_round_trips_through_the_public_api() {
    let blob = credential_store::encrypt("correct horse battery staple", "my-access", "my-secret")
        .expect("encrypt should succeed");

    let (access_key, secret_key) =
        credential_store::decrypt("correct horse battery staple", &blob).expect("decrypt should succeed");

    assert_eq!(access_key.as_str(), "my-access");
    assert_eq!(secret_key.as_str(), "my-secret");
}

#[test]
fn credential_blob_rejects_wrong_password() {
    let blob = credential_store::encrypt("the-real-password", "access", "secret").unwrap();
    assert!(credential_store::decrypt("wrong-password", &blob).is_err());
}

/// A buy, two profit-driven partial sells, and a trailing-stop exit on the
/// remainder — driven entirely through the public position/ladder/trailing
/// modules, the way the monitoring loop would.
#[test]
fn position_ladder_and_trailing_stop_interplay_across_a_price_run() {
    let positions = PositionManager::new();
    let mut ladder = PartialSellLadder::new(dec!(2.0));
    let mut trailing_stop = TrailingStopTracker::new(dec!(1.0), dec!(1.0));

    positions.add_initial("KRW-BTC", dec!(100_000_000), dec!(1)).unwrap();

    // Price climbs past L1 (1% of target) -> sell 30%.
    let pnl = positions.pnl("KRW-BTC", dec!(101_000_000)).unwrap();
    let ratio = ladder.should_partial_sell(pnl.pnl_rate);
    assert_eq!(ratio, Some(dec!(0.30)));
    let sell_qty = PartialSellLadder::calculate_sell_quantity(dec!(1), ratio.unwrap());
    let position = positions.partial_sell("KRW-BTC", sell_qty, dec!(101_000_000)).unwrap();
    assert_eq!(position.total_quantity, dec!(0.70));

    if trailing_stop.should_activate(pnl.pnl_rate) {
        trailing_stop.activate(dec!(101_000_000));
    }
    assert!(trailing_stop.is_armed());

    // Price climbs further past L2 (2% of target) -> sell 50% of the original.
    let pnl = positions.pnl("KRW-BTC", dec!(102_500_000)).unwrap();
    trailing_stop.update_high_water(dec!(102_500_000));
    let ratio = ladder.should_partial_sell(pnl.pnl_rate);
    assert_eq!(ratio, Some(dec!(0.50)));
    let sell_qty = PartialSellLadder::calculate_sell_quantity(dec!(1), ratio.unwrap());
    let position = positions.partial_sell("KRW-BTC", sell_qty, dec!(102_500_000)).unwrap();
    assert_eq!(position.total_quantity, dec!(0.20));

    // Price reverses enough to trip the 1% trailing stop off the high water mark.
    let retreat_price = dec!(102_500_000) * (Decimal::ONE - dec!(0.011));
    assert!(trailing_stop.should_trigger_stop(retreat_price));

    let remaining = positions.get("KRW-BTC").unwrap().total_quantity;
    assert_eq!(remaining, dec!(0.20));
    positions.partial_sell("KRW-BTC", remaining, retreat_price).unwrap();
    assert!(positions.get("KRW-BTC").is_none());
}

#[tokio::test]
async fn trade_store_records_and_filters_through_the_trait_object() {
    let pool = persistence::init_database("sqlite::memory:").await.unwrap();
    let store: Arc<dyn TradeStore> = Arc::new(TradeRepository::new(pool));

    store
        .insert_trade(&TradeRecord {
            market: "KRW-BTC".to_string(),
            side: OrderSide::Bid,
            price: dec!(100_000_000),
            volume: dec!(0.3),
            fee: dec!(15000),
            timestamp: Utc::now(),
            strategy_id: Some("upbit-single-market".to_string()),
        })
        .await
        .unwrap();

    store
        .insert_trade(&TradeRecord {
            market: "KRW-ETH".to_string(),
            side: OrderSide::Ask,
            price: dec!(4_000_000),
            volume: dec!(1.0),
            fee: dec!(2000),
            timestamp: Utc::now(),
            strategy_id: None,
        })
        .await
        .unwrap();

    let btc_trades = store
        .get_trades(TradeQuery {
            market: Some("KRW-BTC".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(btc_trades.len(), 1);
    assert_eq!(btc_trades[0].side, OrderSide::Bid);
    assert_eq!(btc_trades[0].strategy_id.as_deref(), Some("upbit-single-market"));
}
