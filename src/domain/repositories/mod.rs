pub mod exchange_client;
pub mod trade_store;
