pub mod credential_store;
pub mod rate_limiter;
pub mod upbit_client;
