//! Upbit trading bot — core library.
//!
//! A single-exchange position/ladder/trailing-stop trading core built
//! against the Upbit REST API.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod secrets;
pub mod task_runner;
