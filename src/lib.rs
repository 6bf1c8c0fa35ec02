//! Liquidity-pool risk monitor.
//!
//! Polls public blockchain-data APIs for one liquidity-pool contract, derives
//! fund outflow, liquidity change and transaction failure ratios, and raises
//! threshold alerts. TVL is read through `fetcher::ResilientValueFetcher`,
//! which retries, validates and falls back so callers always get a value.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod dev_mode;
pub mod fetcher;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod retry;
pub mod sources;
pub mod verify;
