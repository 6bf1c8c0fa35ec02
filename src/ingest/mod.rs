//! Clients for the public blockchain-data APIs.
//!
//! Submodules:
//! - `http_json`: generic single-value source: GET, parse JSON, read one number.
//! - `etherscan`: internal transaction list for the monitored contract.
//! - `coingecko`: USD price of the pool's core token.

pub mod coingecko;
pub mod etherscan;
pub mod http_json;

use crate::model::FetchError;

/// One named provider of a single numeric metric.
///
/// `fetch` performs exactly one attempt. Retrying is the caller's job.
pub trait ValueSource {
    fn name(&self) -> &str;
    fn fetch(&self) -> Result<f64, FetchError>;
}

/// Builds the blocking HTTP client shared by every source.
pub fn build_client(timeout: std::time::Duration) -> Result<reqwest::blocking::Client, FetchError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("lpmon_service/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(FetchError::from)
}
