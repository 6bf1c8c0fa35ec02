//! Etherscan API client
//!
//! Retrieves the most recent internal transactions touching the monitored
//! contract. Used by the fund outflow and failure rate ratios.
//!
//! API Documentation: https://docs.etherscan.io/api-endpoints/accounts

use serde::Deserialize;
use serde_json::Value;

use crate::ingest::http_json::get_text;
use crate::model::FetchError;

const ETHERSCAN_BASE_URL: &str = "https://api.etherscan.io/api";

/// How many transactions one request asks for.
pub const PAGE_SIZE: u32 = 50;

// ============================================================================
// Response Structures
// ============================================================================

/// Envelope of every Etherscan account endpoint. `result` is an array on
/// success and a plain string ("Max rate limit reached", "Invalid API Key")
/// otherwise, so it stays untyped here.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    #[serde(default)]
    result: Value,
}

/// One internal transaction. Etherscan encodes every field as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InternalTx {
    #[serde(rename = "timeStamp", default)]
    pub time_stamp: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(rename = "isError", default = "default_is_error")]
    pub is_error: String,
}

fn default_is_error() -> String {
    "0".to_string()
}

impl InternalTx {
    /// Unix timestamp in seconds, if the field is numeric.
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.time_stamp.trim().parse().ok()
    }

    /// Transferred value in ether (wei / 1e18), if the field is numeric.
    pub fn value_eth(&self) -> Option<f64> {
        self.value.trim().parse::<u128>().ok().map(|wei| wei as f64 / 1e18)
    }

    pub fn failed(&self) -> bool {
        self.is_error == "1"
    }
}

// ============================================================================
// API Client Functions
// ============================================================================

pub fn build_txlist_url(contract: &str, api_key: &str) -> String {
    format!(
        "{}?module=account&action=txlistinternal&address={}&sort=desc&offset={}&apikey={}",
        ETHERSCAN_BASE_URL, contract, PAGE_SIZE, api_key
    )
}

/// Fetch the latest internal transactions for `contract`.
///
/// One attempt, no retry. An error envelope from Etherscan yields an empty
/// list rather than an error, matching how the ratios treat "no data".
pub fn fetch_internal_transactions(
    client: &reqwest::blocking::Client,
    contract: &str,
    api_key: &str,
) -> Result<Vec<InternalTx>, FetchError> {
    let url = build_txlist_url(contract, api_key);
    let body = get_text(client, &url)?;
    parse_txlist_response(&body)
}

/// Parses the Etherscan envelope. Entries that are not objects, or objects
/// that do not decode, are skipped.
pub fn parse_txlist_response(body: &str) -> Result<Vec<InternalTx>, FetchError> {
    let envelope: EtherscanResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let Value::Array(entries) = envelope.result else {
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|entry| serde_json::from_value::<InternalTx>(entry).ok())
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
