//! Source registry for the liquidity-pool monitor.
//!
//! Defines the canonical list of TVL data sources tried by the resilient
//! fetcher, in priority order. DexScreener's pool liquidity has proven more
//! reliable than the DeFiLlama protocol aggregate, so it is tried first.
//! This is the single source of truth for default endpoints; a config file
//! may replace the list wholesale.

use serde::{Deserialize, Serialize};

use crate::ingest::http_json::HttpJsonSource;
use crate::ingest::ValueSource;
use crate::model::{CHAIN, LP_POOL_ADDRESS};

// ---------------------------------------------------------------------------
// Source definitions
// ---------------------------------------------------------------------------

/// Whether a source is the protocol's authoritative figure or a proxy for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    Primary,
    Secondary,
}

/// One TVL endpoint: where to GET and which JSON field holds the number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDef {
    /// Short unique name; becomes the reading's source tag.
    pub name: String,
    pub url: String,
    /// RFC 6901 pointer to the numeric field. Empty for a bare-number body.
    #[serde(default)]
    pub json_pointer: String,
    #[serde(default = "default_role")]
    pub role: SourceRole,
}

fn default_role() -> SourceRole {
    SourceRole::Secondary
}

impl SourceDef {
    pub fn build(&self, client: &reqwest::blocking::Client) -> HttpJsonSource {
        HttpJsonSource::new(&self.name, &self.url, &self.json_pointer, client.clone())
    }
}

pub const DEXSCREENER: &str = "dexscreener";
pub const DEFILLAMA: &str = "defillama";

/// DexScreener pair endpoint for the monitored pool.
pub fn dexscreener_pair_url(chain: &str, pool_address: &str) -> String {
    format!(
        "https://api.dexscreener.io/latest/dex/pairs/{}/{}",
        chain,
        pool_address.to_lowercase()
    )
}

/// Default sources, highest priority first.
pub fn default_sources() -> Vec<SourceDef> {
    vec![
        SourceDef {
            name: DEXSCREENER.to_string(),
            url: dexscreener_pair_url(CHAIN, LP_POOL_ADDRESS),
            json_pointer: "/pair/liquidity/usd".to_string(),
            role: SourceRole::Secondary,
        },
        SourceDef {
            name: DEFILLAMA.to_string(),
            url: "https://api.llama.fi/protocol/uniswap-v3".to_string(),
            json_pointer: "/currentChainTvls/Ethereum".to_string(),
            role: SourceRole::Primary,
        },
    ]
}

/// Instantiates every definition, preserving order.
pub fn build_sources(
    defs: &[SourceDef],
    client: &reqwest::blocking::Client,
) -> Vec<Box<dyn ValueSource>> {
    defs.iter()
        .map(|def| Box::new(def.build(client)) as Box<dyn ValueSource>)
        .collect()
}

/// Returns the names of duplicated entries, in first-seen order.
pub fn duplicate_names(defs: &[SourceDef]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut dupes = Vec::new();
    for def in defs {
        if !seen.insert(def.name.as_str()) && !dupes.contains(&def.name) {
            dupes.push(def.name.clone());
        }
    }
    dupes
}

/// `true` for a `0x`-prefixed, 40 hex digit address.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
