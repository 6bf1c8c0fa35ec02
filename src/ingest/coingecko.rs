//! CoinGecko price client.
//!
//! Looks up the USD price of an ERC-20 token by contract address. The
//! response is keyed by the lowercased address:
//! `{"0xa0b8...eb48": {"usd": 0.9998}}`.

use serde_json::Value;

use crate::ingest::http_json::get_text;
use crate::model::FetchError;

const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Price assumed when the lookup fails. The core token is a USD stablecoin.
pub const FALLBACK_PRICE_USD: f64 = 1.0;

pub fn build_price_url(chain: &str, token: &str) -> String {
    format!(
        "{}/simple/token_price/{}?contract_addresses={}&vs_currencies=usd",
        COINGECKO_BASE_URL, chain, token
    )
}

pub fn fetch_token_price(
    client: &reqwest::blocking::Client,
    chain: &str,
    token: &str,
) -> Result<f64, FetchError> {
    let body = get_text(client, &build_price_url(chain, token))?;
    parse_price_response(&body, token)
}

pub fn parse_price_response(body: &str, token: &str) -> Result<f64, FetchError> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    let key = token.to_lowercase();

    json.get(&key)
        .and_then(|entry| entry.get("usd"))
        .ok_or_else(|| FetchError::MissingField(format!("{}.usd", key)))?
        .as_f64()
        .ok_or_else(|| FetchError::NonNumeric {
            field: format!("{}.usd", key),
            found: json[&key]["usd"].to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CORE_TOKEN;

    #[test]
    fn test_price_is_read_under_lowercased_address() {
        let body = r#"{"0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48": {"usd": 0.9997}}"#;
        assert_eq!(parse_price_response(body, CORE_TOKEN), Ok(0.9997));
    }

    #[test]
    fn test_empty_object_is_missing_field() {
        let err = parse_price_response("{}", CORE_TOKEN).unwrap_err();
        assert!(matches!(err, FetchError::MissingField(_)));
    }

    #[test]
    fn test_url_names_chain_and_token() {
        let url = build_price_url("ethereum", CORE_TOKEN);
        assert!(url.contains("/simple/token_price/ethereum?"));
        assert!(url.contains(CORE_TOKEN));
        assert!(url.ends_with("vs_currencies=usd"));
    }
}
