//! Single-value JSON source.
//!
//! Each configured provider (DexScreener, DeFiLlama, ...) is one GET to a
//! fixed URL followed by extraction of one numeric field. The field is
//! addressed with an RFC 6901 JSON pointer such as `/pair/liquidity/usd`;
//! an empty pointer means the body itself is the number.

use serde_json::Value;

use crate::ingest::ValueSource;
use crate::model::FetchError;

pub struct HttpJsonSource {
    name: String,
    url: String,
    json_pointer: String,
    client: reqwest::blocking::Client,
}

impl HttpJsonSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        json_pointer: impl Into<String>,
        client: reqwest::blocking::Client,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            json_pointer: json_pointer.into(),
            client,
        }
    }
}

impl ValueSource for HttpJsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<f64, FetchError> {
        let body = get_text(&self.client, &self.url)?;
        extract_number(&body, &self.json_pointer)
    }
}

/// GET `url` and return the body of a 2xx response.
pub fn get_text(client: &reqwest::blocking::Client, url: &str) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    Ok(response.text()?)
}

/// Parses `body` as JSON and reads the number at `pointer`.
pub fn extract_number(body: &str, pointer: &str) -> Result<f64, FetchError> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let field = json
        .pointer(pointer)
        .ok_or_else(|| FetchError::MissingField(display_pointer(pointer)))?;

    match field {
        Value::Number(n) => n.as_f64().ok_or_else(|| FetchError::NonNumeric {
            field: display_pointer(pointer),
            found: n.to_string(),
        }),
        Value::Null => Err(FetchError::MissingField(display_pointer(pointer))),
        other => Err(FetchError::NonNumeric {
            field: display_pointer(pointer),
            found: truncate(&other.to_string(), 40),
        }),
    }
}

fn display_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "<body>".to_string()
    } else {
        pointer.to_string()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
