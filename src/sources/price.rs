use serde_json::Value;

use crate::config::PriceConfig;
use crate::error::SourceError;
use crate::normalize::parse_numberish;

/// ETH/USD spot price, or the configured fallback when the API is unreachable
/// or returns something unusable.
pub async fn eth_usd(client: &reqwest::Client, config: &PriceConfig) -> f64 {
    match fetch_eth_usd(client, &config.url).await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!(error = %e, fallback = config.fallback_usd, "ETH price unavailable, using fallback");
            config.fallback_usd
        }
    }
}

async fn fetch_eth_usd(client: &reqwest::Client, url: &str) -> Result<f64, SourceError> {
    let body: Value = super::get_json(client, url).await?;
    parse_eth_usd(&body)
        .ok_or_else(|| SourceError::Extraction("ethereum.usd missing from price response".into()))
}

/// Reads `{"ethereum": {"usd": <price>}}`; the price must be positive.
pub fn parse_eth_usd(body: &Value) -> Option<f64> {
    body.pointer("/ethereum/usd")
        .and_then(parse_numberish)
        .filter(|p| *p > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_eth_usd() {
        assert_eq!(parse_eth_usd(&json!({"ethereum": {"usd": 3521.4}})), Some(3521.4));
        assert_eq!(parse_eth_usd(&json!({"ethereum": {"usd": "3,521.40"}})), Some(3521.4));
        assert_eq!(parse_eth_usd(&json!({"ethereum": {"usd": 0}})), None);
        assert_eq!(parse_eth_usd(&json!({"status": {"error_code": 429}})), None);
    }
}
