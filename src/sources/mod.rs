pub mod defillama;
pub mod evm;
pub mod origin;
pub mod pendle;
pub mod price;
pub mod stakedao_api;
pub mod stakedao_pages;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{Config, HttpConfig};
use crate::error::SourceError;
use crate::model::Opportunity;

// ── Source trait ─────────────────────────────────────────────────────

/// One upstream integration producing canonical opportunities.
///
/// Implementations own their partial-failure policy: a source with a fixed
/// catalog may return placeholders for entries it could not load, and a
/// paginated source may return what it collected before a page failed.
/// An `Err` means the source produced nothing usable this round.
#[async_trait]
pub trait YieldSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError>;
}

/// Instantiate every enabled source, in output order.
pub fn build_sources(config: &Config, client: &reqwest::Client) -> Vec<Arc<dyn YieldSource>> {
    let mut sources: Vec<Arc<dyn YieldSource>> = Vec::new();

    if config.defillama.enabled {
        sources.push(Arc::new(defillama::DefiLlamaSource::new(
            client.clone(),
            config.defillama.clone(),
        )));
    }
    if config.stakedao_pages.enabled {
        sources.push(Arc::new(stakedao_pages::StakeDaoPagesSource::new(
            client.clone(),
            config.stakedao_pages.clone(),
            config.thresholds.clone(),
        )));
    }
    if config.stakedao_api.enabled {
        sources.push(Arc::new(stakedao_api::StakeDaoApiSource::new(
            client.clone(),
            config.stakedao_api.clone(),
        )));
    }
    if config.pendle.enabled {
        sources.push(Arc::new(pendle::PendleSource::new(
            client.clone(),
            config.pendle.clone(),
        )));
    }
    if config.origin.enabled {
        sources.push(Arc::new(origin::OriginArmSource::new(
            client.clone(),
            config.origin.clone(),
            config.defillama.url.clone(),
            config.price.clone(),
            config.http.request_timeout(),
        )));
    }

    sources
}

// ── HTTP helpers ─────────────────────────────────────────────────────

/// Shared client: every request is bounded by the configured timeout.
pub fn build_client(http: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(http.request_timeout())
        .user_agent(http.user_agent.clone())
        .build()
        .context("creating HTTP client")
}

/// GET a URL and decode its body as JSON.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, SourceError> {
    let body = get_body(client, url, "application/json").await?;
    serde_json::from_str(&body).map_err(|e| SourceError::Parse(format!("{url}: {e}")))
}

/// GET a URL and return its body as text.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, SourceError> {
    get_body(client, url, "text/html,application/xhtml+xml,*/*").await
}

async fn get_body(client: &reqwest::Client, url: &str, accept: &str) -> Result<String, SourceError> {
    let resp = client
        .get(url)
        .header(ACCEPT, accept)
        .send()
        .await
        .map_err(|e| SourceError::network(url, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::network(url, format!("HTTP {status}")));
    }

    resp.text().await.map_err(|e| SourceError::network(url, e))
}

/// The list inside a response that is either a bare array or an object
/// holding the array under one of `keys`.
pub fn find_array<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Value::Array(items) = body {
        return Some(items);
    }
    keys.iter().find_map(|k| body.get(*k).and_then(Value::as_array))
}

/// Deserialize each element independently, dropping the ones that do not fit.
pub fn decode_lenient<T: DeserializeOwned>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_array_shapes() {
        let bare = json!([1, 2]);
        assert_eq!(find_array(&bare, &["results"]).map(Vec::len), Some(2));

        let wrapped = json!({"total": 3, "results": [1, 2, 3]});
        assert_eq!(find_array(&wrapped, &["markets", "results"]).map(Vec::len), Some(3));

        let other = json!({"items": [1]});
        assert!(find_array(&other, &["markets", "results"]).is_none());
    }

    #[test]
    fn test_decode_lenient_skips_bad_items() {
        #[derive(serde::Deserialize)]
        struct Row {
            id: u32,
        }
        let items = vec![json!({"id": 1}), json!({"id": "x"}), json!({"id": 3})];
        let rows: Vec<Row> = decode_lenient(&items);
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
    }
}
