use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use crate::config::{StakeDaoPagesConfig, Thresholds, VaultPick};
use crate::error::SourceError;
use crate::extract::scanner::{Metrics, select_metrics};
use crate::extract::{MetricScanner, extract_next_data};
use crate::model::Opportunity;

use super::YieldSource;

/// StakeDAO strategy pages scraped through their embedded `__NEXT_DATA__`.
///
/// The vault list is fixed, so every vault always yields a row: one that
/// cannot be loaded or scanned is reported with zeroed metrics.
pub struct StakeDaoPagesSource {
    client: reqwest::Client,
    config: StakeDaoPagesConfig,
    thresholds: Thresholds,
    scanner: MetricScanner,
}

impl StakeDaoPagesSource {
    pub fn new(client: reqwest::Client, config: StakeDaoPagesConfig, thresholds: Thresholds) -> Self {
        let scanner = MetricScanner::new(&thresholds);
        Self {
            client,
            config,
            thresholds,
            scanner,
        }
    }

    async fn fetch_vault(&self, vault: &VaultPick) -> Result<Metrics, SourceError> {
        let url = page_url(&self.config.base_url, vault)?;
        let html = super::get_text(&self.client, &url).await?;
        extract_metrics(&html, &self.scanner, &self.thresholds)
    }
}

pub fn page_url(base_url: &str, vault: &VaultPick) -> Result<String, SourceError> {
    reqwest::Url::parse_with_params(
        base_url,
        &[
            ("protocol", vault.protocol_param.as_str()),
            ("vault", vault.vault_param.as_str()),
        ],
    )
    .map(String::from)
    .map_err(|e| SourceError::Validation(format!("invalid page URL {base_url}: {e}")))
}

/// Where the vault data lives in the page payload: each non-null
/// `props.pageProps.dehydratedState.queries[*].state.data`, or the whole
/// document when the page carries no dehydrated query cache.
pub fn scan_roots(doc: &Value) -> Vec<&Value> {
    match doc
        .pointer("/props/pageProps/dehydratedState/queries")
        .and_then(Value::as_array)
    {
        Some(queries) => queries
            .iter()
            .filter_map(|q| q.pointer("/state/data"))
            .filter(|d| !d.is_null())
            .collect(),
        None => vec![doc],
    }
}

pub fn extract_metrics(
    html: &str,
    scanner: &MetricScanner,
    thresholds: &Thresholds,
) -> Result<Metrics, SourceError> {
    let doc = extract_next_data(html)?;
    let candidates = scanner.scan_all(scan_roots(&doc));
    Ok(select_metrics(&candidates, thresholds))
}

#[async_trait]
impl YieldSource for StakeDaoPagesSource {
    fn name(&self) -> &str {
        "stakedao-pages"
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let results = join_all(self.config.vaults.iter().map(|v| self.fetch_vault(v))).await;

        let rows = self
            .config
            .vaults
            .iter()
            .zip(results)
            .map(|(vault, result)| {
                let mut row = Opportunity::placeholder(&vault.protocol, &vault.product, &vault.url);
                match result {
                    Ok(metrics) => {
                        row.tvl_usd = metrics.tvl_usd.unwrap_or(0.0);
                        row.apy_pct = metrics.apy_pct.unwrap_or(0.0);
                    }
                    Err(e) => {
                        tracing::warn!(product = %vault.product, error = %e, "vault page failed, using placeholder");
                    }
                }
                row
            })
            .collect();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(payload: &Value) -> String {
        format!(
            r#"<html><body><script id="__NEXT_DATA__" type="application/json">{payload}</script></body></html>"#
        )
    }

    #[test]
    fn test_page_url_encodes_params() {
        let vault = VaultPick {
            protocol: "StakeDAO".into(),
            product: "ETH+ / wETH".into(),
            protocol_param: "curve".into(),
            vault_param: "1-0xabc&x=1".into(),
            url: String::new(),
        };
        let url = page_url("https://www.stakedao.org/strategy", &vault).unwrap();
        assert_eq!(
            url,
            "https://www.stakedao.org/strategy?protocol=curve&vault=1-0xabc%26x%3D1"
        );
    }

    #[test]
    fn test_page_url_rejects_invalid_base() {
        let vault = VaultPick {
            protocol: "StakeDAO".into(),
            product: "ETH+ / wETH".into(),
            protocol_param: "curve".into(),
            vault_param: "1-0xabc".into(),
            url: String::new(),
        };
        let err = page_url("not a url", &vault).unwrap_err();
        assert!(matches!(err, SourceError::Validation(_)), "{err:?}");
    }

    #[test]
    fn test_scan_roots_prefers_query_cache() {
        let doc = json!({
            "props": {"pageProps": {"dehydratedState": {"queries": [
                {"state": {"data": {"tvl": 1}}},
                {"state": {"data": null}},
                {"state": {}},
                {"state": {"data": {"apr": 2}}},
            ]}}},
        });
        let roots = scan_roots(&doc);
        assert_eq!(roots, vec![&json!({"tvl": 1}), &json!({"apr": 2})]);

        let flat = json!({"tvl": 5});
        assert_eq!(scan_roots(&flat), vec![&flat]);
    }

    #[test]
    fn test_extract_metrics_from_page() {
        let payload = json!({
            "props": {
                "pageProps": {
                    "_nextI18Next": {"store": {"tvlLabel": "999999999"}},
                    "dehydratedState": {"queries": [
                        {"state": {"data": {
                            "id": 123456789,
                            "tvl": 2_450_000.75,
                            "underlyingValue": "$310,000",
                            "apr": {"current": {"total": 6.4}, "boost": 2.5},
                            "projectedApr": 250.0,
                            "rate": "3.2%",
                        }}},
                    ]},
                },
            },
        });
        let thresholds = Thresholds::default();
        let scanner = MetricScanner::new(&thresholds);
        let m = extract_metrics(&wrap(&payload), &scanner, &thresholds).unwrap();
        assert_eq!(m.tvl_usd, Some(2_450_000.75));
        assert_eq!(m.apy_pct, Some(3.2));
    }

    #[test]
    fn test_extract_metrics_missing_payload() {
        let thresholds = Thresholds::default();
        let scanner = MetricScanner::new(&thresholds);
        let err = extract_metrics("<html></html>", &scanner, &thresholds).unwrap_err();
        assert!(matches!(err, SourceError::Extraction(_)));
    }
}
