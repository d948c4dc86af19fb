use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::StakeDaoApiConfig;
use crate::error::SourceError;
use crate::model::Opportunity;
use crate::model::opportunity::sort_by_tvl_desc;

use super::YieldSource;

const CURVE_FALLBACK_URL: &str = "https://curve.fi";

// ── API response types ───────────────────────────────────────────────

/// One entry of the published strategies file. Numeric fields are kept as
/// raw JSON because the file is not strictly typed.
#[derive(Debug, Clone, Deserialize)]
pub struct Strategy {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tvl: Option<Value>,
    #[serde(default)]
    pub apr: Option<Value>,
    #[serde(default, rename = "minApr")]
    pub min_apr: Option<Value>,
    #[serde(default)]
    pub address: Option<Value>,
    #[serde(default)]
    pub gauge: Option<Value>,
}

impl Strategy {
    pub fn tvl_usd(&self) -> f64 {
        self.tvl
            .as_ref()
            .and_then(Value::as_f64)
            .filter(|t| t.is_finite())
            .unwrap_or(0.0)
    }

    /// `apr.current.total`, else `minApr`, else 0. Already a percentage.
    pub fn apr_pct(&self) -> f64 {
        self.apr
            .as_ref()
            .and_then(|a| a.pointer("/current/total"))
            .and_then(Value::as_f64)
            .or_else(|| self.min_apr.as_ref().and_then(Value::as_f64))
            .filter(|a| a.is_finite())
            .unwrap_or(0.0)
    }

    pub fn trimmed_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn deposit_url(&self) -> String {
        let pool = [&self.address, &self.gauge]
            .into_iter()
            .find_map(|v| v.as_ref().and_then(Value::as_str))
            .filter(|a| !a.is_empty());
        match pool {
            Some(addr) => format!("https://curve.fi/#/ethereum/pools/{addr}/deposit"),
            None => CURVE_FALLBACK_URL.to_string(),
        }
    }
}

// ── Selection ────────────────────────────────────────────────────────

/// Allowlisted strategies with positive TVL, one per name (the highest TVL
/// wins), sorted by TVL descending.
pub fn select_strategies(strategies: &[Strategy], pools: &[String]) -> Vec<Opportunity> {
    let allow: HashSet<&str> = pools.iter().map(String::as_str).collect();

    let mut kept: Vec<&Strategy> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for s in strategies {
        let Some(name) = s.trimmed_name() else { continue };
        if !allow.contains(name) || s.tvl_usd() <= 0.0 {
            continue;
        }
        match index.get(name) {
            Some(&i) if kept[i].tvl_usd() >= s.tvl_usd() => {}
            Some(&i) => kept[i] = s,
            None => {
                index.insert(name, kept.len());
                kept.push(s);
            }
        }
    }

    let mut rows: Vec<Opportunity> = kept
        .into_iter()
        .map(|s| Opportunity {
            protocol: "StakeDAO".to_string(),
            product: s.trimmed_name().unwrap_or_default().to_string(),
            tvl_usd: s.tvl_usd(),
            apy_pct: s.apr_pct(),
            url: s.deposit_url(),
        })
        .collect();
    sort_by_tvl_desc(&mut rows);
    rows
}

// ── Source ───────────────────────────────────────────────────────────

/// StakeDAO Curve strategies from the static JSON file StakeDAO publishes.
pub struct StakeDaoApiSource {
    client: reqwest::Client,
    config: StakeDaoApiConfig,
}

impl StakeDaoApiSource {
    pub fn new(client: reqwest::Client, config: StakeDaoApiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl YieldSource for StakeDaoApiSource {
    fn name(&self) -> &str {
        "stakedao-api"
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let body: Value = super::get_json(&self.client, &self.config.url).await?;
        let items = super::find_array(&body, &["strategies", "data"]).ok_or_else(|| {
            SourceError::Extraction("StakeDAO strategies file is not a list".into())
        })?;
        let strategies: Vec<Strategy> = super::decode_lenient(items);
        tracing::debug!(total = strategies.len(), "fetched StakeDAO strategies");

        Ok(select_strategies(&strategies, &self.config.pools))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strategies() -> Vec<Strategy> {
        let raw = json!([
            {"name": "ETH+/WETH", "tvl": 1_000_000.0, "apr": {"current": {"total": 7.5}}, "address": "0xaaa"},
            {"name": " ETH+/WETH ", "tvl": 4_000_000.0, "minApr": 3.0, "gauge": "0xbbb"},
            {"name": "msETH/WETH", "tvl": 2_000_000.0, "apr": {"current": {}}, "minApr": 4.4, "address": {"id": 1}},
            {"name": "alETH/WETH", "tvl": 0.0, "minApr": 9.0},
            {"name": "crvUSD/USDC", "tvl": 90_000_000.0, "minApr": 5.0},
            {"tvl": 5.0},
            {"name": "dgnETH/ETH+", "tvl": "lots"},
        ]);
        serde_json::from_value(raw).unwrap()
    }

    fn allowlist() -> Vec<String> {
        ["ETH+/WETH", "msETH/WETH", "alETH/WETH", "dgnETH/ETH+"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_dedupes_and_sorts() {
        let rows = select_strategies(&strategies(), &allowlist());
        let names: Vec<&str> = rows.iter().map(|r| r.product.as_str()).collect();
        assert_eq!(names, vec!["ETH+/WETH", "msETH/WETH"]);

        assert_eq!(rows[0].tvl_usd, 4_000_000.0);
        assert_eq!(rows[0].apy_pct, 3.0);
        assert_eq!(rows[0].url, "https://curve.fi/#/ethereum/pools/0xbbb/deposit");
    }

    #[test]
    fn test_apr_falls_back_to_min_apr() {
        let rows = select_strategies(&strategies(), &allowlist());
        assert_eq!(rows[1].apy_pct, 4.4);
        // non-string address and no gauge
        assert_eq!(rows[1].url, CURVE_FALLBACK_URL);
    }

    #[test]
    fn test_current_total_wins_over_min_apr() {
        let s: Strategy = serde_json::from_value(json!({
            "name": "x", "apr": {"current": {"total": 7.5}}, "minApr": 1.0
        }))
        .unwrap();
        assert_eq!(s.apr_pct(), 7.5);
    }
}
