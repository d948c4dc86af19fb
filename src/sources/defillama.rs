use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{DefiLlamaConfig, LlamaPick};
use crate::error::SourceError;
use crate::model::Opportunity;

use super::YieldSource;

// ── API response types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pool {
    #[serde(default)]
    pub pool: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "tvlUsd")]
    pub tvl_usd: Option<f64>,
    pub apy: Option<f64>,
    #[serde(rename = "apyBase")]
    pub apy_base: Option<f64>,
    #[serde(rename = "apyReward")]
    pub apy_reward: Option<f64>,
}

impl Pool {
    pub fn tvl(&self) -> f64 {
        self.tvl_usd.filter(|t| t.is_finite()).unwrap_or(0.0)
    }
}

/// Fetch the full DefiLlama pool listing. Pools that do not decode are dropped.
pub async fn fetch_pools(client: &reqwest::Client, url: &str) -> Result<Vec<Pool>, SourceError> {
    let resp: PoolsResponse = super::get_json(client, url).await?;
    Ok(super::decode_lenient(&resp.data))
}

// ── Selection ────────────────────────────────────────────────────────

/// Highest-TVL pool matching a pick: same project and chain, symbol containing
/// every required fragment, positive TVL and a finite APY.
pub fn pick_best_pool<'a>(pools: &'a [Pool], pick: &LlamaPick) -> Option<&'a Pool> {
    let project = pick.project.to_lowercase();
    let chain = pick.chain.to_lowercase();
    let fragments: Vec<String> = pick.symbol_includes.iter().map(|s| s.to_lowercase()).collect();

    pools
        .iter()
        .filter(|p| p.project.to_lowercase() == project)
        .filter(|p| p.chain.to_lowercase() == chain)
        .filter(|p| {
            let symbol = p.symbol.to_lowercase();
            fragments.iter().all(|f| symbol.contains(f.as_str()))
        })
        .filter(|p| p.tvl() > 0.0)
        .filter(|p| p.apy.is_some_and(f64::is_finite))
        .fold(None, |best: Option<&Pool>, p| match best {
            Some(b) if b.tvl() >= p.tvl() => Some(b),
            _ => Some(p),
        })
}

// ── Source ───────────────────────────────────────────────────────────

/// Liquid-staking rows read straight off the DefiLlama yields listing.
pub struct DefiLlamaSource {
    client: reqwest::Client,
    config: DefiLlamaConfig,
}

impl DefiLlamaSource {
    pub fn new(client: reqwest::Client, config: DefiLlamaConfig) -> Self {
        Self { client, config }
    }
}

pub fn select_picks(pools: &[Pool], picks: &[LlamaPick]) -> Vec<Opportunity> {
    picks
        .iter()
        .filter_map(|pick| {
            let Some(pool) = pick_best_pool(pools, pick) else {
                tracing::info!(project = %pick.project, product = %pick.product, "no matching DefiLlama pool");
                return None;
            };
            Some(Opportunity {
                protocol: pick.protocol.clone(),
                product: pick.product.clone(),
                tvl_usd: pool.tvl(),
                apy_pct: pool.apy.unwrap_or(0.0),
                url: pick.url.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl YieldSource for DefiLlamaSource {
    fn name(&self) -> &str {
        "defillama"
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let pools = fetch_pools(&self.client, &self.config.url).await?;
        tracing::debug!(pools = pools.len(), "fetched DefiLlama pools");
        Ok(select_picks(&pools, &self.config.picks))
    }
}
