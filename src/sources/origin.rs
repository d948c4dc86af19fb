use std::time::Duration;

use async_trait::async_trait;

use crate::config::{OriginConfig, PriceConfig};
use crate::error::SourceError;
use crate::model::Opportunity;
use crate::normalize::as_pct;

use super::defillama::{self, Pool};
use super::{YieldSource, evm, price};

/// Origin ARM WETH-stETH vault.
///
/// TVL is derived on-chain (`totalAssets()` × ETH/USD); the APY comes from
/// the DefiLlama listing. DefiLlama's TVL stands in when the RPC read fails.
pub struct OriginArmSource {
    client: reqwest::Client,
    config: OriginConfig,
    pools_url: String,
    price: PriceConfig,
    rpc_timeout: Duration,
}

impl OriginArmSource {
    pub fn new(
        client: reqwest::Client,
        config: OriginConfig,
        pools_url: String,
        price: PriceConfig,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            client,
            config,
            pools_url,
            price,
            rpc_timeout,
        }
    }

    async fn onchain_tvl(&self) -> Result<f64, SourceError> {
        let assets =
            evm::total_assets(&self.config.rpc_url, &self.config.arm_address, self.rpc_timeout).await?;
        let eth = evm::from_token_units(assets, self.config.decimals);
        if eth <= 0.0 {
            return Err(SourceError::Validation("ARM reports zero total assets".into()));
        }
        let eth_usd = price::eth_usd(&self.client, &self.price).await;
        Ok(eth * eth_usd)
    }

    async fn llama_pool(&self) -> Result<Option<Pool>, SourceError> {
        let pools = defillama::fetch_pools(&self.client, &self.pools_url).await?;
        Ok(find_arm_pool(&pools).cloned())
    }
}

/// The ARM pool: project mentions both "origin" and "arm", Ethereum chain,
/// a WETH or stETH symbol, positive TVL.
pub fn find_arm_pool(pools: &[Pool]) -> Option<&Pool> {
    pools.iter().find(|p| {
        let project = p.project.to_lowercase();
        let symbol = p.symbol.to_lowercase();
        project.contains("origin")
            && project.contains("arm")
            && p.chain.eq_ignore_ascii_case("ethereum")
            && (symbol.contains("weth") || symbol.contains("steth"))
            && p.tvl() > 0.0
    })
}

/// Base (or headline) APY plus rewards, normalized to a percentage.
pub fn arm_apy_pct(pool: &Pool) -> f64 {
    let base = pool.apy.or(pool.apy_base).unwrap_or(0.0);
    as_pct(base + pool.apy_reward.unwrap_or(0.0))
}

#[async_trait]
impl YieldSource for OriginArmSource {
    fn name(&self) -> &str {
        "origin-arm"
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let (onchain, pool) = tokio::join!(self.onchain_tvl(), self.llama_pool());

        let pool = pool.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "DefiLlama lookup for ARM failed");
            None
        });
        if pool.is_none() {
            tracing::info!("Origin ARM pool not listed on DefiLlama");
        }

        let tvl = match onchain {
            Ok(tvl) => Some(tvl),
            Err(e) => {
                tracing::warn!(error = %e, "ARM on-chain TVL unavailable, trying DefiLlama TVL");
                pool.as_ref().map(Pool::tvl)
            }
        };

        let Some(tvl_usd) = tvl.filter(|t| t.is_finite() && *t > 0.0) else {
            return Err(SourceError::Validation(
                "no positive ARM TVL from chain or DefiLlama".into(),
            ));
        };

        Ok(vec![Opportunity {
            protocol: self.config.protocol.clone(),
            product: self.config.product.clone(),
            tvl_usd,
            apy_pct: pool.as_ref().map(arm_apy_pct).unwrap_or(0.0),
            url: self.config.url.clone(),
        }])
    }
}
