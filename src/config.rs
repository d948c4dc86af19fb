use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::Opportunity;

/// Built-in catalog and endpoints. A user file is merged on top of this.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

// ── Sections ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub thresholds: Thresholds,
    pub price: PriceConfig,
    pub defillama: DefiLlamaConfig,
    pub stakedao_pages: StakeDaoPagesConfig,
    pub stakedao_api: StakeDaoApiConfig,
    pub pendle: PendleConfig,
    pub origin: OriginConfig,
    pub fallback: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bound applied to every outbound HTTP and RPC call.
    pub request_timeout_secs: u64,
    /// Deadline for one source as a whole, enforced by the aggregator.
    pub source_timeout_secs: u64,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

/// Plausibility filters for scraped metrics, plus traversal bounds for the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_tvl_usd: f64,
    pub max_apy_pct: f64,
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_tvl_usd: 100_000.0,
            max_apy_pct: 200.0,
            max_depth: 64,
            max_nodes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    pub url: String,
    /// ETH/USD used when the price API is unreachable.
    pub fallback_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefiLlamaConfig {
    pub enabled: bool,
    pub url: String,
    pub picks: Vec<LlamaPick>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaPick {
    pub protocol: String,
    pub product: String,
    pub project: String,
    pub chain: String,
    pub symbol_includes: Vec<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeDaoPagesConfig {
    pub enabled: bool,
    pub base_url: String,
    pub vaults: Vec<VaultPick>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultPick {
    pub protocol: String,
    pub product: String,
    pub protocol_param: String,
    pub vault_param: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeDaoApiConfig {
    pub enabled: bool,
    pub url: String,
    pub pools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendleConfig {
    pub enabled: bool,
    pub base_url: String,
    pub chain_id: u64,
    pub page_size: usize,
    pub max_pages: usize,
    pub underlyings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    pub enabled: bool,
    pub protocol: String,
    pub product: String,
    pub url: String,
    pub rpc_url: String,
    pub arm_address: String,
    pub decimals: u8,
}

/// A catalog row shown with zeroed metrics when nothing else is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub protocol: String,
    pub product: String,
    pub url: String,
}

// ── Loading ──────────────────────────────────────────────────────────

impl Config {
    /// Load the built-in defaults, merge an optional user file on top, then
    /// apply endpoint overrides from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut merged: toml::Value =
            toml::from_str(DEFAULT_CONFIG).context("parsing built-in config")?;

        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let user: toml::Value = toml::from_str(&contents)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            merge(&mut merged, user);
        }

        let mut config: Config = merged
            .try_into()
            .context("config does not match the expected schema")?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// The built-in configuration, without file or environment overrides.
    pub fn builtin() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG).context("parsing built-in config")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 6] = [
            ("ETH_YIELDS_DEFILLAMA_URL", &mut self.defillama.url),
            ("ETH_YIELDS_PENDLE_URL", &mut self.pendle.base_url),
            ("ETH_YIELDS_STAKEDAO_API_URL", &mut self.stakedao_api.url),
            ("ETH_YIELDS_STAKEDAO_PAGE_URL", &mut self.stakedao_pages.base_url),
            ("ETH_YIELDS_RPC_URL", &mut self.origin.rpc_url),
            ("ETH_YIELDS_PRICE_URL", &mut self.price.url),
        ];
        for (key, slot) in overrides {
            if let Some(value) = var(key).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(key, value = %value, "endpoint override from environment");
                *slot = value;
            }
        }
    }

    pub fn fallback_catalog(&self) -> Vec<Opportunity> {
        self.fallback
            .iter()
            .map(|e| Opportunity::placeholder(&e.protocol, &e.product, &e.url))
            .collect()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }
}

/// Recursively merge `overlay` into `base`. Tables merge key by key;
/// everything else (arrays included) is replaced.
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
