use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::PendleConfig;
use crate::error::SourceError;
use crate::model::Opportunity;
use crate::model::opportunity::sort_by_tvl_desc;
use crate::normalize::{non_negative, opt_pct};

use super::YieldSource;

// ── API response types ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendleMarket {
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub address: String,
    pub expiry: Option<String>,
    pub simple_symbol: Option<String>,
    pub liquidity: Option<Liquidity>,
    /// PT implied APY, as a fraction.
    pub implied_apy: Option<f64>,
    pub sy: Option<SyInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyInfo {
    pub pro_symbol: Option<String>,
    pub simple_symbol: Option<String>,
}

impl PendleMarket {
    /// Underlying label used for allowlist matching.
    pub fn label(&self) -> Option<&str> {
        self.simple_symbol
            .as_deref()
            .or_else(|| self.sy.as_ref().and_then(|s| s.pro_symbol.as_deref()))
            .or_else(|| self.sy.as_ref().and_then(|s| s.simple_symbol.as_deref()))
    }

    pub fn tvl_usd(&self) -> f64 {
        non_negative(self.liquidity.as_ref().and_then(|l| l.usd))
    }
}

/// One page of the market listing.
#[derive(Debug)]
pub struct MarketPage {
    pub items: Vec<Value>,
    /// Total number of markets, when the API declares it.
    pub total: Option<usize>,
}

/// Accepts a bare array or an object holding `results`, `markets` or `data`.
pub fn parse_page(body: &Value) -> Option<MarketPage> {
    let items = super::find_array(body, &["results", "markets", "data"])?.clone();
    let total = body
        .get("total")
        .and_then(Value::as_u64)
        .map(|t| t as usize);
    Some(MarketPage { items, total })
}

/// `YYYY-MM-DD` from an expiry timestamp.
pub fn expiry_date(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|ndt| ndt.date())
        })
        .or_else(|| chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn market_opportunity(m: &PendleMarket) -> Opportunity {
    let label = m.label().unwrap_or("Unknown");
    let product = match expiry_date(m.expiry.as_deref()) {
        Some(exp) => format!("Pendle PT {label} (exp {exp})"),
        None => format!("Pendle PT {label}"),
    };

    Opportunity {
        protocol: "Pendle".to_string(),
        product,
        tvl_usd: m.tvl_usd(),
        apy_pct: opt_pct(m.implied_apy),
        url: format!(
            "https://app.pendle.finance/trade/markets/{}?chain=ethereum&view=pt",
            m.address
        ),
    }
}

/// Allowlisted markets on the configured chain, one row per product (the
/// highest TVL wins), sorted by TVL descending.
///
/// Offset paging over a live listing can return a market on two pages.
pub fn select_markets(markets: &[PendleMarket], chain_id: u64, underlyings: &[String]) -> Vec<Opportunity> {
    let allow: HashSet<&str> = underlyings.iter().map(String::as_str).collect();

    let mut rows: Vec<Opportunity> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let candidates = markets
        .iter()
        .filter(|m| m.chain_id == Some(chain_id))
        .filter(|m| m.label().is_some_and(|l| allow.contains(l)))
        .map(market_opportunity);

    for row in candidates {
        match index.get(&row.product) {
            Some(&i) if rows[i].tvl_usd >= row.tvl_usd => {}
            Some(&i) => rows[i] = row,
            None => {
                index.insert(row.product.clone(), rows.len());
                rows.push(row);
            }
        }
    }

    sort_by_tvl_desc(&mut rows);
    rows
}

// ── Source ───────────────────────────────────────────────────────────

/// Pendle PT markets for a small allowlist of ETH underlyings.
pub struct PendleSource {
    client: reqwest::Client,
    config: PendleConfig,
}

impl PendleSource {
    pub fn new(client: reqwest::Client, config: PendleConfig) -> Self {
        Self { client, config }
    }

    fn page_url(&self, skip: usize) -> String {
        format!(
            "{}/v1/{}/markets?limit={}&skip={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.chain_id,
            self.config.page_size,
            skip
        )
    }

    /// Walk the listing page by page.
    ///
    /// Stops on a short or empty page, once the declared total is reached, or
    /// at `max_pages`. A failure on the first page is an error; a later one
    /// keeps the markets gathered so far.
    pub async fn fetch_all_markets(&self) -> Result<Vec<Value>, SourceError> {
        let page_size = self.config.page_size.max(1);
        let mut markets: Vec<Value> = Vec::new();

        for page_no in 0..self.config.max_pages {
            let skip = page_no * page_size;
            let url = self.page_url(skip);

            let page = match super::get_json::<Value>(&self.client, &url).await {
                Ok(body) => parse_page(&body).ok_or_else(|| {
                    SourceError::Extraction(format!("unexpected market listing shape from {url}"))
                }),
                Err(e) => Err(e),
            };

            let page = match page {
                Ok(page) => page,
                Err(e) if page_no == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        page = page_no,
                        kept = markets.len(),
                        error = %e,
                        "Pendle pagination failed, keeping partial listing"
                    );
                    break;
                }
            };

            let received = page.items.len();
            markets.extend(page.items);
            tracing::debug!(page = page_no, received, total = ?page.total, "Pendle markets page");

            if received < page_size {
                break;
            }
            if page.total.is_some_and(|total| skip + received >= total) {
                break;
            }
        }

        Ok(markets)
    }
}

#[async_trait]
impl YieldSource for PendleSource {
    fn name(&self) -> &str {
        "pendle"
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let raw = self.fetch_all_markets().await?;
        let markets: Vec<PendleMarket> = super::decode_lenient(&raw);
        if markets.len() < raw.len() {
            tracing::debug!(dropped = raw.len() - markets.len(), "undecodable Pendle markets");
        }
        Ok(select_markets(&markets, self.config.chain_id, &self.config.underlyings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market(v: Value) -> PendleMarket {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_parse_page_shapes() {
        let bare = parse_page(&json!([{"a": 1}])).unwrap();
        assert_eq!(bare.items.len(), 1);
        assert_eq!(bare.total, None);

        let wrapped = parse_page(&json!({"total": 240, "limit": 100, "skip": 0, "results": [{}, {}]})).unwrap();
        assert_eq!(wrapped.items.len(), 2);
        assert_eq!(wrapped.total, Some(240));

        assert!(parse_page(&json!({"message": "rate limited"})).is_none());
    }

    #[test]
    fn test_label_fallbacks() {
        let m = market(json!({"sy": {"proSymbol": "pufETH", "simpleSymbol": "x"}}));
        assert_eq!(m.label(), Some("pufETH"));
        let m = market(json!({"sy": {"simpleSymbol": "tETH"}}));
        assert_eq!(m.label(), Some("tETH"));
        let m = market(json!({"simpleSymbol": "dETH", "sy": {"proSymbol": "other"}}));
        assert_eq!(m.label(), Some("dETH"));
    }

    #[test]
    fn test_expiry_date_formats() {
        assert_eq!(expiry_date(Some("2025-12-25T00:00:00.000Z")), Some("2025-12-25".into()));
        assert_eq!(expiry_date(Some("2026-03-26T00:00:00")), Some("2026-03-26".into()));
        assert_eq!(expiry_date(Some("2026-06-25")), Some("2026-06-25".into()));
        assert_eq!(expiry_date(Some("soon")), None);
        assert_eq!(expiry_date(None), None);
    }

    #[test]
    fn test_select_markets() {
        let markets = vec![
            market(json!({"chainId": 1, "address": "0x1", "simpleSymbol": "pufETH",
                          "expiry": "2025-12-25T00:00:00.000Z", "liquidity": {"usd": 5_000_000.0}, "impliedApy": 0.045})),
            market(json!({"chainId": 1, "address": "0x2", "simpleSymbol": "ghETH",
                          "liquidity": {"usd": 9_000_000.0}, "impliedApy": 7.5})),
            market(json!({"chainId": 42161, "address": "0x3", "simpleSymbol": "pufETH",
                          "liquidity": {"usd": 1.0e9}, "impliedApy": 0.1})),
            market(json!({"chainId": 1, "address": "0x4", "simpleSymbol": "sUSDe",
                          "liquidity": {"usd": 1.0e9}, "impliedApy": 0.1})),
            market(json!({"chainId": 1, "address": "0x5", "simpleSymbol": "tETH"})),
        ];
        let allow: Vec<String> = ["ghETH", "pufETH", "tETH"].iter().map(|s| s.to_string()).collect();
        let rows = select_markets(&markets, 1, &allow);

        let products: Vec<&str> = rows.iter().map(|r| r.product.as_str()).collect();
        assert_eq!(
            products,
            vec!["Pendle PT ghETH", "Pendle PT pufETH (exp 2025-12-25)", "Pendle PT tETH"]
        );
        assert_eq!(rows[0].apy_pct, 7.5);
        assert!((rows[1].apy_pct - 4.5).abs() < 1e-9);
        assert_eq!(rows[2].tvl_usd, 0.0);
        assert_eq!(rows[2].apy_pct, 0.0);
        assert_eq!(
            rows[1].url,
            "https://app.pendle.finance/trade/markets/0x1?chain=ethereum&view=pt"
        );
    }

    #[test]
    fn test_select_markets_dedupes_repeated_market() {
        // Second page repeats the last market of the first page
        let page1 = vec![
            market(json!({"chainId": 1, "address": "0x1", "simpleSymbol": "pufETH",
                          "expiry": "2025-12-25T00:00:00.000Z", "liquidity": {"usd": 5_000_000.0}, "impliedApy": 0.045})),
            market(json!({"chainId": 1, "address": "0x2", "simpleSymbol": "ghETH",
                          "liquidity": {"usd": 8_000_000.0}, "impliedApy": 0.07})),
        ];
        let page2 = vec![market(json!({"chainId": 1, "address": "0x2", "simpleSymbol": "ghETH",
                                       "liquidity": {"usd": 8_500_000.0}, "impliedApy": 0.071}))];
        let markets: Vec<PendleMarket> = page1.into_iter().chain(page2).collect();

        let allow: Vec<String> = ["ghETH", "pufETH"].iter().map(|s| s.to_string()).collect();
        let rows = select_markets(&markets, 1, &allow);

        let products: Vec<&str> = rows.iter().map(|r| r.product.as_str()).collect();
        assert_eq!(products, vec!["Pendle PT ghETH", "Pendle PT pufETH (exp 2025-12-25)"]);
        assert_eq!(rows[0].tvl_usd, 8_500_000.0);
    }
}
