use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::report::SourceReport;

/// One normalized yield-bearing instrument.
///
/// `(protocol, product)` is the only identity. A `tvl_usd` of 0 means
/// "unknown", not "empty"; the same holds for `apy_pct`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub protocol: String,
    pub product: String,
    pub tvl_usd: f64,
    /// Annualized yield as a percentage (5.0 == 5%).
    pub apy_pct: f64,
    pub url: String,
}

impl Opportunity {
    /// A catalog row with unknown metrics.
    pub fn placeholder(protocol: &str, product: &str, url: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            product: product.to_string(),
            tvl_usd: 0.0,
            apy_pct: 0.0,
            url: url.to_string(),
        }
    }
}

/// Sort descending by TVL, keeping the relative order of ties.
pub fn sort_by_tvl_desc(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.tvl_usd
            .partial_cmp(&a.tvl_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// The full response for one request: rebuilt from scratch every time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub updated_at: DateTime<Utc>,
    pub opportunities: Vec<Opportunity>,
    /// True when every source came back empty and the fallback catalog was served.
    pub fallback: bool,
    pub sources: Vec<SourceReport>,
}

impl AggregateResult {
    pub fn print_table(&self) {
        println!("\n{}", "═".repeat(96));
        println!("  ETH yields  (updated {})", self.updated_at.to_rfc3339());
        println!("{}", "═".repeat(96));
        println!(
            "  {:<18} {:<40} {:>16} {:>10}",
            "Protocol", "Product", "TVL (USD)", "APY %"
        );
        println!("  {}", "-".repeat(90));
        for o in &self.opportunities {
            println!(
                "  {:<18} {:<40} {:>16.0} {:>10.2}",
                o.protocol, o.product, o.tvl_usd, o.apy_pct
            );
        }
        println!("{}", "═".repeat(96));
        for s in &self.sources {
            match &s.error {
                Some(err) => println!(
                    "  {:<18} {:<10} {:>4} rows {:>6}ms  {}",
                    s.name, s.status, s.count, s.elapsed_ms, err
                ),
                None => println!(
                    "  {:<18} {:<10} {:>4} rows {:>6}ms",
                    s.name, s.status, s.count, s.elapsed_ms
                ),
            }
        }
        if self.fallback {
            println!("  (no source returned data; showing fallback catalog)");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opportunity_serializes_camel_case() {
        let o = Opportunity {
            protocol: "Lido".into(),
            product: "stETH".into(),
            tvl_usd: 1_000.0,
            apy_pct: 2.9,
            url: "https://lido.fi".into(),
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["tvlUsd"], 1_000.0);
        assert_eq!(v["apyPct"], 2.9);
        assert!(v.get("tvl_usd").is_none());
    }

    #[test]
    fn test_sort_by_tvl_desc_is_stable() {
        let mut rows = vec![
            Opportunity::placeholder("A", "a", ""),
            Opportunity { tvl_usd: 5.0, ..Opportunity::placeholder("B", "b", "") },
            Opportunity::placeholder("C", "c", ""),
        ];
        sort_by_tvl_desc(&mut rows);
        let order: Vec<&str> = rows.iter().map(|o| o.protocol.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }
}
