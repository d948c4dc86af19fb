//! Keyword-driven metric discovery over untyped JSON.
//!
//! Server-rendered payloads have no stable schema, so TVL and APY are found
//! by walking the tree, keeping every leaf whose key looks like a metric, and
//! then choosing among the candidates by magnitude.

use serde::Serialize;
use serde_json::Value;

use crate::config::Thresholds;
use crate::normalize::parse_numberish;

/// Key fragments (lower-case) that mark a leaf as a metric candidate.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "tvl",
    "apy",
    "apr",
    "yield",
    "rate",
    "boost",
    "deposit",
    "underlying",
    "aum",
    "value",
    "locked",
];

const TVL_KEYS: &[&str] = &["tvl", "value", "locked", "deposit"];
const APY_KEYS: &[&str] = &["apy", "apr", "yield", "rate"];

/// Subtrees under these keys are never entered (Next.js translation store).
const SKIPPED_KEYS: &[&str] = &["_nexti18next"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CandidateValue {
    Number(f64),
    /// A matching key whose value is a string we could not parse, e.g. `"$6.3m"`.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCandidate {
    /// Dot-joined path from the scan root.
    pub path: String,
    /// Lower-cased final key.
    pub key: String,
    pub value: CandidateValue,
}

impl MetricCandidate {
    pub fn number(&self) -> Option<f64> {
        match self.value {
            CandidateValue::Number(n) => Some(n),
            CandidateValue::Text(_) => None,
        }
    }
}

/// TVL and APY chosen from a candidate list. `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub tvl_usd: Option<f64>,
    pub apy_pct: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct MetricScanner {
    keywords: Vec<String>,
    max_depth: usize,
    max_nodes: usize,
}

struct Frame<'a> {
    key: String,
    path: String,
    value: &'a Value,
    depth: usize,
}

impl MetricScanner {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            max_depth: thresholds.max_depth,
            max_nodes: thresholds.max_nodes,
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        self
    }

    /// Collect candidates in document order (pre-order, fields in declaration order).
    ///
    /// Traversal is iterative and stops descending at `max_depth`; it gives up
    /// entirely after `max_nodes` visits, returning what it has.
    pub fn scan(&self, root: &Value) -> Vec<MetricCandidate> {
        let mut out = Vec::new();
        let mut stack: Vec<Frame<'_>> = Vec::new();
        push_children(&mut stack, root, "", 1);

        let mut visited = 0usize;
        while let Some(frame) = stack.pop() {
            visited += 1;
            if visited > self.max_nodes {
                tracing::warn!(max_nodes = self.max_nodes, "scan budget exhausted, truncating");
                break;
            }

            let key = frame.key.to_lowercase();
            if SKIPPED_KEYS.iter().any(|s| key.contains(s)) {
                continue;
            }

            if self.keywords.iter().any(|w| key.contains(w.as_str())) {
                let value = match (parse_numberish(frame.value), frame.value) {
                    (Some(n), _) => Some(CandidateValue::Number(n)),
                    (None, Value::String(s)) => Some(CandidateValue::Text(s.clone())),
                    _ => None,
                };
                if let Some(value) = value {
                    out.push(MetricCandidate {
                        path: frame.path.clone(),
                        key: key.clone(),
                        value,
                    });
                }
            }

            if frame.depth < self.max_depth {
                push_children(&mut stack, frame.value, &frame.path, frame.depth + 1);
            }
        }

        out
    }

    /// Scan several roots in order and concatenate the results.
    pub fn scan_all<'a>(&self, roots: impl IntoIterator<Item = &'a Value>) -> Vec<MetricCandidate> {
        roots.into_iter().flat_map(|r| self.scan(r)).collect()
    }
}

fn push_children<'a>(stack: &mut Vec<Frame<'a>>, value: &'a Value, path: &str, depth: usize) {
    let child_path = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };

    // Reverse push so the first field is popped first.
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter().rev() {
                stack.push(Frame {
                    key: k.clone(),
                    path: child_path(k),
                    value: v,
                    depth,
                });
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate().rev() {
                let k = i.to_string();
                stack.push(Frame {
                    path: child_path(&k),
                    key: k,
                    value: v,
                    depth,
                });
            }
        }
        _ => {}
    }
}

fn best_matching(
    candidates: &[MetricCandidate],
    keys: &[&str],
    plausible: impl Fn(f64) -> bool,
) -> Option<f64> {
    candidates
        .iter()
        .filter(|c| keys.iter().any(|k| c.key.contains(k)))
        .filter_map(MetricCandidate::number)
        .filter(|n| plausible(*n))
        .fold(None, |best: Option<f64>, n| Some(best.map_or(n, |b| b.max(n))))
}

/// Largest TVL-like candidate of at least `min_tvl_usd`.
pub fn select_tvl(candidates: &[MetricCandidate], min_tvl_usd: f64) -> Option<f64> {
    best_matching(candidates, TVL_KEYS, |n| n >= min_tvl_usd)
}

/// Largest APY-like candidate within `0..=max_apy_pct`.
pub fn select_apy(candidates: &[MetricCandidate], max_apy_pct: f64) -> Option<f64> {
    best_matching(candidates, APY_KEYS, |n| (0.0..=max_apy_pct).contains(&n))
}

pub fn select_metrics(candidates: &[MetricCandidate], thresholds: &Thresholds) -> Metrics {
    Metrics {
        tvl_usd: select_tvl(candidates, thresholds.min_tvl_usd),
        apy_pct: select_apy(candidates, thresholds.max_apy_pct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scanner() -> MetricScanner {
        MetricScanner::new(&Thresholds::default())
    }

    #[test]
    fn test_collects_in_declaration_order() {
        let doc = json!({
            "vault": {"tvlUsd": 2_000_000, "name": "ETH+", "apr": "4.5%"},
            "boostLabel": "$6.3m",
            "rows": [{"apy": 3}, {"id": 7}],
        });
        let hits = scanner().scan(&doc);
        let paths: Vec<&str> = hits.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["vault.tvlUsd", "vault.apr", "boostLabel", "rows.0.apy"]
        );
        assert_eq!(hits[2].value, CandidateValue::Text("$6.3m".into()));
        assert_eq!(hits[0].number(), Some(2_000_000.0));
        assert_eq!(hits[1].number(), Some(4.5));
    }

    #[test]
    fn test_skips_translation_store() {
        let doc = json!({
            "_nextI18Next": {"initialI18nStore": {"en": {"tvl": 999_999_999}}},
            "tvl": 150_000,
        });
        let hits = scanner().scan(&doc);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "tvl");
    }

    #[test]
    fn test_tvl_below_threshold_is_unknown() {
        let doc = json!({"a": {"tvlUsd": 500}, "b": {"unrelatedApy": 40000}});
        let hits = scanner().scan(&doc);
        assert_eq!(select_tvl(&hits, 100_000.0), None);
        assert_eq!(select_tvl(&hits, 100.0), Some(500.0));
        // 40000 is outside the plausible APY band
        assert_eq!(select_apy(&hits, 200.0), None);
    }

    #[test]
    fn test_picks_highest_plausible() {
        let doc = json!({
            "tvl": "$1,250,000",
            "totalValueLocked": 3_400_000.5,
            "depositCount": 12,
            "apy": 4.2,
            "maxApr": "18.5%",
            "feeRate": 250,
        });
        let m = select_metrics(&scanner().scan(&doc), &Thresholds::default());
        assert_eq!(m.tvl_usd, Some(3_400_000.5));
        assert_eq!(m.apy_pct, Some(18.5));
    }

    #[test]
    fn test_depth_bound_stops_descent() {
        let mut doc = json!({"tvl": 1_000_000});
        for _ in 0..200 {
            doc = json!({ "next": doc });
        }
        let shallow = MetricScanner::new(&Thresholds {
            max_depth: 10,
            ..Thresholds::default()
        });
        assert!(shallow.scan(&doc).is_empty());
        let deep = MetricScanner::new(&Thresholds {
            max_depth: 500,
            ..Thresholds::default()
        });
        assert_eq!(deep.scan(&doc).len(), 1);
    }

    #[test]
    fn test_node_budget_truncates() {
        let rows: Vec<Value> = (0..1_000).map(|i| json!({"apy": i})).collect();
        let doc = json!({ "rows": rows });
        let limited = MetricScanner::new(&Thresholds {
            max_nodes: 11,
            ..Thresholds::default()
        });
        // rows, then (row, apy) pairs: 1 + 2*5 = 11 nodes
        assert_eq!(limited.scan(&doc).len(), 5);
    }

    #[test]
    fn test_custom_keywords() {
        let doc = json!({"aum": 5_000_000, "tvl": 1_000_000});
        let hits = scanner().with_keywords(&["TVL"]).scan(&doc);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "tvl");
    }
}
