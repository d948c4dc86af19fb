use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;

use crate::config::Config;
use crate::error::SourceError;
use crate::model::{AggregateResult, Opportunity, SourceReport, SourceStats, SourceStatus};
use crate::sources::{self, YieldSource};

type SourceOutcome = Result<Result<Vec<Opportunity>, SourceError>, tokio::time::error::Elapsed>;

/// Fans out to every source, waits for all of them, and concatenates what
/// came back in declaration order.
pub struct Aggregator {
    sources: Vec<Arc<dyn YieldSource>>,
    fallback: Vec<Opportunity>,
    source_timeout: Duration,
    stats: Mutex<Vec<SourceStats>>,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn YieldSource>>,
        fallback: Vec<Opportunity>,
        source_timeout: Duration,
    ) -> Self {
        let stats = sources
            .iter()
            .map(|s| SourceStats {
                name: s.name().to_string(),
                ..SourceStats::default()
            })
            .collect();
        Self {
            sources,
            fallback,
            source_timeout,
            stats: Mutex::new(stats),
        }
    }

    /// Build the real source set from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = sources::build_client(&config.http)?;
        let sources = sources::build_sources(config, &client);
        tracing::info!(
            sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "aggregator ready"
        );
        Ok(Self::new(
            sources,
            config.fallback_catalog(),
            config.http.source_timeout(),
        ))
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run every source concurrently and assemble one result.
    ///
    /// Never fails: an erroring, panicking or slow source contributes nothing
    /// and is recorded in `sources`. If nothing at all came back, the
    /// fallback catalog is served.
    pub async fn assemble(&self) -> AggregateResult {
        let started = Instant::now();

        // Each source runs on its own task so a panic stays contained.
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let deadline = self.source_timeout;
                tokio::spawn(async move {
                    let t0 = Instant::now();
                    let outcome: SourceOutcome =
                        tokio::time::timeout(deadline, source.fetch()).await;
                    (outcome, t0.elapsed())
                })
            })
            .collect();

        let mut opportunities = Vec::new();
        let mut reports = Vec::with_capacity(handles.len());

        for (source, handle) in self.sources.iter().zip(handles) {
            let name = source.name().to_string();
            let report = match handle.await {
                Ok((Ok(Ok(rows)), elapsed)) => {
                    tracing::info!(source = %name, count = rows.len(), elapsed_ms = elapsed.as_millis() as u64, "source ok");
                    let report = SourceReport {
                        name,
                        status: SourceStatus::Ok,
                        count: rows.len(),
                        elapsed_ms: elapsed.as_millis() as u64,
                        error: None,
                    };
                    opportunities.extend(rows);
                    report
                }
                Ok((Ok(Err(e)), elapsed)) => {
                    tracing::warn!(source = %name, error = %e, elapsed_ms = elapsed.as_millis() as u64, "source failed");
                    failed(name, SourceStatus::Failed, elapsed, e.to_string())
                }
                Ok((Err(_), elapsed)) => {
                    tracing::warn!(source = %name, timeout_secs = self.source_timeout.as_secs(), "source timed out");
                    failed(
                        name,
                        SourceStatus::TimedOut,
                        elapsed,
                        format!("no response within {}s", self.source_timeout.as_secs()),
                    )
                }
                Err(join_err) => {
                    tracing::error!(source = %name, error = %join_err, "source task aborted");
                    failed(name, SourceStatus::Failed, started.elapsed(), format!("task aborted: {join_err}"))
                }
            };
            reports.push(report);
        }

        self.record(&reports);

        let fallback = opportunities.is_empty();
        if fallback {
            tracing::warn!("no source returned data, serving fallback catalog");
            opportunities = self.fallback.clone();
        }

        AggregateResult {
            updated_at: Utc::now(),
            opportunities,
            fallback,
            sources: reports,
        }
    }

    /// Lifetime success/failure counters, one entry per source.
    pub fn stats(&self) -> Vec<SourceStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, reports: &[SourceReport]) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        for (entry, report) in stats.iter_mut().zip(reports) {
            entry.attempts += 1;
            match report.status {
                SourceStatus::Ok => entry.successes += 1,
                SourceStatus::Failed | SourceStatus::TimedOut => {
                    entry.failures += 1;
                    entry.last_error = report.error.clone();
                }
            }
        }
    }
}

fn failed(name: String, status: SourceStatus, elapsed: Duration, error: String) -> SourceReport {
    SourceReport {
        name,
        status,
        count: 0,
        elapsed_ms: elapsed.as_millis() as u64,
        error: Some(error),
    }
}
