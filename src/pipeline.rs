// src/pipeline.rs
//! One acquisition run: crawl every site, then curate the merged output.

use chrono::{DateTime, Local, Utc};
use metrics::{gauge, histogram};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{FilterPolicy, IndustryRule, SiteDescriptor};
use crate::crawl::{CrawlSettings, Crawler, SiteStatus};
use crate::curate::{CurationStats, Curator, FingerprintStore};
use crate::error::PipelineError;
use crate::fetch::Fetch;
use crate::metrics::ensure_metrics_described;
use crate::model::BidRecord;
use crate::sites::ParserRegistry;

/// Result of a run that produced something worth reporting, even if some
/// sites failed.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub records: Vec<BidRecord>,
    pub statuses: Vec<SiteStatus>,
    pub stats: CurationStats,
    pub generated_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn failed_sites(&self) -> impl Iterator<Item = &SiteStatus> {
        self.statuses.iter().filter(|s| s.is_failed())
    }
}

pub struct Pipeline {
    crawler: Crawler,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn Fetch>, registry: ParserRegistry, settings: CrawlSettings) -> Self {
        Self {
            crawler: Crawler::new(fetcher, registry, settings),
            timeout: None,
        }
    }

    /// Cancel the crawl once `timeout` elapses; records gathered so far
    /// are still curated.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run_once(
        &self,
        sites: &[SiteDescriptor],
        industries: &[IndustryRule],
        policy: &FilterPolicy,
        store: &mut dyn FingerprintStore,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        ensure_metrics_described();
        if !sites.iter().any(|s| s.enabled) {
            return Err(PipelineError::NoSitesEnabled);
        }
        let started = Instant::now();

        let run_cancel = cancel.child_token();
        let timer = self.timeout.map(|limit| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(target: "pipeline", ?limit, "run timeout reached; cancelling crawl");
                token.cancel();
            })
        });
        let crawl = self
            .crawler
            .crawl_all(sites, &policy.keywords, &run_cancel)
            .await;
        if let Some(timer) = timer {
            timer.abort();
        }

        let enabled: Vec<&SiteStatus> = crawl.statuses.iter().filter(|s| s.is_enabled()).collect();
        if crawl.records.is_empty() && enabled.iter().all(|s| s.is_failed()) {
            warn!(target: "pipeline", sites = enabled.len(), "every enabled site failed");
            return Err(PipelineError::AllSitesFailed {
                statuses: crawl.statuses,
            });
        }

        info!(
            target: "pipeline",
            raw = crawl.records.len(),
            failed = enabled.iter().filter(|s| s.is_failed()).count(),
            "crawl finished"
        );

        let curator = Curator::new(industries.to_vec(), policy.clone());
        let today = Local::now().date_naive();
        let (records, stats) = curator.curate(crawl.records, store, today);

        let generated_at = Utc::now();
        histogram!("pipeline_run_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        gauge!("pipeline_last_run_ts").set(generated_at.timestamp() as f64);
        info!(target: "pipeline", records = records.len(), "run complete");

        Ok(RunOutcome {
            records,
            statuses: crawl.statuses,
            stats,
            generated_at,
        })
    }

    /// Run with a fresh run-scoped dedup set and no external cancellation.
    pub async fn run_once_default(
        &self,
        sites: &[SiteDescriptor],
        industries: &[IndustryRule],
        policy: &FilterPolicy,
    ) -> Result<RunOutcome, PipelineError> {
        let mut seen: HashSet<String> = HashSet::new();
        self.run_once(sites, industries, policy, &mut seen, &CancellationToken::new())
            .await
    }
}
