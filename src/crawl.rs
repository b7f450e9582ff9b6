// src/crawl.rs
//! Crawl orchestration: one task per enabled site, sequential pagination
//! inside each, optional detail enrichment, results merged in configured
//! site order.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SiteDescriptor;
use crate::error::{FetchError, SiteError};
use crate::fetch::Fetch;
use crate::model::BidRecord;
use crate::sites::{ParserRegistry, SiteParser};

/// Whether detail pages are fetched after the list pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailMode {
    #[default]
    ListOnly,
    Enrich,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Upper bound on list pages per site. Zero fetches nothing.
    pub max_pages: u32,
    pub detail_mode: DetailMode,
    /// In-flight detail fetches per site.
    pub detail_concurrency: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: 10,
            detail_mode: DetailMode::ListOnly,
            detail_concurrency: 2,
        }
    }
}

/// Per-site lifecycle. Every site starts `Active` (or `Disabled`) and
/// ends in `Exhausted` or `Failed`; a cancelled site never leaves `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteState {
    Disabled,
    Active,
    Exhausted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EmptyPage,
    MaxPages,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SiteOutcome {
    Disabled,
    Exhausted { stop: StopReason },
    Failed { reason: String },
    Cancelled,
}

impl SiteOutcome {
    pub fn state(&self) -> SiteState {
        match self {
            SiteOutcome::Disabled => SiteState::Disabled,
            SiteOutcome::Exhausted { .. } => SiteState::Exhausted,
            SiteOutcome::Failed { .. } => SiteState::Failed,
            SiteOutcome::Cancelled => SiteState::Active,
        }
    }
}

/// Final report for one configured site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStatus {
    pub site: String,
    pub outcome: SiteOutcome,
    pub pages_fetched: u32,
    pub records: usize,
    pub detail_failures: usize,
}

impl SiteStatus {
    fn new(site: &str, outcome: SiteOutcome) -> Self {
        Self {
            site: site.to_string(),
            outcome,
            pages_fetched: 0,
            records: 0,
            detail_failures: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SiteOutcome::Failed { .. })
    }

    pub fn is_enabled(&self) -> bool {
        self.outcome != SiteOutcome::Disabled
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.site)?;
        match &self.outcome {
            SiteOutcome::Disabled => write!(f, "disabled"),
            SiteOutcome::Exhausted { stop } => {
                let why = match stop {
                    StopReason::EmptyPage => "exhausted",
                    StopReason::MaxPages => "page limit reached",
                };
                write!(
                    f,
                    "succeeded with {} records ({} pages, {why}",
                    self.records, self.pages_fetched
                )?;
                if self.detail_failures > 0 {
                    write!(f, ", {} detail failures", self.detail_failures)?;
                }
                write!(f, ")")
            }
            SiteOutcome::Failed { reason } => {
                write!(f, "failed: {reason} (kept {} records)", self.records)
            }
            SiteOutcome::Cancelled => write!(
                f,
                "cancelled after {} pages ({} records)",
                self.pages_fetched, self.records
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct CrawlResult {
    pub records: Vec<BidRecord>,
    /// One entry per configured site, in configuration order.
    pub statuses: Vec<SiteStatus>,
}

pub struct Crawler {
    fetcher: Arc<dyn Fetch>,
    registry: ParserRegistry,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn Fetch>, registry: ParserRegistry, settings: CrawlSettings) -> Self {
        Self {
            fetcher,
            registry,
            settings,
        }
    }

    /// Crawl every enabled site concurrently. Never fails as a whole: each
    /// site's fate is reported in its [`SiteStatus`].
    pub async fn crawl_all(
        &self,
        sites: &[SiteDescriptor],
        keywords: &[String],
        cancel: &CancellationToken,
    ) -> CrawlResult {
        let keywords: Arc<[String]> = keywords.into();
        let mut slots: Vec<Option<(Vec<BidRecord>, SiteStatus)>> = vec![None; sites.len()];
        let mut tasks = JoinSet::new();

        for (idx, site) in sites.iter().enumerate() {
            if !site.enabled {
                slots[idx] = Some((Vec::new(), SiteStatus::new(&site.name, SiteOutcome::Disabled)));
                continue;
            }
            let parser = match self.registry.build(site) {
                Ok(p) => p,
                Err(e) => {
                    warn!(target: "crawl", site = %site.name, error = %e, "site cannot be crawled");
                    let outcome = SiteOutcome::Failed {
                        reason: e.to_string(),
                    };
                    slots[idx] = Some((Vec::new(), SiteStatus::new(&site.name, outcome)));
                    continue;
                }
            };

            let fetcher = Arc::clone(&self.fetcher);
            let keywords = Arc::clone(&keywords);
            let settings = self.settings.clone();
            let cancel = cancel.clone();
            let name = site.name.clone();
            tasks.spawn(async move {
                let run = AssertUnwindSafe(crawl_site(fetcher, parser, keywords, settings, cancel))
                    .catch_unwind()
                    .await;
                let run = run.unwrap_or_else(|panic| {
                    let reason = format!("site task panicked: {}", panic_message(panic.as_ref()));
                    warn!(target: "crawl", site = %name, %reason, "site task aborted");
                    (Vec::new(), SiteStatus::new(&name, SiteOutcome::Failed { reason }))
                });
                (idx, run)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, run)) => slots[idx] = Some(run),
                Err(e) => warn!(target: "crawl", error = %e, "site task did not complete"),
            }
        }

        let mut result = CrawlResult::default();
        for (site, slot) in sites.iter().zip(slots) {
            let (mut records, status) = slot.unwrap_or_else(|| {
                let outcome = SiteOutcome::Failed {
                    reason: "site task did not complete".into(),
                };
                (Vec::new(), SiteStatus::new(&site.name, outcome))
            });
            if status.is_failed() {
                counter!("crawl_site_failures_total").increment(1);
            }
            result.records.append(&mut records);
            result.statuses.push(status);
        }
        result
    }
}

async fn crawl_site(
    fetcher: Arc<dyn Fetch>,
    parser: Arc<dyn SiteParser>,
    keywords: Arc<[String]>,
    settings: CrawlSettings,
    cancel: CancellationToken,
) -> (Vec<BidRecord>, SiteStatus) {
    let site = parser.source_name().to_string();
    let mut status = SiteStatus::new(&site, SiteOutcome::Cancelled);
    let mut records = Vec::new();

    status.outcome = loop {
        if cancel.is_cancelled() {
            break SiteOutcome::Cancelled;
        }
        if status.pages_fetched >= settings.max_pages {
            break SiteOutcome::Exhausted {
                stop: StopReason::MaxPages,
            };
        }
        let page = status.pages_fetched + 1;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SiteError::Fetch(FetchError::Cancelled)),
            r = parser.fetch_list_page(fetcher.as_ref(), page, &keywords) => r,
        };
        match fetched {
            Ok(batch) => {
                status.pages_fetched = page;
                counter!("crawl_pages_total").increment(1);
                debug!(target: "crawl", site = %site, page, records = batch.len(), "list page done");
                if batch.is_empty() {
                    break SiteOutcome::Exhausted {
                        stop: StopReason::EmptyPage,
                    };
                }
                records.extend(batch);
            }
            Err(SiteError::Fetch(FetchError::Cancelled)) => {
                debug!(target: "crawl", site = %site, page, "list page abandoned on cancellation");
                break SiteOutcome::Cancelled;
            }
            Err(e) => {
                warn!(target: "crawl", site = %site, page, error = %e, "list page failed; stopping site");
                break SiteOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }
    };

    if settings.detail_mode == DetailMode::Enrich
        && parser.supports_detail()
        && !records.is_empty()
        && !cancel.is_cancelled()
    {
        let (failures, interrupted) =
            enrich(fetcher.as_ref(), parser.as_ref(), &mut records, &settings, &cancel).await;
        status.detail_failures = failures;
        if interrupted && !matches!(status.outcome, SiteOutcome::Failed { .. }) {
            status.outcome = SiteOutcome::Cancelled;
        }
    }

    status.records = records.len();
    info!(target: "crawl", "{status}");
    (records, status)
}

/// Fetch detail pages with bounded concurrency, in record order. Returns
/// the failure count and whether cancellation cut enrichment short.
async fn enrich(
    fetcher: &dyn Fetch,
    parser: &dyn SiteParser,
    records: &mut [BidRecord],
    settings: &CrawlSettings,
    cancel: &CancellationToken,
) -> (usize, bool) {
    let urls: Vec<String> = records.iter().map(|r| r.source_url.clone()).collect();
    let results: Vec<_> = stream::iter(urls)
        .map(|url| async move {
            if cancel.is_cancelled() {
                return (url, Err(SiteError::Fetch(FetchError::Cancelled)));
            }
            let r = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SiteError::Fetch(FetchError::Cancelled)),
                r = parser.fetch_detail(fetcher, &url) => r,
            };
            (url, r)
        })
        .buffered(settings.detail_concurrency.max(1))
        .collect()
        .await;

    let mut failures = 0;
    let mut interrupted = false;
    for (record, (url, result)) in records.iter_mut().zip(results) {
        match result {
            Ok(detail) => record.apply_detail(detail),
            Err(SiteError::Fetch(FetchError::Cancelled)) => interrupted = true,
            Err(e) => {
                failures += 1;
                counter!("detail_failures_total").increment(1);
                warn!(target: "crawl", site = parser.source_name(), %url, error = %e, "detail fetch failed; keeping list fields");
            }
        }
    }
    (failures, interrupted)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
