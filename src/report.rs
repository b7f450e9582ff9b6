// src/report.rs
//! Hand-off to reporting: the JSON sidecar written after each run.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crawl::SiteStatus;
use crate::curate::CurationStats;
use crate::model::{BidRecord, OTHER_INDUSTRY};
use crate::pipeline::RunOutcome;

const UNKNOWN_DATE: &str = "unknown";

/// Aggregates over the curated records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub total: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_industry: BTreeMap<String, usize>,
    /// Publish date (`YYYY-MM-DD`, or `unknown`) → count.
    pub by_date: BTreeMap<String, usize>,
    /// Keyword hit counts, most frequent first.
    pub keywords: Vec<(String, usize)>,
}

impl RunStatistics {
    pub fn from_records(records: &[BidRecord]) -> Self {
        let mut s = RunStatistics {
            total: records.len(),
            ..Default::default()
        };
        let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
        for r in records {
            *s.by_source.entry(r.source_name.clone()).or_default() += 1;
            let industry = r.industry.as_deref().unwrap_or(OTHER_INDUSTRY);
            *s.by_industry.entry(industry.to_string()).or_default() += 1;
            let date = r
                .publish_date
                .map_or_else(|| UNKNOWN_DATE.to_string(), |d| d.format("%Y-%m-%d").to_string());
            *s.by_date.entry(date).or_default() += 1;
            for k in &r.matched_keywords {
                *hits.entry(k.as_str()).or_default() += 1;
            }
        }
        // BTreeMap order breaks ties alphabetically; the sort is stable
        let mut keywords: Vec<(String, usize)> =
            hits.into_iter().map(|(k, n)| (k.to_string(), n)).collect();
        keywords.sort_by(|a, b| b.1.cmp(&a.1));
        s.keywords = keywords;
        s
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub statistics: RunStatistics,
    pub curation: CurationStats,
    pub statuses: Vec<SiteStatus>,
    pub records: Vec<BidRecord>,
}

impl RunReport {
    pub fn new(outcome: RunOutcome) -> Self {
        Self {
            generated_at: outcome.generated_at,
            statistics: RunStatistics::from_records(&outcome.records),
            curation: outcome.stats,
            statuses: outcome.statuses,
            records: outcome.records,
        }
    }

    /// `bids_YYYYMMDD.json`, dated in local time.
    pub fn file_name(&self) -> String {
        dated_name("bids", self.generated_at)
    }
}

/// Write the report into `data_dir` (created if missing). Returns the path.
pub fn write_json(report: &RunReport, data_dir: &Path) -> Result<PathBuf> {
    write_pretty(data_dir, &report.file_name(), report)
}

/// Curated records alone, as `bid_data_YYYYMMDD.json`.
pub fn write_raw_records(
    records: &[BidRecord],
    generated_at: DateTime<Utc>,
    data_dir: &Path,
) -> Result<PathBuf> {
    write_pretty(data_dir, &dated_name("bid_data", generated_at), &records)
}

fn dated_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}_{}.json", at.with_timezone(&Local).format("%Y%m%d"))
}

fn write_pretty<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value).context("serializing report")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
