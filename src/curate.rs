// src/curate.rs
//! Curation stage: dedup → classify → filter over the merged crawl output.
//!
//! Pure and single-threaded. The only state that outlives a call is the
//! caller-owned [`FingerprintStore`].

use chrono::{Duration, NaiveDate};
use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::{DedupScope, FilterPolicy, IndustryRule};
use crate::model::{BidRecord, OTHER_INDUSTRY};

/// Seen-fingerprint set consulted by the dedup pass.
pub trait FingerprintStore: Send {
    /// Record `fp`; `true` if it was not seen before.
    fn insert(&mut self, fp: &str) -> bool;
}

impl FingerprintStore for HashSet<String> {
    fn insert(&mut self, fp: &str) -> bool {
        if self.contains(fp) {
            return false;
        }
        HashSet::insert(self, fp.to_string())
    }
}

/// Drop repeats, first occurrence wins. Every returned record carries its
/// `content_fingerprint`.
pub fn dedup(
    records: Vec<BidRecord>,
    store: &mut dyn FingerprintStore,
    scope: DedupScope,
) -> (Vec<BidRecord>, usize) {
    let include_source = scope == DedupScope::PerSource;
    let mut keep = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    for mut r in records {
        let fp = r.fingerprint(include_source);
        if !store.insert(&fp) {
            dropped += 1;
            debug!(target: "curate", title = %r.title, source = %r.source_name, "duplicate dropped");
            continue;
        }
        r.content_fingerprint = Some(fp);
        keep.push(r);
    }
    (keep, dropped)
}

/// Assign `industry` from the first enabled rule with a keyword in the title.
pub fn classify(records: &mut [BidRecord], rules: &[IndustryRule]) {
    let rules: Vec<(&str, Vec<String>)> = rules
        .iter()
        .filter(|r| r.enabled)
        .map(|r| (r.name.as_str(), lowered_terms(&r.keywords)))
        .collect();

    for r in records.iter_mut() {
        let title = r.title.to_lowercase();
        let label = rules
            .iter()
            .find(|(_, kws)| kws.iter().any(|k| title.contains(k.as_str())))
            .map_or(OTHER_INDUSTRY, |(name, _)| *name);
        r.industry = Some(label.to_string());
    }
}

/// Why records left the filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub no_keywords: usize,
    pub out_of_date: usize,
    pub out_of_amount: usize,
    pub title_terms: usize,
}

impl FilterStats {
    pub fn dropped(&self) -> usize {
        self.no_keywords + self.out_of_date + self.out_of_amount + self.title_terms
    }
}

/// Apply the inclusion policy. Unknown publish dates and budgets pass their
/// checks; survivors carry non-empty `matched_keywords`.
pub fn filter(
    records: Vec<BidRecord>,
    policy: &FilterPolicy,
    today: NaiveDate,
) -> (Vec<BidRecord>, FilterStats) {
    let keywords: Vec<(&str, String)> = policy
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| (k, k.to_lowercase()))
        .collect();
    let must = lowered_terms(&policy.title_must_contain);
    let any = lowered_terms(&policy.title_any_contain);
    let oldest = (policy.lookback_days > 0)
        .then(|| today - Duration::days(i64::from(policy.lookback_days)));

    let mut stats = FilterStats::default();
    let mut keep = Vec::with_capacity(records.len());
    for mut r in records {
        let title = r.title.to_lowercase();

        let mut matched: Vec<String> = Vec::new();
        for (original, lowered) in &keywords {
            if title.contains(lowered.as_str())
                && !matched.iter().any(|m| m.to_lowercase() == *lowered)
            {
                matched.push((*original).to_string());
            }
        }
        if matched.is_empty() {
            stats.no_keywords += 1;
            continue;
        }

        if let (Some(oldest), Some(published)) = (oldest, r.publish_date) {
            if published < oldest {
                stats.out_of_date += 1;
                continue;
            }
        }

        if let Some(amount) = r.budget_amount {
            let below = policy.min_amount > 0.0 && amount < policy.min_amount;
            let above = policy.max_amount > 0.0 && amount > policy.max_amount;
            if below || above {
                stats.out_of_amount += 1;
                continue;
            }
        }

        let all_present = must.iter().all(|t| title.contains(t.as_str()));
        let any_present = any.is_empty() || any.iter().any(|t| title.contains(t.as_str()));
        if !all_present || !any_present {
            stats.title_terms += 1;
            continue;
        }

        r.matched_keywords = matched;
        keep.push(r);
    }
    (keep, stats)
}

fn lowered_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Per-pass counts for one curation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CurationStats {
    pub input: usize,
    pub duplicates: usize,
    pub no_keywords: usize,
    pub out_of_date: usize,
    pub out_of_amount: usize,
    pub title_terms: usize,
    pub passed: usize,
}

/// Industry rules plus filter policy, applied as one stage.
#[derive(Debug, Clone)]
pub struct Curator {
    industries: Vec<IndustryRule>,
    policy: FilterPolicy,
}

impl Curator {
    pub fn new(industries: Vec<IndustryRule>, policy: FilterPolicy) -> Self {
        Self { industries, policy }
    }

    pub fn curate(
        &self,
        records: Vec<BidRecord>,
        store: &mut dyn FingerprintStore,
        today: NaiveDate,
    ) -> (Vec<BidRecord>, CurationStats) {
        let input = records.len();
        let (mut records, duplicates) = dedup(records, store, self.policy.dedup_scope);
        classify(&mut records, &self.industries);
        let (records, f) = filter(records, &self.policy, today);

        let stats = CurationStats {
            input,
            duplicates,
            no_keywords: f.no_keywords,
            out_of_date: f.out_of_date,
            out_of_amount: f.out_of_amount,
            title_terms: f.title_terms,
            passed: records.len(),
        };

        for (reason, n) in [
            ("duplicate", stats.duplicates),
            ("no_keywords", stats.no_keywords),
            ("out_of_date", stats.out_of_date),
            ("out_of_amount", stats.out_of_amount),
            ("title_terms", stats.title_terms),
        ] {
            if n > 0 {
                counter!("curation_dropped_total", "reason" => reason).increment(n as u64);
            }
        }
        counter!("curation_kept_total").increment(stats.passed as u64);
        info!(
            target: "curate",
            input = stats.input,
            duplicates = stats.duplicates,
            filtered = f.dropped(),
            passed = stats.passed,
            "curation done"
        );
        (records, stats)
    }
}
