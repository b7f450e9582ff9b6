// src/config/settings.rs
//! Configuration schema with the defaults applied when a section or key
//! is missing from the TOML file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::crawl::{CrawlSettings, DetailMode};
use crate::fetch::{Backoff, RetryPolicy};

fn default_request_delay_secs() -> f64 {
    2.0
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retry_times() -> u32 {
    3
}
fn default_retry_delay_secs() -> f64 {
    5.0
}
fn default_retryable_statuses() -> Vec<u16> {
    vec![429]
}
fn default_max_pages() -> u32 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_detail_concurrency() -> usize {
    2
}
fn default_date_range() -> u32 {
    7
}
fn default_encoding() -> String {
    "utf-8".to_string()
}
fn default_true() -> bool {
    true
}
fn default_data_dir() -> String {
    "./data".to_string()
}

/// Full configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub crawler: CrawlerSection,
    #[serde(default)]
    pub websites: Vec<SiteDescriptor>,
    /// Category → keyword array, kept in file order (toml `preserve_order`).
    #[serde(default)]
    pub tech_keywords: toml::Table,
    #[serde(default)]
    pub industries: Vec<IndustryRule>,
    #[serde(default)]
    pub filters: FilterSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerSection {
    /// Minimum gap between any two outbound requests.
    #[serde(default = "default_request_delay_secs")]
    pub request_delay: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    /// Extra attempts after the first one.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay: f64,
    #[serde(default)]
    pub retry_backoff: Backoff,
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub detail_mode: DetailMode,
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,
    /// Whole-run deadline in seconds; 0 disables it.
    #[serde(default)]
    pub run_timeout: u64,
}

impl Default for CrawlerSection {
    fn default() -> Self {
        Self {
            request_delay: default_request_delay_secs(),
            timeout: default_timeout_secs(),
            retry_times: default_retry_times(),
            retry_delay: default_retry_delay_secs(),
            retry_backoff: Backoff::default(),
            retryable_statuses: default_retryable_statuses(),
            max_pages: default_max_pages(),
            user_agent: default_user_agent(),
            detail_mode: DetailMode::default(),
            detail_concurrency: default_detail_concurrency(),
            run_timeout: 0,
        }
    }
}

impl CrawlerSection {
    pub fn request_delay(&self) -> Duration {
        secs_f64(self.request_delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_times,
            delay: secs_f64(self.retry_delay),
            backoff: self.retry_backoff,
            retryable_statuses: self.retryable_statuses.clone(),
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            max_pages: self.max_pages,
            detail_mode: self.detail_mode,
            detail_concurrency: self.detail_concurrency.max(1),
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout > 0).then(|| Duration::from_secs(self.run_timeout))
    }
}

// Negative or NaN values in the file mean "no delay".
fn secs_f64(v: f64) -> Duration {
    if v.is_finite() && v > 0.0 {
        Duration::from_secs_f64(v)
    } else {
        Duration::ZERO
    }
}

/// One source site. Read-only to the crawl core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDescriptor {
    #[serde(default)]
    pub enabled: bool,
    pub name: String,
    /// Base URL used to resolve relative links.
    pub url: String,
    #[serde(default)]
    pub search_url: String,
    /// Parser identifier, e.g. "ccgp".
    pub parser: String,
    /// Charset hint for decoding responses.
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

/// Industry label with its trigger keywords, tried in configured order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryRule {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl IndustryRule {
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            enabled: true,
        }
    }
}

/// Whether dedup identity includes the source site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// Same title + publish date from any two sites is one announcement.
    #[default]
    CrossSource,
    /// Identity is per site; cross-site repeats are kept.
    PerSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSection {
    /// Lookback window in days; 0 disables the date filter.
    #[serde(default = "default_date_range")]
    pub date_range: u32,
    /// 万元; 0 disables the bound.
    #[serde(default)]
    pub min_amount: f64,
    #[serde(default)]
    pub max_amount: f64,
    #[serde(default)]
    pub title_must_contain: Vec<String>,
    #[serde(default)]
    pub title_any_contain: Vec<String>,
    #[serde(default)]
    pub dedup_scope: DedupScope,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            date_range: default_date_range(),
            min_amount: 0.0,
            max_amount: 0.0,
            title_must_contain: Vec::new(),
            title_any_contain: Vec::new(),
            dedup_scope: DedupScope::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_true")]
    pub save_raw_data: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            save_raw_data: true,
        }
    }
}

/// Everything the curation stage's filter pass needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPolicy {
    pub keywords: Vec<String>,
    pub lookback_days: u32,
    pub min_amount: f64,
    pub max_amount: f64,
    pub title_must_contain: Vec<String>,
    pub title_any_contain: Vec<String>,
    pub dedup_scope: DedupScope,
}

impl FilterPolicy {
    /// Policy with only keyword inclusion active.
    pub fn with_keywords<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }
}

impl AppConfig {
    /// Enabled sites only, in configured order.
    pub fn enabled_sites(&self) -> Vec<SiteDescriptor> {
        self.websites.iter().filter(|s| s.enabled).cloned().collect()
    }

    /// Flat keyword list: categories in file order, first occurrence kept.
    /// Non-string entries are ignored (and reported by `validate`).
    pub fn keywords(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for kws in self.tech_keywords.values().filter_map(toml::Value::as_array) {
            for k in kws.iter().filter_map(toml::Value::as_str) {
                let t = k.trim();
                if !t.is_empty() && seen.insert(t.to_string()) {
                    out.push(t.to_string());
                }
            }
        }
        out
    }

    pub fn enabled_industries(&self) -> Vec<IndustryRule> {
        self.industries.iter().filter(|i| i.enabled).cloned().collect()
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            keywords: self.keywords(),
            lookback_days: self.filters.date_range,
            min_amount: self.filters.min_amount,
            max_amount: self.filters.max_amount,
            title_must_contain: self.filters.title_must_contain.clone(),
            title_any_contain: self.filters.title_any_contain.clone(),
            dedup_scope: self.filters.dedup_scope,
        }
    }
}
