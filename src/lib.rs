// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod crawl;
pub mod curate;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod sites;
pub mod text;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, FilterPolicy, IndustryRule, SiteDescriptor};
pub use crate::crawl::{CrawlSettings, DetailMode, SiteOutcome, SiteState, SiteStatus};
pub use crate::curate::{CurationStats, FingerprintStore};
pub use crate::error::{FetchError, ParseError, PipelineError};
pub use crate::fetch::{Fetch, FetchRequest, HttpFetcher};
pub use crate::model::BidRecord;
pub use crate::pipeline::{Pipeline, RunOutcome};
pub use crate::sites::{ParserRegistry, SiteParser};
