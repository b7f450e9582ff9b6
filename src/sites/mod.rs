// src/sites/mod.rs
//! Site parsers: one implementation per procurement website.
//!
//! A parser knows how to build a paginated search URL for its site and how
//! to turn list/detail markup into [`ListItem`]s and [`DetailFields`]. The
//! network-facing operations (`fetch_list_page`, `fetch_detail`) are provided
//! once here and shared by every variant.

pub mod ccgp;
pub mod cebp;
pub mod chinabidding;
pub mod detail;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::config::SiteDescriptor;
use crate::error::{ParseError, SiteError};
use crate::fetch::{Fetch, FetchRequest};
use crate::model::{BidRecord, DetailFields, ListItem};
use crate::text::{clean_text, non_empty, parse_date, resolve_url};

/// Site identity shared by every parser variant.
#[derive(Debug, Clone)]
pub struct SiteBase {
    pub name: String,
    pub base_url: Url,
    /// Falls back to `base_url` when not configured.
    pub search_url: Url,
    pub encoding: String,
}

impl SiteBase {
    pub fn from_descriptor(d: &SiteDescriptor) -> Result<Self, ParseError> {
        let base_url = Url::parse(&d.url)?;
        let search_url = if d.search_url.trim().is_empty() {
            base_url.clone()
        } else {
            Url::parse(d.search_url.trim())?
        };
        Ok(Self {
            name: d.name.clone(),
            base_url,
            search_url,
            encoding: d.encoding.clone(),
        })
    }
}

#[async_trait]
pub trait SiteParser: Send + Sync {
    fn site(&self) -> &SiteBase;

    fn source_name(&self) -> &str {
        &self.site().name
    }

    /// Search-results URL for `page` (1-based).
    fn build_list_url(&self, page: u32, keywords: &[String]) -> Result<Url, ParseError>;

    /// Request for a list page. GET of [`SiteParser::build_list_url`] unless
    /// the site needs something else.
    fn list_request(&self, page: u32, keywords: &[String]) -> Result<FetchRequest, ParseError> {
        let url = self.build_list_url(page, keywords)?;
        Ok(FetchRequest::get(url.as_str()).with_encoding(self.site().encoding.clone()))
    }

    /// Extract list entries. Absent optional fields stay `None`; entries
    /// that cannot be read come back as `Err` and are skipped by the caller.
    fn parse_list_page(&self, markup: &str) -> Vec<Result<ListItem, ParseError>>;

    fn parse_detail_page(&self, markup: &str) -> Result<DetailFields, ParseError> {
        Ok(detail::extract_labelled_fields(markup))
    }

    fn supports_detail(&self) -> bool {
        true
    }

    /// Build URL, fetch, parse and wrap each entry into a [`BidRecord`]
    /// stamped with this site's name and the current time.
    async fn fetch_list_page(
        &self,
        fetcher: &dyn Fetch,
        page: u32,
        keywords: &[String],
    ) -> Result<Vec<BidRecord>, SiteError> {
        let req = self.list_request(page, keywords)?;
        debug!(target: "crawl", site = self.source_name(), page, url = %req.url, "fetching list page");
        let body = fetcher.fetch(&req).await?;

        let now = Utc::now();
        let mut records = Vec::new();
        for (index, entry) in self.parse_list_page(&body).into_iter().enumerate() {
            match entry.and_then(validate_item) {
                Ok(item) => records.push(BidRecord::from_list_item(item, self.source_name(), now)),
                Err(e) => {
                    counter!("parse_item_errors_total").increment(1);
                    warn!(
                        target: "crawl",
                        site = self.source_name(),
                        page,
                        index,
                        error = %e,
                        "skipping malformed list entry"
                    );
                }
            }
        }
        Ok(records)
    }

    async fn fetch_detail(&self, fetcher: &dyn Fetch, url: &str) -> Result<DetailFields, SiteError> {
        let req = FetchRequest::get(url).with_encoding(self.site().encoding.clone());
        let body = fetcher.fetch(&req).await?;
        Ok(self.parse_detail_page(&body)?)
    }
}

fn validate_item(item: ListItem) -> Result<ListItem, ParseError> {
    if item.title.trim().is_empty() {
        return Err(ParseError::MissingField("title"));
    }
    if item.url.trim().is_empty() {
        return Err(ParseError::MissingField("url"));
    }
    Url::parse(&item.url)?;
    Ok(item)
}

/* ----------------------------
Registry
---------------------------- */

pub type ParserCtor = fn(&SiteDescriptor) -> Result<Arc<dyn SiteParser>, ParseError>;

/// Parser identifier → constructor, built once at startup.
#[derive(Clone)]
pub struct ParserRegistry {
    ctors: HashMap<String, ParserCtor>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Registry with every parser shipped in this crate.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register("ccgp", |d| Ok(Arc::new(ccgp::CcgpParser::new(d)?)));
        r.register("cebp", |d| Ok(Arc::new(cebp::CebpParser::new(d)?)));
        r.register("chinabidding", |d| {
            Ok(Arc::new(chinabidding::ChinaBiddingParser::new(d)?))
        });
        r
    }

    pub fn register(&mut self, id: &str, ctor: ParserCtor) {
        self.ctors.insert(id.to_ascii_lowercase(), ctor);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ctors.contains_key(&id.to_ascii_lowercase())
    }

    pub fn build(&self, d: &SiteDescriptor) -> Result<Arc<dyn SiteParser>, ParseError> {
        let ctor = self
            .ctors
            .get(&d.parser.to_ascii_lowercase())
            .ok_or_else(|| ParseError::UnknownParser(d.parser.clone()))?;
        ctor(d)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/* ----------------------------
Row helpers shared by list parsers
---------------------------- */

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("static selector `{css}`: {e:?}"))
}

/// Rows matched by the first selector that yields anything.
pub(crate) fn select_rows<'a>(doc: &'a scraper::Html, candidates: &[Selector]) -> Vec<ElementRef<'a>> {
    for sel in candidates {
        let rows: Vec<_> = doc.select(sel).collect();
        if !rows.is_empty() {
            return rows;
        }
    }
    Vec::new()
}

pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Title and absolute URL from the row's first link.
pub(crate) fn row_link(row: &ElementRef<'_>, base: &Url) -> Result<(String, String), ParseError> {
    static LINK: OnceCell<Selector> = OnceCell::new();
    let link = LINK.get_or_init(|| selector("a[href]"));

    let a = row
        .select(link)
        .next()
        .ok_or(ParseError::MissingField("link"))?;
    // Lists often truncate the link text and keep the full title in the
    // attribute; take whichever is longer.
    let text = non_empty(&a.text().collect::<String>());
    let attr = a.value().attr("title").and_then(non_empty);
    let title = match (text, attr) {
        (Some(t), Some(full)) if full.chars().count() > t.chars().count() => full,
        (Some(t), _) => t,
        (None, attr) => attr.ok_or(ParseError::MissingField("title"))?,
    };
    let href = a.value().attr("href").unwrap_or_default();
    let url = resolve_url(base, href)
        .ok_or_else(|| ParseError::Malformed(format!("unusable link `{href}`")))?;
    Ok((title, url))
}

/// First `YYYY-MM-DD`-like date anywhere in `text`.
pub(crate) fn date_in(text: &str) -> Option<chrono::NaiveDate> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\d{4}(?:[-/.]\d{1,2}[-/.]\d{1,2}|年\d{1,2}月\d{1,2}日?)").unwrap()
    });
    re.find(text).and_then(|m| parse_date(m.as_str()))
}

/// Value after `采购人：`, `招标人：` or `业主：` up to the next `|`.
pub(crate) fn purchaser_in(text: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"(?:采购人|招标人|业主)\s*[：:]\s*([^|｜\n]+)").unwrap());
    re.captures(text).and_then(|c| non_empty(&c[1]))
}

/// Value after `代理机构：` up to the next `|`.
pub(crate) fn agency_in(text: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"代理机构\s*[：:]\s*([^|｜\n]+)").unwrap());
    re.captures(text).and_then(|c| non_empty(&c[1]))
}
