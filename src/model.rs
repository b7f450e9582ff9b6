// src/model.rs
//! Canonical bid record and its partial forms produced by site parsers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Industry label assigned when no configured rule matches.
pub const OTHER_INDUSTRY: &str = "other";

const FIELD_SEP: char = '\u{1f}';

/// One discovered announcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BidRecord {
    pub title: String,
    pub source_url: String,
    pub source_name: String,

    pub bid_number: Option<String>,
    pub purchaser: Option<String>,
    pub agency: Option<String>,
    pub publish_date: Option<NaiveDate>,
    pub deadline_date: Option<NaiveDate>,
    /// Budget in units of 10k (万元). `None` means unknown, not zero.
    pub budget_amount: Option<f64>,
    pub contact: Option<String>,
    pub address: Option<String>,
    /// Announcement body text, only present after detail enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    // Set by the curation stage only.
    pub industry: Option<String>,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    pub content_fingerprint: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

/// Fields a list page exposes for one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListItem {
    pub title: String,
    pub url: String,
    pub publish_date: Option<NaiveDate>,
    pub purchaser: Option<String>,
    pub agency: Option<String>,
}

/// Fields only visible on the detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailFields {
    pub bid_number: Option<String>,
    pub purchaser: Option<String>,
    pub agency: Option<String>,
    pub deadline_date: Option<NaiveDate>,
    pub budget_amount: Option<f64>,
    pub contact: Option<String>,
    pub address: Option<String>,
    /// Visible page text, one text node per line.
    pub content: Option<String>,
}

impl DetailFields {
    /// True when no labelled field was found. Body text alone does not count.
    pub fn is_empty(&self) -> bool {
        DetailFields {
            content: None,
            ..self.clone()
        } == DetailFields::default()
    }
}

impl BidRecord {
    /// Wrap a list entry, stamping source and crawl time.
    pub fn from_list_item(item: ListItem, source_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            title: item.title,
            source_url: item.url,
            source_name: source_name.to_string(),
            bid_number: None,
            purchaser: item.purchaser,
            agency: item.agency,
            publish_date: item.publish_date,
            deadline_date: None,
            budget_amount: None,
            contact: None,
            address: None,
            content: None,
            industry: None,
            matched_keywords: Vec::new(),
            content_fingerprint: None,
            discovered_at: now,
        }
    }

    /// Merge detail-page fields. Identity fields are never touched and
    /// purchaser/agency from the list view win over the detail ones.
    pub fn apply_detail(&mut self, d: DetailFields) {
        fn fill<T>(slot: &mut Option<T>, v: Option<T>) {
            if v.is_some() {
                *slot = v;
            }
        }
        fill(&mut self.bid_number, d.bid_number);
        fill(&mut self.deadline_date, d.deadline_date);
        fill(&mut self.budget_amount, d.budget_amount);
        fill(&mut self.contact, d.contact);
        fill(&mut self.address, d.address);
        fill(&mut self.content, d.content);
        if self.purchaser.is_none() {
            self.purchaser = d.purchaser;
        }
        if self.agency.is_none() {
            self.agency = d.agency;
        }
    }

    /// Dedup identity. `include_source` scopes identity to one site.
    pub fn fingerprint(&self, include_source: bool) -> String {
        let source = if include_source {
            normalize_title(&self.source_name)
        } else {
            String::new()
        };
        fingerprint_of(&self.title, self.publish_date, &source)
    }
}

/// Canonical title form used for identity: trimmed, whitespace runs
/// collapsed (NBSP and ideographic space included), full-width ASCII
/// folded, lowercased.
pub fn normalize_title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars() {
        let ch = fold_fullwidth(ch);
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(ch.to_lowercase());
    }
    out
}

fn fold_fullwidth(ch: char) -> char {
    match ch {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch),
        _ => ch,
    }
}

fn fingerprint_of(title: &str, date: Option<NaiveDate>, source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    hasher.update([FIELD_SEP as u8]);
    if let Some(d) = date {
        hasher.update(d.format("%Y-%m-%d").to_string().as_bytes());
    }
    hasher.update([FIELD_SEP as u8]);
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
pub(crate) fn sample(title: &str, source: &str, date: Option<NaiveDate>) -> BidRecord {
    let item = ListItem {
        title: title.to_string(),
        url: format!("https://{source}.example.test/{}", title.len()),
        publish_date: date,
        ..Default::default()
    };
    BidRecord::from_list_item(item, source, Utc::now())
}
