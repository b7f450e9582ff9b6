// src/sites/cebp.rs
//! 中国招标投标公共服务平台 (cebpubservice.com) listing pages.
//!
//! The listing is a static paginated index, keywords are applied later by
//! the curation stage.

use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use url::Url;

use super::{date_in, element_text, purchaser_in, row_link, select_rows, selector};
use super::{SiteBase, SiteParser};
use crate::config::SiteDescriptor;
use crate::error::ParseError;
use crate::model::ListItem;

pub struct CebpParser {
    site: SiteBase,
}

impl CebpParser {
    pub fn new(d: &SiteDescriptor) -> Result<Self, ParseError> {
        Ok(Self {
            site: SiteBase::from_descriptor(d)?,
        })
    }
}

fn row_selectors() -> &'static [Selector] {
    static ROWS: OnceCell<Vec<Selector>> = OnceCell::new();
    ROWS.get_or_init(|| {
        ["ul.xxgg_con_list li", ".news_list li", ".list-item"]
            .into_iter()
            .map(selector)
            .collect()
    })
}

impl SiteParser for CebpParser {
    fn site(&self) -> &SiteBase {
        &self.site
    }

    fn build_list_url(&self, page: u32, _keywords: &[String]) -> Result<Url, ParseError> {
        if page <= 1 {
            return Ok(self.site.search_url.clone());
        }
        // sibling of the search page: .../list.html -> .../index_N.html
        Ok(self.site.search_url.join(&format!("index_{page}.html"))?)
    }

    fn parse_list_page(&self, markup: &str) -> Vec<Result<ListItem, ParseError>> {
        let doc = Html::parse_document(markup);
        select_rows(&doc, row_selectors())
            .into_iter()
            .map(|row| {
                let (title, url) = row_link(&row, &self.site.base_url)?;
                let text = element_text(&row);
                Ok(ListItem {
                    title,
                    url,
                    publish_date: date_in(&text),
                    purchaser: purchaser_in(&text),
                    agency: None,
                })
            })
            .collect()
    }
}
