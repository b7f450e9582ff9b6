// src/sites/chinabidding.rs
//! 中国采购与招标网 (chinabidding.cn) keyword search.

use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use url::Url;

use super::{date_in, element_text, purchaser_in, row_link, select_rows, selector};
use super::{SiteBase, SiteParser};
use crate::config::SiteDescriptor;
use crate::error::ParseError;
use crate::model::ListItem;
use crate::text::parse_date;

/// Empty searches every category.
const CATEGORY_ID: &str = "";

pub struct ChinaBiddingParser {
    site: SiteBase,
}

impl ChinaBiddingParser {
    pub fn new(d: &SiteDescriptor) -> Result<Self, ParseError> {
        Ok(Self {
            site: SiteBase::from_descriptor(d)?,
        })
    }
}

struct Cells {
    rows: Vec<Selector>,
    td: Selector,
    time: Selector,
    area: Selector,
}

fn cells() -> &'static Cells {
    static CELLS: OnceCell<Cells> = OnceCell::new();
    CELLS.get_or_init(|| Cells {
        rows: [".search-list-box li", ".list_bid li", ".table-box tr"]
            .into_iter()
            .map(selector)
            .collect(),
        td: selector("td"),
        time: selector("span.time, td.time"),
        area: selector("span.area, td.area"),
    })
}

impl SiteParser for ChinaBiddingParser {
    fn site(&self) -> &SiteBase {
        &self.site
    }

    fn build_list_url(&self, page: u32, keywords: &[String]) -> Result<Url, ParseError> {
        let mut url = self.site.search_url.clone();
        url.query_pairs_mut()
            .append_pair("keyword", &keywords.join(" "))
            .append_pair("page", &page.to_string())
            .append_pair("categoryId", CATEGORY_ID);
        Ok(url)
    }

    fn parse_list_page(&self, markup: &str) -> Vec<Result<ListItem, ParseError>> {
        let c = cells();
        let doc = Html::parse_document(markup);
        select_rows(&doc, &c.rows)
            .into_iter()
            // header rows of the table layout carry only <th>
            .filter(|row| row.value().name() != "tr" || row.select(&c.td).next().is_some())
            .map(|row| {
                let (title, url) = row_link(&row, &self.site.base_url)?;
                let publish_date = row
                    .select(&c.time)
                    .next()
                    .and_then(|t| parse_date(&element_text(&t)))
                    .or_else(|| date_in(&element_text(&row)));
                let purchaser = row
                    .select(&c.area)
                    .next()
                    .map(|a| element_text(&a))
                    .filter(|s| !s.is_empty())
                    .or_else(|| purchaser_in(&element_text(&row)));
                Ok(ListItem {
                    title,
                    url,
                    publish_date,
                    purchaser,
                    agency: None,
                })
            })
            .collect()
    }
}
