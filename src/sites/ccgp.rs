// src/sites/ccgp.rs
//! 中国政府采购网 (ccgp.gov.cn) search results.

use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use url::Url;

use super::{agency_in, date_in, element_text, purchaser_in, row_link, select_rows, selector};
use super::{SiteBase, SiteParser};
use crate::config::SiteDescriptor;
use crate::error::ParseError;
use crate::model::ListItem;

pub struct CcgpParser {
    site: SiteBase,
}

impl CcgpParser {
    pub fn new(d: &SiteDescriptor) -> Result<Self, ParseError> {
        Ok(Self {
            site: SiteBase::from_descriptor(d)?,
        })
    }
}

fn row_selectors() -> &'static [Selector] {
    static ROWS: OnceCell<Vec<Selector>> = OnceCell::new();
    ROWS.get_or_init(|| {
        [
            "ul.vT-srch-result-list-bid li",
            "ul.c_list_bid li",
            ".list_16 li",
            "li[class*=list], li[class*=item], li[class*=result]",
        ]
        .into_iter()
        .map(selector)
        .collect()
    })
}

impl SiteParser for CcgpParser {
    fn site(&self) -> &SiteBase {
        &self.site
    }

    fn build_list_url(&self, page: u32, keywords: &[String]) -> Result<Url, ParseError> {
        let mut url = self.site.search_url.clone();
        url.query_pairs_mut()
            .append_pair("searchtype", "1")
            .append_pair("page_index", &page.to_string())
            .append_pair("bidSort", "0")
            .append_pair("pinMu", "0")
            .append_pair("bidType", "1")
            .append_pair("kw", &keywords.join(" "))
            .append_pair("start_time", "")
            .append_pair("end_time", "")
            .append_pair("timeType", "6");
        Ok(url)
    }

    fn parse_list_page(&self, markup: &str) -> Vec<Result<ListItem, ParseError>> {
        static SPAN: OnceCell<Selector> = OnceCell::new();
        let span = SPAN.get_or_init(|| selector("span"));

        let doc = Html::parse_document(markup);
        select_rows(&doc, row_selectors())
            .into_iter()
            .map(|row| {
                let (title, url) = row_link(&row, &self.site.base_url)?;
                // the meta span reads "2024.03.01 09:30:00 | 采购人：X | 代理机构：Y | 地区"
                let meta = row
                    .select(span)
                    .next()
                    .map(|s| element_text(&s))
                    .unwrap_or_else(|| element_text(&row));
                Ok(ListItem {
                    title,
                    url,
                    publish_date: date_in(&meta),
                    purchaser: purchaser_in(&meta),
                    agency: agency_in(&meta),
                })
            })
            .collect()
    }
}
