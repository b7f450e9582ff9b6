// src/sites/detail.rs
//! Label-driven extraction for announcement detail pages.
//!
//! Detail layouts differ wildly between sites but nearly all of them print
//! `label：value` pairs, either inline or split across table cells. The page
//! text is flattened one text node per line and each field is looked up by
//! its known labels, most specific first.

use scraper::{Html, Node};

use crate::model::DetailFields;
use crate::text::{labelled_value, parse_amount, parse_date};

const BID_NUMBER: &[&str] = &["项目编号", "招标编号", "采购编号"];
const PURCHASER: &[&str] = &["采购人名称", "采购单位名称", "采购人", "招标人", "采购单位"];
const AGENCY: &[&str] = &["代理机构名称", "代理机构", "招标代理"];
const BUDGET: &[&str] = &["预算金额", "采购预算", "项目金额", "最高限价"];
const DEADLINE: &[&str] = &[
    "投标截止时间",
    "响应文件提交截止时间",
    "投标截止",
    "报名截止",
    "截止时间",
];
const CONTACT: &[&str] = &["联系方式", "联系电话", "联系人"];
const ADDRESS: &[&str] = &["地址"];

pub fn extract_labelled_fields(markup: &str) -> DetailFields {
    let text = page_text(markup);
    let field = |labels: &[&str]| labelled_value(&text, labels).map(|v| cut_at_next_label(&v));

    DetailFields {
        bid_number: field(BID_NUMBER)
            .and_then(|v| v.split_whitespace().next().map(str::to_string)),
        purchaser: field(PURCHASER),
        agency: field(AGENCY),
        deadline_date: field(DEADLINE).and_then(|v| parse_date(&v)),
        budget_amount: labelled_value(&text, BUDGET).and_then(|v| parse_amount(&v)),
        contact: field(CONTACT),
        address: field(ADDRESS),
        content: (!text.is_empty()).then(|| text.clone()),
    }
}

/// Visible text, one text node per line. Script and style bodies are skipped.
fn page_text(markup: &str) -> String {
    let doc = Html::parse_document(markup);
    let mut lines = Vec::new();
    for node in doc.root_element().descendants() {
        let Node::Text(t) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .map_or(false, |name| matches!(name, "script" | "style" | "title"));
        if hidden {
            continue;
        }
        let t = t.trim();
        if !t.is_empty() {
            lines.push(t.to_string());
        }
    }
    lines.join("\n")
}

/// `"某市医院 联系人：张三"` → `"某市医院"` when several labelled pairs
/// share one line.
fn cut_at_next_label(value: &str) -> String {
    let Some(colon) = value.find('：') else {
        return value.to_string();
    };
    match value[..colon].rfind(char::is_whitespace) {
        Some(ws) => value[..ws].trim().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn table_layout_splits_label_and_value_cells() {
        let html = r#"<html><head><title>采购人：不是这个</title>
            <script>var 采购人 = "x";</script></head><body>
            <table>
              <tr><td>项目编号：</td><td>ZB-2024-001 (A包)</td></tr>
              <tr><td>采购人名称</td><td>某市第一人民医院</td></tr>
              <tr><td>预算金额</td><td>1,200,000.00元</td></tr>
              <tr><td>投标截止时间</td><td>2024年03月20日 09:30</td></tr>
            </table></body></html>"#;
        let d = extract_labelled_fields(html);
        assert_eq!(d.bid_number.as_deref(), Some("ZB-2024-001"));
        assert_eq!(d.purchaser.as_deref(), Some("某市第一人民医院"));
        assert_eq!(d.budget_amount, Some(120.0));
        assert_eq!(d.deadline_date, NaiveDate::from_ymd_opt(2024, 3, 20));
        assert_eq!(d.agency, None);
    }

    #[test]
    fn inline_pairs_on_one_line_are_separated() {
        let html = "<p>采购人：某区卫健委 联系人：李工</p><p>地址：某市某路1号</p>\
                    <p>采购预算（万元）：85.5</p>";
        let d = extract_labelled_fields(html);
        assert_eq!(d.purchaser.as_deref(), Some("某区卫健委"));
        assert_eq!(d.contact.as_deref(), Some("李工"));
        assert_eq!(d.address.as_deref(), Some("某市某路1号"));
        assert_eq!(d.budget_amount, Some(85.5));
    }

    #[test]
    fn page_without_labels_is_empty_but_keeps_text() {
        let d = extract_labelled_fields("<div>公告已撤回</div>");
        assert!(d.is_empty());
        assert_eq!(d.content.as_deref(), Some("公告已撤回"));
        assert_eq!(extract_labelled_fields("<html></html>").content, None);
    }

    #[test]
    fn content_is_visible_text_without_script_or_title() {
        let html = "<html><head><title>标题</title><style>p{}</style></head>\
                    <body><h1>某医院采购公告</h1><p>一、项目概况</p>\
                    <script>track()</script></body></html>";
        let d = extract_labelled_fields(html);
        assert_eq!(d.content.as_deref(), Some("某医院采购公告\n一、项目概况"));
    }
}
