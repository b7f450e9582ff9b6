// src/text.rs
//! Field-level helpers shared by the site parsers: whitespace cleanup,
//! Chinese date and amount parsing, URL resolution, labelled-field lookup.

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

/// Decode entities, strip tags, collapse whitespace, trim.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // \s in the regex crate covers NBSP and U+3000
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// `Some(cleaned)` unless the cleaned text is empty.
pub fn non_empty(s: &str) -> Option<String> {
    let t = clean_text(s);
    (!t.is_empty()).then_some(t)
}

/// Parse the first date found in `s`.
///
/// Accepts `2024-01-15`, `2024/1/15`, `2024年01月15日`, `2024.01.15` and
/// `20240115`. Impossible calendar dates are skipped.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    static PATTERNS: OnceCell<Vec<Regex>> = OnceCell::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"(\d{4})[年\-/](\d{1,2})[月\-/](\d{1,2})",
            r"(\d{4})\.(\d{1,2})\.(\d{1,2})",
            r"(\d{4})(\d{2})(\d{2})",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for re in patterns {
        for caps in re.captures_iter(s) {
            let y = caps[1].parse::<i32>().ok();
            let m = caps[2].parse::<u32>().ok();
            let d = caps[3].parse::<u32>().ok();
            if let (Some(y), Some(m), Some(d)) = (y, m, d) {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    return Some(date);
                }
            }
        }
    }
    None
}

/// Parse a money string into 万元 (10k units), rounded to 2 decimals.
///
/// `"100万元"` → 100, `"1.5亿元"` → 15000, `"50000元"` → 5, `"3千元"` → 0.3.
/// A bare number is taken as 万元 already.
pub fn parse_amount(s: &str) -> Option<f64> {
    static RE_STRIP: OnceCell<Regex> = OnceCell::new();
    static RE_NUM: OnceCell<Regex> = OnceCell::new();
    let re_strip = RE_STRIP.get_or_init(|| Regex::new(r"[,，\s]").unwrap());
    let re_num = RE_NUM.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());

    let s = re_strip.replace_all(s, "");
    let m = re_num.find(&s)?;
    let mut value: f64 = m.as_str().parse().ok()?;

    // Unit right after the number wins; otherwise a label ahead of it,
    // e.g. "预算金额（万元）：120", decides.
    let head = &s[..m.start()];
    let tail = &s[m.end()..];
    let unit = tail
        .chars()
        .next()
        .filter(|c| matches!(c, '亿' | '万' | '千' | '元'))
        .or_else(|| ['亿', '万', '元'].into_iter().find(|c| head.contains(*c)));
    match unit {
        Some('亿') => value *= 10_000.0,
        Some('千') => value /= 10.0,
        Some('元') => value /= 10_000.0,
        _ => {}
    }

    Some((value * 100.0).round() / 100.0)
}

/// Resolve `href` against `base`. Protocol-relative links get https.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href == "#" {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}")).ok().map(String::from);
    }
    base.join(href).ok().map(String::from)
}

/// Value following the first of `labels` in `text`, up to the next
/// line break or field separator: `"项目编号：ZB-01\n采购人：…"` with label
/// `项目编号` yields `ZB-01`.
pub fn labelled_value(text: &str, labels: &[&str]) -> Option<String> {
    for label in labels {
        let Some(pos) = text.find(label) else {
            continue;
        };
        let after = &text[pos + label.len()..];
        let after = after.trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, '：' | ':' | '）' | ')' | '(' | '（')
        });
        let value: String = after
            .chars()
            .take_while(|c| !matches!(c, '\n' | '\r' | '|' | '；' | ';'))
            .collect();
        let value = clean_text(&value);
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_ws_and_entities() {
        assert_eq!(clean_text("  hello   world  "), "hello world");
        assert_eq!(clean_text("hello\n\nworld"), "hello world");
        assert_eq!(clean_text("<b>A</b>&nbsp;B\u{3000}C"), "A B C");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn dates_in_common_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(parse_date("2024-01-15"), d);
        assert_eq!(parse_date("2024/01/15"), d);
        assert_eq!(parse_date("2024年01月15日"), d);
        assert_eq!(parse_date("发布时间：2024.1.15 10:00"), d);
        assert_eq!(parse_date("20240115"), d);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("invalid"), None);
        assert_eq!(parse_date("2024-13-40"), None);
    }

    #[test]
    fn amounts_are_normalized_to_wan() {
        assert_eq!(parse_amount("100万元"), Some(100.0));
        assert_eq!(parse_amount("1.5亿元"), Some(15000.0));
        assert_eq!(parse_amount("50000元"), Some(5.0));
        assert_eq!(parse_amount("1,200,000 元"), Some(120.0));
        assert_eq!(parse_amount("3千元"), Some(0.3));
        assert_eq!(parse_amount("88"), Some(88.0));
        assert_eq!(parse_amount("预算金额（万元）：120"), Some(120.0));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("invalid"), None);
    }

    #[test]
    fn resolve_handles_relative_and_protocol_relative() {
        let base = Url::parse("https://www.ccgp.gov.cn/cggg/").unwrap();
        assert_eq!(
            resolve_url(&base, "/a/b.htm").as_deref(),
            Some("https://www.ccgp.gov.cn/a/b.htm")
        );
        assert_eq!(
            resolve_url(&base, "c.htm").as_deref(),
            Some("https://www.ccgp.gov.cn/cggg/c.htm")
        );
        assert_eq!(
            resolve_url(&base, "//x.test/y").as_deref(),
            Some("https://x.test/y")
        );
        assert_eq!(resolve_url(&base, "javascript:void(0)"), None);
    }

    #[test]
    fn labelled_value_stops_at_line_end() {
        let text = "项目编号：ZB-2024-001\n采购人：某医院";
        assert_eq!(
            labelled_value(text, &["招标编号", "项目编号"]).as_deref(),
            Some("ZB-2024-001")
        );
        assert_eq!(labelled_value(text, &["代理机构"]), None);
    }
}
