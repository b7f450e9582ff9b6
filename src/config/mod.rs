// src/config/mod.rs
//! Configuration loading: TOML file resolved from an explicit path, the
//! `BID_CRAWLER_CONFIG` env var, or `config/config.toml`.

pub mod settings;

pub use settings::{
    AppConfig, CrawlerSection, DedupScope, FilterPolicy, FilterSection, IndustryRule,
    OutputSection, SiteDescriptor,
};

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::sites::ParserRegistry;

pub const ENV_CONFIG_PATH: &str = "BID_CRAWLER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    parse_config(&content).with_context(|| format!("parsing config {}", path.display()))
}

/// Load configuration using env var + fallback:
/// 1) $BID_CRAWLER_CONFIG
/// 2) config/config.toml
pub fn load_default() -> Result<AppConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let p = PathBuf::from(DEFAULT_CONFIG_PATH);
    if p.exists() {
        return load_from(&p);
    }
    Err(anyhow!(
        "no configuration found (set {ENV_CONFIG_PATH} or create {DEFAULT_CONFIG_PATH})"
    ))
}

pub fn parse_config(s: &str) -> Result<AppConfig> {
    let mut cfg: AppConfig = toml::from_str(s)?;
    for site in &mut cfg.websites {
        site.name = site.name.trim().to_string();
        site.parser = site.parser.trim().to_ascii_lowercase();
    }
    Ok(cfg)
}

impl AppConfig {
    /// Non-fatal problems worth surfacing before a run.
    pub fn validate(&self, registry: &ParserRegistry) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.websites.is_empty() {
            warnings.push("no websites configured".to_string());
        } else if !self.websites.iter().any(|s| s.enabled) {
            warnings.push("no website is enabled".to_string());
        }
        if self.keywords().is_empty() {
            warnings.push("no tech_keywords configured; every record will be filtered out".into());
        }
        for (category, kws) in &self.tech_keywords {
            let all_strings = kws
                .as_array()
                .is_some_and(|a| a.iter().all(toml::Value::is_str));
            if !all_strings {
                warnings.push(format!(
                    "tech_keywords.{category} is not an array of strings; non-string entries are ignored"
                ));
            }
        }
        for site in self.websites.iter().filter(|s| s.enabled) {
            if !registry.contains(&site.parser) {
                warnings.push(format!(
                    "website '{}' uses unknown parser '{}'",
                    site.name, site.parser
                ));
            }
            if url::Url::parse(&site.url).is_err() {
                warnings.push(format!("website '{}' has invalid url '{}'", site.name, site.url));
            }
        }
        let f = &self.filters;
        if f.min_amount > 0.0 && f.max_amount > 0.0 && f.min_amount > f.max_amount {
            warnings.push(format!(
                "min_amount {} exceeds max_amount {}; no budgeted record can pass",
                f.min_amount, f.max_amount
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::DetailMode;
    use crate::fetch::Backoff;

    const SAMPLE: &str = r#"
[crawler]
request_delay = 0.5
retry_backoff = "exponential"
detail_mode = "enrich"

[[websites]]
enabled = true
name = " 中国政府采购网 "
url = "https://www.ccgp.gov.cn"
search_url = "https://search.ccgp.gov.cn/bxsearch"
parser = "CCGP"

[[websites]]
name = "disabled one"
url = "https://example.test"
parser = "cebp"

[tech_keywords]
b_network = ["网络", "交换机"]
a_medical = ["医院", "网络"]

[[industries]]
name = "医疗"
keywords = ["医院", "卫生"]

[filters]
min_amount = 10
"#;

    #[test]
    fn defaults_fill_missing_keys() {
        let cfg = parse_config(SAMPLE).unwrap();
        assert_eq!(cfg.crawler.timeout, 30);
        assert_eq!(cfg.crawler.retry_times, 3);
        assert_eq!(cfg.crawler.max_pages, 10);
        assert_eq!(cfg.crawler.retry_backoff, Backoff::Exponential);
        assert_eq!(cfg.crawler.detail_mode, DetailMode::Enrich);
        assert_eq!(cfg.crawler.request_delay().as_millis(), 500);
        assert_eq!(cfg.filters.date_range, 7);
        assert_eq!(cfg.filters.dedup_scope, DedupScope::CrossSource);
        assert_eq!(cfg.websites[0].encoding, "utf-8");
        assert_eq!(cfg.websites[0].parser, "ccgp");
        assert_eq!(cfg.websites[0].name, "中国政府采购网");
        assert!(cfg.industries[0].enabled);
    }

    #[test]
    fn keywords_flatten_in_file_order_without_repeats() {
        let cfg = parse_config(SAMPLE).unwrap();
        // b_network is written first, so it leads despite sorting after a_medical
        assert_eq!(cfg.keywords(), vec!["网络", "交换机", "医院"]);
        assert_eq!(cfg.enabled_sites().len(), 1);
        let policy = cfg.filter_policy();
        assert_eq!(policy.min_amount, 10.0);
        assert_eq!(policy.lookback_days, 7);
    }

    #[test]
    fn validate_flags_unknown_parser() {
        let mut cfg = parse_config(SAMPLE).unwrap();
        let reg = ParserRegistry::builtin();
        assert!(cfg.validate(&reg).is_empty());
        cfg.websites[0].parser = "nope".into();
        let w = cfg.validate(&reg);
        assert!(w.iter().any(|m| m.contains("unknown parser 'nope'")), "{w:?}");
    }

    #[test]
    fn non_string_keywords_are_skipped_and_reported() {
        let cfg = parse_config(
            "[tech_keywords]\nnetwork = [\"网络\", 3]\nbroken = \"机房\"\n",
        )
        .unwrap();
        assert_eq!(cfg.keywords(), vec!["网络"]);
        let w = cfg.validate(&ParserRegistry::builtin());
        assert!(w.iter().any(|m| m.contains("tech_keywords.network")), "{w:?}");
        assert!(w.iter().any(|m| m.contains("tech_keywords.broken")), "{w:?}");
    }

    #[test]
    fn empty_file_is_valid_toml_with_defaults() {
        let cfg = parse_config("").unwrap();
        assert!(cfg.websites.is_empty());
        assert_eq!(cfg.output.data_dir, "./data");
        assert!(!cfg.validate(&ParserRegistry::builtin()).is_empty());
    }
}
