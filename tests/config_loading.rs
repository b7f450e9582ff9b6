// tests/config_loading.rs
use bid_crawler::config::{load_default, load_from, ENV_CONFIG_PATH};
use bid_crawler::crawl::DetailMode;
use bid_crawler::curate::filter;
use bid_crawler::fetch::Backoff;
use bid_crawler::model::{BidRecord, ListItem};
use chrono::Utc;
use std::{env, fs};

const MINIMAL: &str = r#"
[[websites]]
enabled = true
name = "中国政府采购网"
url = "https://www.ccgp.gov.cn"
search_url = "https://search.ccgp.gov.cn/bxsearch"
parser = "ccgp"

[tech_keywords]
medical = ["医院"]
"#;

#[test]
fn full_file_round_trips_every_section() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("config.toml");
    fs::write(
        &p,
        r#"
[crawler]
request_delay = 1.5
timeout = 10
retry_times = 5
retry_delay = 2
retry_backoff = "exponential"
retryable_statuses = [429, 403]
max_pages = 3
detail_mode = "enrich"
detail_concurrency = 4
run_timeout = 600

[[websites]]
enabled = true
name = "中国招标投标公共服务平台"
url = "http://www.cebpubservice.com/ctpsp_iiss/"
parser = "cebp"
encoding = "gbk"

[tech_keywords]
network = ["网络", "交换机"]

[[industries]]
name = "医疗"
keywords = ["医院"]

[[industries]]
name = "教育"
keywords = ["学校"]
enabled = false

[filters]
date_range = 14
min_amount = 5
max_amount = 500
title_must_contain = ["采购"]
dedup_scope = "per_source"

[output]
data_dir = "/tmp/bids"
save_raw_data = false
"#,
    )
    .unwrap();

    let cfg = load_from(&p).unwrap();
    assert_eq!(cfg.crawler.request_delay().as_millis(), 1500);
    assert_eq!(cfg.crawler.retry_backoff, Backoff::Exponential);
    let policy = cfg.crawler.retry_policy();
    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.retryable_statuses, vec![429, 403]);
    let settings = cfg.crawler.crawl_settings();
    assert_eq!(settings.max_pages, 3);
    assert_eq!(settings.detail_mode, DetailMode::Enrich);
    assert_eq!(settings.detail_concurrency, 4);
    assert_eq!(cfg.crawler.run_timeout().map(|d| d.as_secs()), Some(600));

    assert_eq!(cfg.websites[0].encoding, "gbk");
    assert_eq!(cfg.enabled_industries().len(), 1);
    let f = cfg.filter_policy();
    assert_eq!(f.lookback_days, 14);
    assert_eq!(f.max_amount, 500.0);
    assert_eq!(f.title_must_contain, vec!["采购"]);
    assert!(!cfg.output.save_raw_data);
}

#[test]
fn unreadable_or_invalid_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_from(&dir.path().join("missing.toml")).is_err());

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[crawler]\nmax_pages = \"many\"\n").unwrap();
    let err = load_from(&bad).unwrap_err();
    assert!(format!("{err:#}").contains("parsing config"));
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallback_path() {
    // isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    // 1) nothing anywhere
    assert!(load_default().is_err());

    // 2) ./config/config.toml
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("config.toml"), MINIMAL).unwrap();
    let cfg = load_default().unwrap();
    assert_eq!(cfg.websites[0].parser, "ccgp");

    // 3) env var wins
    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, MINIMAL.replace("\"ccgp\"", "\"chinabidding\"")).unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    let cfg = load_default().unwrap();
    assert_eq!(cfg.websites[0].parser, "chinabidding");

    // 4) env var pointing nowhere is an error, not a silent fallback
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
    assert!(load_default().is_err());

    env::remove_var(ENV_CONFIG_PATH);
    env::set_current_dir(&old).unwrap();
}

#[test]
fn keyword_categories_keep_file_order_through_filtering() {
    let cfg = bid_crawler::config::parse_config(
        "[tech_keywords]\nnetwork = [\"网络\"]\ndatacenter = [\"机房\"]\n",
    )
    .unwrap();
    let policy = cfg.filter_policy();
    assert_eq!(policy.keywords, vec!["网络", "机房"]);

    let item = ListItem {
        title: "某医院网络机房改造".into(),
        url: "https://bids.example.test/1".into(),
        ..Default::default()
    };
    let record = BidRecord::from_list_item(item, "ccgp", Utc::now());
    let today = Utc::now().date_naive();
    let (kept, _) = filter(vec![record], &policy, today);
    assert_eq!(kept[0].matched_keywords, vec!["网络", "机房"]);
}
