//! End-to-end engine tests against a scripted fake automation provider.
//!
//! The fake serves a small in-memory site: a listing page plus detail pages
//! with configurable protection markers, copy-button behavior, source tabs,
//! and clipboard quirks. No browser involved.

use async_trait::async_trait;
use magpie::automation::{Automation, ClickTarget, PageSession};
use magpie::batch::Orchestrator;
use magpie::config::Config;
use magpie::error::AutomationError;
use magpie::extract::{js, RollingHash, StrategyChain};
use magpie::ledger::{Ledger, LedgerRecord};
use magpie::store::parse_content_file;
use magpie::types::{ItemStatus, StrategyKind};
use magpie::verify::Verifier;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const OPEN_BODY: &str = "Open-source script\nSession tools";
const INVITE_BODY: &str = "This is an invite-only script. Request access from the author.";

const SOURCE_A: &str = "//@version=5\nindicator(\"Alpha Trend\", overlay=true)\nlen = input.int(14)\nplot(ta.ema(close, len))\n";
const SOURCE_B: &str = "//@version=5\nstrategy(\"Beta Breakout\")\nif ta.crossover(close, ta.sma(close, 20))\n    strategy.entry(\"long\", strategy.long)\n";
const SOURCE_C: &str = "//@version=5\nindicator(\"Gamma Bands\")\nbasis = ta.sma(close, 20)\nplot(basis)\nplot(basis + ta.stdev(close, 20))\n";

#[derive(Clone, Default)]
struct FakePage {
    body_text: String,
    title: String,
    author: String,
    html: String,
    listing_links: Vec<(String, String)>,
    /// Payload a copy-affordance click places on the clipboard.
    copy_payload: Option<String>,
    /// A copy affordance exists even when clicking it yields nothing.
    copy_button: bool,
    /// Raw line text behind the source tab, if the tab exists.
    tab_source: Option<String>,
    /// When set, clearing the clipboard has no effect (stale-clipboard bug).
    sticky_clipboard: bool,
}

impl FakePage {
    fn open(title: &str) -> Self {
        Self {
            body_text: OPEN_BODY.to_string(),
            title: title.to_string(),
            author: "quantperson".to_string(),
            ..Self::default()
        }
    }

    fn with_copy(mut self, payload: &str) -> Self {
        self.copy_payload = Some(payload.to_string());
        self
    }
}

#[derive(Default)]
struct Site {
    pages: HashMap<String, FakePage>,
}

impl Site {
    fn add(&mut self, url: &str, page: FakePage) {
        self.pages.insert(url.to_string(), page);
    }
}

#[derive(Default)]
struct ActionLog {
    entries: Mutex<Vec<String>>,
}

impl ActionLog {
    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    fn count_matching(&self, needle: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.contains(needle))
            .count()
    }
}

struct FakeAutomation {
    site: Arc<Site>,
    log: Arc<ActionLog>,
    restarts: AtomicU32,
}

impl FakeAutomation {
    fn new(site: Site) -> Self {
        Self {
            site: Arc::new(site),
            log: Arc::new(ActionLog::default()),
            restarts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Automation for FakeAutomation {
    async fn new_context(&self) -> Result<Box<dyn PageSession>, AutomationError> {
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.site),
            log: Arc::clone(&self.log),
            current_url: String::new(),
            clipboard: Mutex::new(String::new()),
        }))
    }

    async fn restart(&self) -> Result<(), AutomationError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

struct FakeSession {
    site: Arc<Site>,
    log: Arc<ActionLog>,
    current_url: String,
    clipboard: Mutex<String>,
}

impl FakeSession {
    fn page(&self) -> Option<&FakePage> {
        self.site.pages.get(&self.current_url)
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<(), AutomationError> {
        if !self.site.pages.contains_key(url) {
            return Err(AutomationError::Navigation {
                url: url.to_string(),
                reason: "404".to_string(),
            });
        }
        self.log.push(format!("navigate:{url}"));
        self.current_url = url.to_string();
        Ok(())
    }

    async fn find(&self, _selector: &str) -> Result<bool, AutomationError> {
        Ok(false)
    }

    async fn click(&self, target: ClickTarget<'_>) -> Result<bool, AutomationError> {
        let page = self.page().cloned().unwrap_or_default();
        match target {
            ClickTarget::Selector(selector) => {
                self.log.push(format!("click:{}:{selector}", self.current_url));
                if selector.contains("copy") {
                    if let Some(payload) = &page.copy_payload {
                        *self.clipboard.lock().unwrap() = payload.clone();
                    }
                    return Ok(page.copy_payload.is_some() || page.copy_button);
                }
                Ok(false)
            }
            ClickTarget::Point { .. } => {
                self.log.push(format!("click_point:{}", self.current_url));
                Ok(true)
            }
        }
    }

    async fn read_clipboard(&self) -> Result<String, AutomationError> {
        self.log.push(format!("read_clipboard:{}", self.current_url));
        Ok(self.clipboard.lock().unwrap().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AutomationError> {
        let page = self.page().cloned().unwrap_or_default();
        if script == js::BODY_TEXT {
            return Ok(json!(page.body_text));
        }
        if script == js::PAGE_HTML {
            return Ok(json!(page.html));
        }
        if script == js::LISTING_LINKS {
            let links: Vec<Value> = page
                .listing_links
                .iter()
                .map(|(url, title)| json!({"url": url, "title": title}))
                .collect();
            return Ok(json!(links));
        }
        if script == js::CLEAR_CLIPBOARD {
            if page.sticky_clipboard {
                if let Some(payload) = &page.copy_payload {
                    *self.clipboard.lock().unwrap() = payload.clone();
                }
            } else {
                self.clipboard.lock().unwrap().clear();
            }
            return Ok(json!(true));
        }
        if script == js::CLICK_SOURCE_TAB {
            return Ok(json!(page.tab_source.is_some()));
        }
        if script == js::SOURCE_TAB_LINES {
            return Ok(json!(page.tab_source.clone().unwrap_or_default()));
        }
        if script == js::CODE_CONTAINER_BOX || script == js::INNER_COPY_CONTROL_BOX {
            return Ok(Value::Null);
        }
        if script == js::COPY_DATA_ATTRIBUTE {
            return Ok(json!(""));
        }
        if script == js::TITLE {
            return Ok(json!(page.title));
        }
        if script == js::AUTHOR {
            return Ok(json!(page.author));
        }
        if script == js::EXTENDED_META {
            return Ok(json!({
                "published": "Dec 3, 2025",
                "description": "",
                "tags": ["trend"],
                "likes": 7,
            }));
        }
        Ok(Value::Null)
    }

    async fn wait(&self, _ms: u64) {}

    async fn screenshot(&self, _path: &Path) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), AutomationError> {
        Ok(())
    }
}

const LISTING_URL: &str = "https://x.test/scripts/indicators/";

fn detail_url(id: &str) -> String {
    format!("https://x.test/script/{id}-slug/")
}

fn listing_page(ids: &[&str]) -> FakePage {
    FakePage {
        body_text: "All scripts".to_string(),
        listing_links: ids
            .iter()
            .map(|id| (detail_url(id), format!("Script {id}")))
            .collect(),
        ..FakePage::default()
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::new(Some(dir.path().to_path_buf()));
    config.delay_secs = 0.0;
    config.min_content_len = 32;
    config
}

#[tokio::test]
async fn batch_with_protected_middle_item() {
    let mut site = Site::default();
    site.add(LISTING_URL, listing_page(&["aaa", "bbb", "ccc"]));
    site.add(&detail_url("aaa"), FakePage::open("Alpha Trend").with_copy(SOURCE_A));
    site.add(
        &detail_url("bbb"),
        FakePage {
            body_text: INVITE_BODY.to_string(),
            title: "Beta Breakout".to_string(),
            ..FakePage::default()
        },
    );
    site.add(&detail_url("ccc"), FakePage::open("Gamma Bands").with_copy(SOURCE_C));

    let dir = TempDir::new().unwrap();
    let automation = Arc::new(FakeAutomation::new(site));
    let log = Arc::clone(&automation.log);
    let orchestrator = Orchestrator::new(automation, test_config(&dir));

    let report = orchestrator.run(LISTING_URL).await.unwrap();
    assert_eq!(report.done, 2);
    assert_eq!(report.skipped_protected, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total_discovered, 3);

    // Protected short-circuit: no strategy ever touched the protected page.
    assert_eq!(log.count_matching(&format!("click:{}", detail_url("bbb"))), 0);
    assert_eq!(log.count_matching(&format!("read_clipboard:{}", detail_url("bbb"))), 0);

    // Ledger reflects the statuses.
    let ledger = Ledger::load(&dir.path().join("indicators"), true).unwrap();
    assert!(ledger.is_done("aaa"));
    assert!(ledger.is_done("ccc"));
    assert_eq!(
        ledger.get("bbb").unwrap().status,
        ItemStatus::SkippedProtected
    );
    assert_eq!(
        ledger.get("bbb").unwrap().reason.as_deref(),
        Some("invite-only")
    );

    // Content files carry a lossless header.
    let content = std::fs::read_to_string(
        dir.path().join("indicators").join("aaa_Alpha_Trend.pine"),
    )
    .unwrap();
    let (header, body) = parse_content_file(&content).unwrap();
    assert_eq!(header.id, "aaa");
    assert_eq!(header.title, "Alpha Trend");
    assert_eq!(header.kind, "Indicator");
    assert_eq!(body, SOURCE_A);

    // Summary export aggregates all three.
    let summary: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("indicators").join("metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["statistics"]["done"], 2);
    assert_eq!(summary["scripts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_clipboard_falls_through_to_tab_scrape() {
    let mut site = Site::default();
    site.add(LISTING_URL, listing_page(&["bbb"]));
    let mut page = FakePage::open("Beta Breakout");
    // Copy affordance exists but yields an empty clipboard; the source tab
    // works.
    page.copy_button = true;
    page.tab_source = Some(format!("1\n{}", SOURCE_B.replace('\n', "\n2\n")));
    site.add(&detail_url("bbb"), page);

    let dir = TempDir::new().unwrap();
    let automation = Arc::new(FakeAutomation::new(site));
    let orchestrator = Orchestrator::new(automation, test_config(&dir));

    let report = orchestrator.run(LISTING_URL).await.unwrap();
    assert_eq!(report.done, 1);
    assert_eq!(report.failed, 0);

    let ledger = Ledger::load(&dir.path().join("indicators"), true).unwrap();
    let record = ledger.get("bbb").unwrap();
    assert_eq!(record.status, ItemStatus::Done);
    assert_eq!(record.strategy, Some(StrategyKind::TabScrape));

    // Gutter line numbers were stripped from the scraped tab text.
    let content = std::fs::read_to_string(
        dir.path().join("indicators").join("bbb_Beta_Breakout.pine"),
    )
    .unwrap();
    let (header, body) = parse_content_file(&content).unwrap();
    assert_eq!(header.kind, "Strategy");
    assert!(!body.lines().any(|l| l.trim().chars().all(|c| c.is_ascii_digit()) && !l.trim().is_empty()));
    assert!(body.contains("strategy(\"Beta Breakout\")"));
}

#[tokio::test]
async fn resume_skips_done_items_without_automation() {
    let mut site = Site::default();
    site.add(LISTING_URL, listing_page(&["xxx", "yyy"]));
    site.add(&detail_url("xxx"), FakePage::open("Already Have").with_copy(SOURCE_A));
    site.add(&detail_url("yyy"), FakePage::open("New One").with_copy(SOURCE_C));

    let dir = TempDir::new().unwrap();
    let category_dir = dir.path().join("indicators");
    std::fs::create_dir_all(&category_dir).unwrap();
    let mut ledger = Ledger::load(&category_dir, true).unwrap();
    ledger.record(LedgerRecord {
        id: "xxx".to_string(),
        status: ItemStatus::Done,
        url: detail_url("xxx"),
        timestamp: chrono::Utc::now(),
        strategy: Some(StrategyKind::CopyTrigger),
        reason: None,
    });
    ledger.flush().unwrap();

    let automation = Arc::new(FakeAutomation::new(site));
    let log = Arc::clone(&automation.log);
    let orchestrator = Orchestrator::new(automation, test_config(&dir));

    let report = orchestrator.run(LISTING_URL).await.unwrap();
    assert_eq!(report.done, 1);
    assert_eq!(report.total_discovered, 2);

    // The done item never hit the automation layer.
    assert_eq!(log.count_matching(&format!("navigate:{}", detail_url("xxx"))), 0);
    assert_eq!(log.count_matching(&format!("navigate:{}", detail_url("yyy"))), 1);

    let reloaded = Ledger::load(&category_dir, true).unwrap();
    assert!(reloaded.is_done("xxx"));
    assert!(reloaded.is_done("yyy"));
}

#[tokio::test]
async fn unextractable_item_fails_after_escalation() {
    let mut site = Site::default();
    site.add(LISTING_URL, listing_page(&["ddd"]));
    // Open page with no copy affordance, no tab, no embedded data.
    site.add(&detail_url("ddd"), FakePage::open("Dead End"));

    let dir = TempDir::new().unwrap();
    let automation = Arc::new(FakeAutomation::new(site));
    let report = {
        let orchestrator = Orchestrator::new(Arc::clone(&automation) as Arc<dyn Automation>, test_config(&dir));
        orchestrator.run(LISTING_URL).await.unwrap()
    };

    assert_eq!(report.done, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("all strategies failed"));
    // Escalation reached the hard restart exactly once.
    assert_eq!(automation.restarts.load(Ordering::SeqCst), 1);

    let ledger = Ledger::load(&dir.path().join("indicators"), true).unwrap();
    assert_eq!(ledger.get("ddd").unwrap().status, ItemStatus::Failed);
}

#[tokio::test]
async fn fast_mode_gives_up_after_one_attempt() {
    let mut site = Site::default();
    site.add(LISTING_URL, listing_page(&["eee"]));
    site.add(&detail_url("eee"), FakePage::open("Flaky"));

    let dir = TempDir::new().unwrap();
    let automation = Arc::new(FakeAutomation::new(site));
    let log = Arc::clone(&automation.log);
    let mut config = test_config(&dir);
    config.fast_mode = true;

    let report = {
        let orchestrator = Orchestrator::new(Arc::clone(&automation) as Arc<dyn Automation>, config);
        orchestrator.run(LISTING_URL).await.unwrap()
    };

    assert_eq!(report.failed, 1);
    assert_eq!(automation.restarts.load(Ordering::SeqCst), 0);
    assert_eq!(log.count_matching(&format!("navigate:{}", detail_url("eee"))), 1);
}

#[tokio::test]
async fn stale_clipboard_is_rejected_within_shared_context() {
    // Two consecutive chain passes over one session whose clipboard never
    // refreshes: the first capture is accepted, the identical second one must
    // be rejected as stale and the chain must come up empty.
    let mut site = Site::default();
    let url = detail_url("fff");
    let mut page = FakePage::open("Sticky").with_copy(SOURCE_A);
    page.sticky_clipboard = true;
    site.add(&url, page);

    let automation = FakeAutomation::new(site);
    let mut session = automation.new_context().await.unwrap();
    session.navigate(&url, 1000).await.unwrap();

    let chain = StrategyChain::new(false);
    let verifier = Verifier::new(32);
    let mut rolling = RollingHash::default();
    let opts = magpie::extract::ExtractOptions::default();

    let first = chain
        .extract(session.as_ref(), &verifier, &mut rolling, &opts)
        .await
        .expect("first capture accepted");
    assert_eq!(first.strategy, StrategyKind::CopyTrigger);

    let second = chain
        .extract(session.as_ref(), &verifier, &mut rolling, &opts)
        .await;
    let err = second.expect_err("identical capture must be rejected");
    assert!(err.to_string().contains("stale"), "got: {err}");
}

#[tokio::test]
async fn single_detail_url_is_a_one_item_batch() {
    let mut site = Site::default();
    let url = detail_url("ggg");
    site.add(&url, FakePage::open("Solo").with_copy(SOURCE_C));

    let dir = TempDir::new().unwrap();
    let automation = Arc::new(FakeAutomation::new(site));
    let orchestrator = Orchestrator::new(automation, test_config(&dir));

    let report = orchestrator.run(&url).await.unwrap();
    assert_eq!(report.done, 1);
    assert_eq!(report.total_discovered, 1);
}
