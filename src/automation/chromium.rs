//! Chromium-based automation provider using chromiumoxide.

use super::{Automation, ClickTarget, PageSession};
use crate::error::AutomationError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::layout::Point;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Masks the automation fingerprint before any page script runs.
const STEALTH_INIT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
    Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]});
    Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']});
    window.chrome = {runtime: {}};
"#;

/// Captures copy events in-page so clipboard reads work even where the OS
/// clipboard is unavailable (headless CI, restricted sandboxes).
const COPY_CAPTURE_INIT: &str = r#"(() => {
    window.__copied__ = '';
    document.addEventListener('copy', function(e){
        try {
            window.__copied__ = (e.clipboardData && e.clipboardData.getData('text/plain'))
                || document.getSelection().toString();
        } catch(e){}
    }, true);
    try {
        const origWrite = navigator.clipboard && navigator.clipboard.writeText;
        if (origWrite) {
            navigator.clipboard.writeText = async function(t){
                try { window.__copied__ = t || ''; } catch(e){}
                return origWrite.call(this, t);
            };
        }
    } catch(e){}
})()"#;

const READ_CLIPBOARD: &str = r#"(async () => {
    if (window.__copied__ && typeof window.__copied__ === 'string' && window.__copied__.length > 0) {
        return window.__copied__;
    }
    try {
        if (navigator.clipboard && navigator.clipboard.readText) {
            return await navigator.clipboard.readText();
        }
    } catch(e){}
    return '';
})()"#;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("MAGPIE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".magpie/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".magpie/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".magpie/chromium/chrome-linux64/chrome"),
                home.join(".magpie/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Chromium provider. Holds the browser behind a mutex so a hard restart can
/// swap the whole process underneath open handles.
pub struct ChromiumAutomation {
    inner: Mutex<BrowserHandle>,
    headless: bool,
    user_agent: String,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumAutomation {
    /// Launch a Chromium instance. Fails with a setup-class error when no
    /// binary can be found or the process refuses to start.
    pub async fn launch(headless: bool, user_agent: &str) -> Result<Self, AutomationError> {
        let handle = launch_browser(headless).await?;
        Ok(Self {
            inner: Mutex::new(handle),
            headless,
            user_agent: user_agent.to_string(),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

async fn launch_browser(headless: bool) -> Result<BrowserHandle, AutomationError> {
    let chrome_path = find_chromium().ok_or_else(|| {
        AutomationError::Browser("Chromium not found; set MAGPIE_CHROMIUM_PATH".into())
    })?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-infobars")
        .arg("--window-size=1280,720")
        .arg("--enable-features=ClipboardAPI");
    if headless {
        builder = builder.arg("--headless=new").arg("--disable-gpu");
    } else {
        builder = builder.with_head();
    }
    let config = builder
        .build()
        .map_err(|e| AutomationError::Browser(format!("failed to build browser config: {e}")))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| AutomationError::Browser(format!("failed to launch Chromium: {e}")))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            let _ = event;
        }
    });

    // Clipboard reads need an explicit permission grant in Chromium.
    let _ = browser
        .execute(GrantPermissionsParams::new(vec![
            PermissionType::ClipboardReadWrite,
            PermissionType::ClipboardSanitizedWrite,
        ]))
        .await;

    Ok(BrowserHandle {
        browser,
        handler_task,
    })
}

#[async_trait]
impl Automation for ChromiumAutomation {
    async fn new_context(&self) -> Result<Box<dyn PageSession>, AutomationError> {
        let guard = self.inner.lock().await;
        let page = guard
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| map_cdp("new_page", e))?;
        drop(guard);

        let _ = page.set_user_agent(self.user_agent.clone()).await;
        let _ = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_INIT))
            .await;
        let _ = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(COPY_CAPTURE_INIT))
            .await;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumSession {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn restart(&self) -> Result<(), AutomationError> {
        let mut guard = self.inner.lock().await;
        let _ = guard.browser.close().await;
        guard.handler_task.abort();
        *guard = launch_browser(self.headless).await?;
        self.active_count.store(0, Ordering::Relaxed);
        tracing::info!("automation process relaunched");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AutomationError> {
        let mut guard = self.inner.lock().await;
        let _ = guard.browser.close().await;
        guard.handler_task.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Bound on DOM evaluations, clipboard reads, and clicks. Navigation carries
/// its own per-call timeout.
const ACTION_TIMEOUT_MS: u64 = 10_000;

/// One Chromium page.
pub struct ChromiumSession {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), AutomationError> {
        let nav = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match nav {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => Err(AutomationError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(AutomationError::Timeout {
                op: "navigate",
                timeout_ms,
            }),
        }
    }

    async fn find(&self, selector: &str) -> Result<bool, AutomationError> {
        match self.page.find_element(selector).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn click(&self, target: ClickTarget<'_>) -> Result<bool, AutomationError> {
        match target {
            ClickTarget::Selector(selector) => {
                let found = tokio::time::timeout(
                    std::time::Duration::from_millis(ACTION_TIMEOUT_MS),
                    self.page.find_element(selector),
                )
                .await;
                let element = match found {
                    Ok(Ok(element)) => element,
                    Ok(Err(_)) => return Ok(false),
                    Err(_) => {
                        return Err(AutomationError::Timeout {
                            op: "find",
                            timeout_ms: ACTION_TIMEOUT_MS,
                        })
                    }
                };
                element
                    .click()
                    .await
                    .map_err(|e| map_cdp("click", e))?;
                Ok(true)
            }
            ClickTarget::Point { x, y } => {
                self.page
                    .click(Point { x, y })
                    .await
                    .map_err(|e| map_cdp("click_at", e))?;
                Ok(true)
            }
        }
    }

    async fn read_clipboard(&self) -> Result<String, AutomationError> {
        let value = self.evaluate(READ_CLIPBOARD).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AutomationError> {
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(ACTION_TIMEOUT_MS),
            self.page.evaluate(script),
        )
        .await
        .map_err(|_| AutomationError::Timeout {
            op: "evaluate",
            timeout_ms: ACTION_TIMEOUT_MS,
        })?
        .map_err(|e| map_cdp("evaluate", e))?;
        result
            .into_value()
            .map_err(|e| AutomationError::Evaluation(format!("result conversion failed: {e:?}")))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().build(), path)
            .await
            .map(|_| ())
            .map_err(|e| map_cdp("screenshot", e))
    }

    async fn close(self: Box<Self>) -> Result<(), AutomationError> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

fn map_cdp(op: &'static str, e: chromiumoxide::error::CdpError) -> AutomationError {
    let msg = e.to_string();
    if msg.contains("closed") || msg.contains("Closed") {
        AutomationError::TargetClosed(format!("{op}: {msg}"))
    } else {
        AutomationError::Browser(format!("{op}: {msg}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn navigate_and_evaluate() {
        let automation = ChromiumAutomation::launch(true, "magpie-test")
            .await
            .expect("failed to launch");
        let mut session = automation.new_context().await.expect("no context");

        session
            .navigate("data:text/html,<h1>Hello</h1>", 10_000)
            .await
            .expect("navigation failed");

        let text = session
            .evaluate("document.querySelector('h1').textContent")
            .await
            .expect("evaluate failed");
        assert_eq!(text.as_str().unwrap(), "Hello");

        session.close().await.expect("close failed");
        assert_eq!(automation.active_contexts(), 0);
        automation.shutdown().await.expect("shutdown failed");
    }
}
