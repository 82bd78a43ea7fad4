//! Page-automation capability consumed by the engine.
//!
//! Defines the `Automation` and `PageSession` traits that abstract over the
//! browser provider (currently Chromium via chromiumoxide). The engine only
//! ever talks to these traits; tests inject a scripted fake provider.

pub mod chromium;

use crate::error::AutomationError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Something clickable: a CSS selector or a viewport coordinate.
#[derive(Debug, Clone, Copy)]
pub enum ClickTarget<'a> {
    Selector(&'a str),
    Point { x: f64, y: f64 },
}

/// Bounding box in viewport coordinates, as returned by DOM probes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A browser provider that can create isolated page sessions.
#[async_trait]
pub trait Automation: Send + Sync {
    /// Create a fresh, isolated page session (context + page).
    async fn new_context(&self) -> Result<Box<dyn PageSession>, AutomationError>;

    /// Hard restart: terminate and relaunch the whole automation process.
    /// Existing sessions become invalid.
    async fn restart(&self) -> Result<(), AutomationError>;

    /// Shut the provider down.
    async fn shutdown(&self) -> Result<(), AutomationError>;

    /// Number of currently open sessions.
    fn active_contexts(&self) -> usize;
}

/// One isolated page surface.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate and wait for the load to settle, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), AutomationError>;

    /// Whether at least one visible element matches the selector.
    async fn find(&self, selector: &str) -> Result<bool, AutomationError>;

    /// Click the target. Selector clicks return `false` when nothing visible
    /// matched; coordinate clicks always dispatch and return `true`.
    async fn click(&self, target: ClickTarget<'_>) -> Result<bool, AutomationError>;

    /// Read the page clipboard (in-page capture hook first, then the OS
    /// clipboard).
    async fn read_clipboard(&self) -> Result<String, AutomationError>;

    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<Value, AutomationError>;

    /// Cooperative wait.
    async fn wait(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AutomationError>;

    async fn close(self: Box<Self>) -> Result<(), AutomationError>;
}
