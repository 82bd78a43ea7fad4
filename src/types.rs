// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core domain types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One unit of work: a script to capture, discovered on a listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier extracted from the detail URL (`/script/<id>`).
    pub id: String,
    pub url: String,
    pub title: String,
    pub category: Category,
}

impl Item {
    pub fn from_url(url: &str, title: &str, category: Category) -> Option<Self> {
        let id = extract_item_id(url)?;
        Some(Self {
            id,
            url: url.to_string(),
            title: title.to_string(),
            category,
        })
    }
}

/// Extract the stable script id from a detail URL.
///
/// `https://example.com/script/AbC123-some-slug/` → `AbC123`.
pub fn extract_item_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/script/")?;
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Caller-supplied partition of the catalogue (indicators, libraries, ...).
/// Derived from the last path segment of the listing URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category(pub String);

impl Category {
    pub fn from_listing_url(url: &str) -> Self {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());
        let segment = path
            .trim_matches('/')
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("scripts");
        Category(crate::store::sanitize_filename(segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal disposition of one item within a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Done,
    SkippedProtected,
    Failed,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Done => write!(f, "done"),
            Self::SkippedProtected => write!(f, "skipped_protected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// SHA-256 content fingerprint, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Which extraction strategy produced an accepted capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    CopyTrigger,
    PositionalClick,
    TabScrape,
    EmbeddedScrape,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CopyTrigger => write!(f, "copy_trigger"),
            Self::PositionalClick => write!(f, "positional_click"),
            Self::TabScrape => write!(f, "tab_scrape"),
            Self::EmbeddedScrape => write!(f, "embedded_scrape"),
        }
    }
}

/// Script flavor, detected from the accepted source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Indicator,
    Strategy,
    Library,
}

impl ScriptKind {
    /// Classify source text by its declaration call. Indicator is the default
    /// when neither a strategy nor a library declaration is present.
    pub fn detect(source: &str) -> Self {
        let lower = source.to_lowercase();
        if lower.contains("library(") {
            Self::Library
        } else if lower.contains("strategy(") {
            Self::Strategy
        } else {
            Self::Indicator
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Indicator => "Indicator",
            Self::Strategy => "Strategy",
            Self::Library => "Library",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Strategy" => Self::Strategy,
            "Library" => Self::Library,
            _ => Self::Indicator,
        }
    }
}

/// Metadata scraped from a detail page, independent of the source capture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMeta {
    pub title: String,
    pub author: String,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Raw publication text when it could not be parsed into a timestamp.
    pub published_raw: Option<String>,
    pub version: Option<String>,
    pub kind: Option<ScriptKind>,
    pub description: String,
    pub likes: u32,
}

/// Output of one successful, verified strategy attempt.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub text: String,
    pub hash: ContentHash,
    pub strategy_used: StrategyKind,
    pub metadata: PageMeta,
}

/// Aggregate counts for a whole batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub done: u32,
    pub skipped_protected: u32,
    pub failed: u32,
    pub total_discovered: u32,
    /// Last-known failure reason per failed item.
    pub failures: Vec<(String, String)>,
}

impl BatchReport {
    pub fn processed(&self) -> u32 {
        self.done + self.skipped_protected + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_from_url() {
        assert_eq!(
            extract_item_id("https://x.test/script/AbC123-my-indicator/"),
            Some("AbC123".to_string())
        );
        assert_eq!(
            extract_item_id("https://x.test/script/zZ9/"),
            Some("zZ9".to_string())
        );
        assert_eq!(extract_item_id("https://x.test/scripts/page-2"), None);
        assert_eq!(extract_item_id("https://x.test/script/"), None);
    }

    #[test]
    fn category_from_listing_url() {
        let cat = Category::from_listing_url("https://x.test/scripts/indicators/");
        assert_eq!(cat.as_str(), "indicators");
        let cat = Category::from_listing_url("https://x.test/scripts/libraries?page=2");
        assert_eq!(cat.as_str(), "libraries");
    }

    #[test]
    fn script_kind_detection() {
        assert_eq!(ScriptKind::detect("//@version=5\nindicator(\"x\")"), ScriptKind::Indicator);
        assert_eq!(ScriptKind::detect("//@version=5\nstrategy(\"x\")"), ScriptKind::Strategy);
        assert_eq!(ScriptKind::detect("//@version=5\nlibrary(\"x\")"), ScriptKind::Library);
        assert_eq!(ScriptKind::detect("plot(close)"), ScriptKind::Indicator);
    }

    #[test]
    fn content_hash_is_stable() {
        let a = ContentHash::of("indicator()");
        let b = ContentHash::of("indicator()");
        let c = ContentHash::of("indicator( )");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn item_status_serializes_snake_case() {
        let s = serde_json::to_string(&ItemStatus::SkippedProtected).unwrap();
        assert_eq!(s, "\"skipped_protected\"");
    }
}
