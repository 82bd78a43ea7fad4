//! Persistence writer — content files, metadata sidecars, and the batch
//! summary export.
//!
//! Each captured item becomes `<id>_<safe_title>.pine` with a fixed-order
//! comment header followed by the verified raw content, plus a machine-
//! readable `.meta.json` sidecar. The header parses back losslessly.

use crate::types::{Category, ExtractionResult, Item, ItemStatus, ScriptKind, StrategyKind};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Convert a free-form title into a safe file stem.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = false;
    for c in name.chars() {
        if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '[' | ']') {
            continue;
        }
        if c.is_whitespace() {
            if !last_was_space {
                out.push('_');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    let trimmed: String = out.trim_matches(|c| c == '.' || c == '_').to_string();
    let capped: String = trimmed.chars().take(200).collect();
    if capped.is_empty() {
        "unnamed_script".to_string()
    } else {
        capped
    }
}

/// The comment header written ahead of the source, field order fixed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptHeader {
    pub title: String,
    pub id: String,
    pub author: String,
    pub url: String,
    pub published: String,
    pub captured: String,
    pub version: String,
    pub kind: String,
    pub likes: u32,
    pub tags: Vec<String>,
}

impl ScriptHeader {
    fn render(&self) -> String {
        let mut lines = Vec::with_capacity(12);
        lines.push(format!("// Title: {}", self.title));
        lines.push(format!("// Script ID: {}", self.id));
        lines.push(format!("// Author: {}", self.author));
        lines.push(format!("// URL: {}", self.url));
        lines.push(format!("// Published: {}", self.published));
        lines.push(format!("// Captured: {}", self.captured));
        lines.push(format!("// Pine Version: {}", self.version));
        lines.push(format!("// Type: {}", self.kind));
        lines.push(format!("// Likes: {}", self.likes));
        lines.push(format!("// Tags: {}", self.tags.join(", ")));
        lines.push("//".to_string());
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Parse a content file back into its header and body. Returns `None` when
/// the file does not start with a Magpie header.
pub fn parse_content_file(content: &str) -> Option<(ScriptHeader, String)> {
    let mut header = ScriptHeader::default();
    let mut rest = content;
    let mut saw_title = false;

    loop {
        let (line, tail) = match rest.split_once('\n') {
            Some(pair) => pair,
            None => (rest, ""),
        };
        if line == "//" {
            // Separator, then one blank line, then the body.
            rest = tail.strip_prefix('\n').unwrap_or(tail);
            break;
        }
        let field = line.strip_prefix("// ")?;
        let (key, value) = field.split_once(": ").unwrap_or((field.trim_end_matches(':'), ""));
        match key {
            "Title" => {
                header.title = value.to_string();
                saw_title = true;
            }
            "Script ID" => header.id = value.to_string(),
            "Author" => header.author = value.to_string(),
            "URL" => header.url = value.to_string(),
            "Published" => header.published = value.to_string(),
            "Captured" => header.captured = value.to_string(),
            "Pine Version" => header.version = value.to_string(),
            "Type" => header.kind = value.to_string(),
            "Likes" => header.likes = value.parse().unwrap_or(0),
            "Tags" => {
                header.tags = value
                    .split(", ")
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            }
            _ => {}
        }
        rest = tail;
        if rest.is_empty() {
            return None;
        }
    }

    if saw_title {
        Some((header, rest.to_string()))
    } else {
        None
    }
}

/// Sidecar record, also the unit the batch summary aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub url: String,
    pub published: String,
    pub captured_at: DateTime<Utc>,
    pub version: String,
    pub kind: String,
    pub likes: u32,
    pub tags: Vec<String>,
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_strategy: Option<StrategyKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SavedPaths {
    pub content: PathBuf,
    pub sidecar: PathBuf,
    /// The sidecar's in-memory twin, fed into the batch summary.
    pub record: SidecarRecord,
}

pub struct Store {
    output_dir: PathBuf,
}

impl Store {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn category_dir(&self, category: &Category) -> PathBuf {
        self.output_dir.join(category.as_str())
    }

    /// Write the content file and sidecar for a verified capture.
    pub fn save(&self, item: &Item, result: &ExtractionResult) -> io::Result<SavedPaths> {
        let dir = self.category_dir(&item.category);
        std::fs::create_dir_all(&dir)?;

        let meta = &result.metadata;
        let title = if meta.title.is_empty() {
            item.title.as_str()
        } else {
            meta.title.as_str()
        };
        let stem = format!("{}_{}", item.id, sanitize_filename(title));
        let captured_at = Utc::now();

        let kind = meta.kind.unwrap_or_else(|| ScriptKind::detect(&result.text));
        let published = meta
            .published_at
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            .or_else(|| meta.published_raw.clone())
            .unwrap_or_default();

        let header = ScriptHeader {
            title: title.to_string(),
            id: item.id.clone(),
            author: meta.author.clone(),
            url: item.url.clone(),
            published: published.clone(),
            captured: captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            version: meta.version.clone().unwrap_or_default(),
            kind: kind.label().to_string(),
            likes: meta.likes,
            tags: meta.tags.clone(),
        };

        let content_path = dir.join(format!("{stem}.pine"));
        let mut body = result.text.clone();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        std::fs::write(&content_path, format!("{}{}", header.render(), body))?;

        let sidecar = SidecarRecord {
            id: item.id.clone(),
            title: title.to_string(),
            author: meta.author.clone(),
            url: item.url.clone(),
            published,
            captured_at,
            version: meta.version.clone().unwrap_or_default(),
            kind: kind.label().to_string(),
            likes: meta.likes,
            tags: meta.tags.clone(),
            captured: true,
            source_strategy: Some(result.strategy_used),
            error: None,
        };
        let sidecar_path = dir.join(format!("{stem}.meta.json"));
        let json = serde_json::to_string_pretty(&sidecar)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&sidecar_path, json)?;

        tracing::info!(path = %content_path.display(), strategy = %result.strategy_used, "saved capture");
        Ok(SavedPaths {
            content: content_path,
            sidecar: sidecar_path,
            record: sidecar,
        })
    }

    /// Write the run summary: every processed item's sidecar-shaped record
    /// plus the aggregate counts.
    pub fn export_summary(
        &self,
        category: &Category,
        counts: &crate::ledger::LedgerCounts,
        entries: &[SidecarRecord],
    ) -> io::Result<PathBuf> {
        let dir = self.category_dir(category);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join("metadata.json");
        let doc = serde_json::json!({
            "exported_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "category": category.as_str(),
            "statistics": counts,
            "scripts": entries,
        });
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Sidecar-shaped record for an item that produced no capture.
pub fn failure_record(item: &Item, status: ItemStatus, reason: Option<String>) -> SidecarRecord {
    SidecarRecord {
        id: item.id.clone(),
        title: item.title.clone(),
        author: String::new(),
        url: item.url.clone(),
        published: String::new(),
        captured_at: Utc::now(),
        version: String::new(),
        kind: String::new(),
        likes: 0,
        tags: Vec::new(),
        captured: false,
        source_strategy: None,
        error: match status {
            ItemStatus::SkippedProtected => reason.or(Some("protected".to_string())),
            _ => reason,
        },
    }
}
