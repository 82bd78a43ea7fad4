// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress ledger — the durable resume record, one entry per item.
//!
//! The ledger is the single source of truth for "already processed": it is
//! consulted before any automation work starts for an id, and flushed after
//! every item. Flushes go through a write-new-then-rename so an interrupted
//! run can never corrupt previously recorded entries.

use crate::types::{ItemStatus, StrategyKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = ".ledger.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: String,
    pub status: ItemStatus,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strategy: Option<StrategyKind>,
    /// Last-known failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    updated_at: Option<DateTime<Utc>>,
    records: Vec<LedgerRecord>,
}

/// Per-status totals, for the status-only CLI mode and end-of-run summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerCounts {
    pub done: u32,
    pub skipped_protected: u32,
    pub failed: u32,
    pub total: u32,
}

pub struct Ledger {
    path: PathBuf,
    records: BTreeMap<String, LedgerRecord>,
    dirty: bool,
}

impl Ledger {
    /// Load the ledger for a category directory. With `resume = false` the
    /// existing records are discarded at load time — the run starts clean but
    /// still records, leaving an accurate ledger behind.
    pub fn load(dir: &Path, resume: bool) -> io::Result<Self> {
        let path = dir.join(LEDGER_FILE);
        let mut records = BTreeMap::new();

        if resume && path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let doc: LedgerDocument = serde_json::from_str(&raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            for record in doc.records {
                records.insert(record.id.clone(), record);
            }
        }

        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }

    /// Whether the item has already been captured. Checked before any
    /// automation work — this is the sole resume mechanism. Protected and
    /// failed items are re-checked on a rerun.
    pub fn is_done(&self, id: &str) -> bool {
        matches!(
            self.records.get(id).map(|r| r.status),
            Some(ItemStatus::Done)
        )
    }

    pub fn get(&self, id: &str) -> Option<&LedgerRecord> {
        self.records.get(id)
    }

    /// Insert or overwrite the record for an id. Idempotent per id.
    pub fn record(&mut self, record: LedgerRecord) {
        self.records.insert(record.id.clone(), record);
        self.dirty = true;
    }

    /// Write the ledger out atomically. Safe to call after every item; a
    /// clean ledger is a no-op.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let doc = LedgerDocument {
            updated_at: Some(Utc::now()),
            records: self.records.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }

    pub fn counts(&self) -> LedgerCounts {
        let mut counts = LedgerCounts::default();
        for record in self.records.values() {
            counts.total += 1;
            match record.status {
                ItemStatus::Done => counts.done += 1,
                ItemStatus::SkippedProtected => counts.skipped_protected += 1,
                ItemStatus::Failed => counts.failed += 1,
                ItemStatus::Pending => {}
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
