// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed progress events emitted during a batch run.
//!
//! Events flow through a `tokio::sync::broadcast` channel; the CLI renders
//! them, other consumers can subscribe independently. When no subscriber
//! exists, events are silently dropped.

use crate::types::{ItemStatus, StrategyKind};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    BatchStarted {
        run_id: String,
        category: String,
        url: String,
    },
    ListingPageScanned {
        page: u32,
        discovered: u32,
        new_items: u32,
    },
    ItemStarted {
        id: String,
        title: String,
        index: u32,
        total: u32,
    },
    /// The recovery controller escalated past a failed attempt.
    ItemRetrying {
        id: String,
        attempt: u32,
    },
    ItemFinished {
        id: String,
        status: ItemStatus,
        strategy: Option<StrategyKind>,
        reason: Option<String>,
    },
    BatchComplete {
        done: u32,
        skipped_protected: u32,
        failed: u32,
        elapsed_ms: u64,
    },
}

pub type EventSender = tokio::sync::broadcast::Sender<HarvestEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<HarvestEvent>;

/// Bounded buffer; a listing page burst plus per-item events fit comfortably.
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit, ignoring the error broadcast returns when nobody listens.
pub fn emit(tx: &EventSender, event: HarvestEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = HarvestEvent::ItemFinished {
            id: "AbC123".to_string(),
            status: ItemStatus::Done,
            strategy: Some(StrategyKind::TabScrape),
            reason: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ItemFinished"));
        assert!(json.contains("tab_scrape"));
    }

    #[test]
    fn emit_without_receivers_does_not_panic() {
        let (tx, rx) = channel();
        drop(rx);
        emit(
            &tx,
            HarvestEvent::ListingPageScanned {
                page: 1,
                discovered: 0,
                new_items: 0,
            },
        );
    }
}
