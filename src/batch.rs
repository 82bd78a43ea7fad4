// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch orchestrator — walks the worklist and drives the per-item pipeline.
//!
//! For each discovered item not already recorded done: open an isolated page
//! session, classify protection, run the strategy chain under the recovery
//! controller, persist, update the ledger, pace, move on. Per-item failures
//! never abort the batch; only a setup failure propagates.

use crate::automation::{Automation, PageSession};
use crate::config::Config;
use crate::error::EngineError;
use crate::events::{self, emit, EventReceiver, EventSender, HarvestEvent};
use crate::extract::{self, metadata, ExtractOptions, StrategyChain};
use crate::ledger::{Ledger, LedgerCounts, LedgerRecord};
use crate::listing;
use crate::recovery::{
    AttemptOutcome, AttemptRunner, AttemptState, Phase, RecoveryController, RecoveryMode,
};
use crate::store::{failure_record, SidecarRecord, Store};
use crate::types::{
    BatchReport, Category, ExtractionResult, Item, ItemStatus, PageMeta, ScriptKind,
};
use crate::verify::Verifier;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

pub struct Orchestrator {
    automation: Arc<dyn Automation>,
    config: Config,
    store: Store,
    events_tx: EventSender,
}

impl Orchestrator {
    pub fn new(automation: Arc<dyn Automation>, config: Config) -> Self {
        let (events_tx, _keepalive) = events::channel();
        let store = Store::new(config.output_dir.clone());
        Self {
            automation,
            config,
            store,
            events_tx,
        }
    }

    /// Subscribe to progress events for this orchestrator's runs.
    pub fn subscribe(&self) -> EventReceiver {
        self.events_tx.subscribe()
    }

    /// Process one listing URL (or a single detail URL) to completion.
    pub async fn run(&self, url: &str) -> Result<BatchReport, EngineError> {
        let category = Category::from_listing_url(url);
        let run_id = uuid::Uuid::new_v4().to_string();
        let started = std::time::Instant::now();
        emit(
            &self.events_tx,
            HarvestEvent::BatchStarted {
                run_id,
                category: category.as_str().to_string(),
                url: url.to_string(),
            },
        );

        let category_dir = self.store.category_dir(&category);
        std::fs::create_dir_all(&category_dir)?;
        let mut ledger = Ledger::load(&category_dir, self.config.resume)?;

        let items = self.discover_items(url, &category).await?;
        let total_discovered = items.len() as u32;
        let worklist: Vec<&Item> = items.iter().filter(|i| !ledger.is_done(&i.id)).collect();
        let resumed = total_discovered as usize - worklist.len();
        if resumed > 0 {
            tracing::info!(skipped = resumed, "resume: ledger marks items already done");
        }

        let verifier = Verifier::new(self.config.min_content_len);
        let chain = StrategyChain::new(self.config.positional_click);
        let mode = if self.config.fast_mode {
            RecoveryMode::Fast
        } else {
            RecoveryMode::Default
        };
        let controller = RecoveryController::new(mode, self.config.hash_carry);

        let mut report = BatchReport {
            total_discovered,
            ..Default::default()
        };
        let mut run_entries: Vec<SidecarRecord> = Vec::new();
        let mut consecutive_failures = 0u32;
        let total = worklist.len() as u32;

        for (index, item) in worklist.iter().copied().enumerate() {
            emit(
                &self.events_tx,
                HarvestEvent::ItemStarted {
                    id: item.id.clone(),
                    title: item.title.clone(),
                    index: index as u32 + 1,
                    total,
                },
            );

            let pipeline = ItemPipeline {
                item,
                config: &self.config,
                verifier: &verifier,
                chain: &chain,
                events: &self.events_tx,
            };
            let recovery = controller.run(self.automation.as_ref(), &pipeline).await;

            let (status, strategy, reason) = match recovery.outcome {
                Some(AttemptOutcome::Captured(result)) => match self.store.save(item, &result) {
                    Ok(saved) => {
                        report.done += 1;
                        consecutive_failures = 0;
                        run_entries.push(saved.record);
                        (ItemStatus::Done, Some(result.strategy_used), None)
                    }
                    Err(e) => {
                        let reason = format!("persistence: {e}");
                        tracing::warn!(id = %item.id, %reason, "capture could not be persisted");
                        report.failed += 1;
                        report.failures.push((item.id.clone(), reason.clone()));
                        consecutive_failures += 1;
                        run_entries.push(failure_record(
                            item,
                            ItemStatus::Failed,
                            Some(reason.clone()),
                        ));
                        (ItemStatus::Failed, None, Some(reason))
                    }
                },
                Some(AttemptOutcome::Protected(why)) => {
                    report.skipped_protected += 1;
                    consecutive_failures = 0;
                    run_entries.push(failure_record(
                        item,
                        ItemStatus::SkippedProtected,
                        Some(why.to_string()),
                    ));
                    (ItemStatus::SkippedProtected, None, Some(why.to_string()))
                }
                None => {
                    let reason = recovery
                        .last_failure
                        .unwrap_or_else(|| "extraction failed".to_string());
                    tracing::warn!(id = %item.id, attempts = recovery.attempts, %reason, "item failed");
                    report.failed += 1;
                    report.failures.push((item.id.clone(), reason.clone()));
                    consecutive_failures += 1;
                    run_entries.push(failure_record(
                        item,
                        ItemStatus::Failed,
                        Some(reason.clone()),
                    ));
                    (ItemStatus::Failed, None, Some(reason))
                }
            };

            ledger.record(LedgerRecord {
                id: item.id.clone(),
                status,
                url: item.url.clone(),
                timestamp: Utc::now(),
                strategy,
                reason: reason.clone(),
            });
            // Per-item flush is the crash-safety baseline; a failed flush is
            // retried on the next one.
            if let Err(e) = ledger.flush() {
                tracing::warn!(error = %e, "ledger flush failed");
            }

            emit(
                &self.events_tx,
                HarvestEvent::ItemFinished {
                    id: item.id.clone(),
                    status,
                    strategy,
                    reason,
                },
            );

            if index + 1 < worklist.len() {
                tokio::time::sleep(self.pacing_delay(consecutive_failures)).await;
            }
        }

        let counts = LedgerCounts {
            done: report.done,
            skipped_protected: report.skipped_protected,
            failed: report.failed,
            total: report.processed(),
        };
        if let Err(e) = self.store.export_summary(&category, &counts, &run_entries) {
            tracing::warn!(error = %e, "summary export failed");
        }

        emit(
            &self.events_tx,
            HarvestEvent::BatchComplete {
                done: report.done,
                skipped_protected: report.skipped_protected,
                failed: report.failed,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        );
        Ok(report)
    }

    async fn discover_items(
        &self,
        url: &str,
        category: &Category,
    ) -> Result<Vec<Item>, EngineError> {
        // A detail URL is a one-item batch.
        if url.contains("/script/") {
            return Ok(Item::from_url(url, "Unknown", category.clone())
                .into_iter()
                .collect());
        }

        let mut session = self
            .automation
            .new_context()
            .await
            .map_err(|e| EngineError::Setup(format!("listing context: {e}")))?;
        let discovered = listing::discover(
            &mut session,
            url,
            category,
            self.config.max_pages,
            self.config.nav_timeout_ms,
            &self.events_tx,
        )
        .await;
        let _ = session.close().await;

        match discovered {
            Ok(items) => {
                if items.is_empty() {
                    tracing::warn!(%url, "no items found on listing page");
                }
                Ok(items)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "listing discovery failed");
                Ok(Vec::new())
            }
        }
    }

    /// Base delay plus jitter, scaled up while failures streak.
    fn pacing_delay(&self, consecutive_failures: u32) -> Duration {
        let base = if self.config.fast_mode {
            0.5
        } else {
            self.config.delay_secs
        };
        if base <= f64::EPSILON {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        let mut delay = base + rng.gen_range(0.0..3.0) + rng.gen_range(0.0..0.5);
        if consecutive_failures > 0 {
            let backoff = consecutive_failures.min(5) as f64;
            delay *= 1.0 + backoff * 0.5;
        }
        Duration::from_secs_f64(delay)
    }
}

/// One full attempt for one item: navigate, classify, scrape metadata, run
/// the chain. Implements the recovery controller's runner contract.
struct ItemPipeline<'a> {
    item: &'a Item,
    config: &'a Config,
    verifier: &'a Verifier,
    chain: &'a StrategyChain,
    events: &'a EventSender,
}

#[async_trait]
impl AttemptRunner for ItemPipeline<'_> {
    async fn attempt(
        &self,
        session: &mut Box<dyn PageSession>,
        state: &mut AttemptState,
    ) -> Result<AttemptOutcome, String> {
        let attempt_no = match state.phase {
            Phase::Attempt1 => 1,
            Phase::Attempt2 => 2,
            Phase::Attempt3 => 3,
            _ => 0,
        };
        if attempt_no > 1 {
            emit(
                self.events,
                HarvestEvent::ItemRetrying {
                    id: self.item.id.clone(),
                    attempt: attempt_no,
                },
            );
        }

        session
            .navigate(&self.item.url, self.config.nav_timeout_ms)
            .await
            .map_err(|e| format!("navigate: {e}"))?;
        session
            .wait(if self.config.fast_mode { 300 } else { 1200 })
            .await;

        let protection = extract::classify(session.as_ref())
            .await
            .map_err(|e| format!("classify: {e}"))?;
        if !protection.is_open() {
            return Ok(AttemptOutcome::Protected(protection.reason()));
        }

        // Metadata is best-effort; a capture with a thin header beats no
        // capture.
        let mut meta = match metadata::scrape(session.as_ref()).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(id = %self.item.id, error = %e, "metadata scrape failed");
                PageMeta::default()
            }
        };

        let opts = ExtractOptions {
            positional_click_preferred: self.config.positional_click,
            fast_mode: self.config.fast_mode,
            action_timeout_ms: self.config.action_timeout_ms,
        };
        let capture = self
            .chain
            .extract(session.as_ref(), self.verifier, &mut state.rolling, &opts)
            .await
            .map_err(|e| e.to_string())?;

        meta.version = metadata::version_from_source(&capture.text);
        meta.kind = Some(ScriptKind::detect(&capture.text));

        Ok(AttemptOutcome::Captured(Box::new(ExtractionResult {
            text: capture.text,
            hash: capture.hash,
            strategy_used: capture.strategy,
            metadata: meta,
        })))
    }
}
