// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction strategy chain.
//!
//! An ordered set of interchangeable strategies, each attempting to pull the
//! raw source text off a rendered detail page. The chain stops at the first
//! candidate the verifier accepts. Before any strategy runs, the protection
//! classifier short-circuits invite-only and protected pages.

pub mod copy_trigger;
pub mod embedded;
pub mod js;
pub mod metadata;
pub mod positional;
pub mod tab_scrape;

use crate::automation::PageSession;
use crate::config::HashCarry;
use crate::error::{AutomationError, StrategyFailure};
use crate::types::{ContentHash, StrategyKind};
use crate::verify::Verifier;
use async_trait::async_trait;
use thiserror::Error;

/// Per-run options threaded into every strategy attempt.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Reorders positional_click ahead of copy_trigger.
    pub positional_click_preferred: bool,
    pub fast_mode: bool,
    pub action_timeout_ms: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            positional_click_preferred: false,
            fast_mode: false,
            action_timeout_ms: 10_000,
        }
    }
}

/// One interchangeable way of obtaining raw content from a rendered page.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Try to obtain a candidate capture. Verification is the caller's job.
    async fn attempt(
        &self,
        page: &dyn PageSession,
        opts: &ExtractOptions,
    ) -> Result<String, StrategyFailure>;
}

/// Rolling anti-staleness hash, owned by the recovery controller's attempt
/// state. The carry policy decides when it resets.
#[derive(Debug, Clone, Default)]
pub struct RollingHash {
    prev: Option<ContentHash>,
}

impl RollingHash {
    pub fn previous(&self) -> Option<&ContentHash> {
        self.prev.as_ref()
    }

    pub fn advance(&mut self, hash: ContentHash) {
        self.prev = Some(hash);
    }

    /// Called when a new automation context is bound (soft restart).
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Called at the start of each attempt; only clears under the
    /// per-attempt carry policy.
    pub fn on_attempt_start(&mut self, carry: HashCarry) {
        if carry == HashCarry::Attempt {
            self.prev = None;
        }
    }
}

/// Why a whole chain pass produced nothing usable.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("all strategies failed: {summary}")]
    Exhausted { summary: String },
    /// The automation target vanished mid-chain; retrying other strategies
    /// in the same session is pointless.
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// Verified output of a chain pass.
#[derive(Debug, Clone)]
pub struct Capture {
    pub text: String,
    pub hash: ContentHash,
    pub strategy: StrategyKind,
}

pub struct StrategyChain {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyChain {
    /// Build the chain in its fixed priority order. When the positional fast
    /// path is preferred, it swaps ahead of the selector search.
    pub fn new(positional_click_preferred: bool) -> Self {
        let mut strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(copy_trigger::CopyTrigger),
            Box::new(positional::PositionalClick),
            Box::new(tab_scrape::TabScrape),
            Box::new(embedded::EmbeddedScrape),
        ];
        if positional_click_preferred {
            strategies.swap(0, 1);
        }
        Self { strategies }
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Run strategies in order until one candidate passes verification.
    /// Rejected candidates advance the rolling hash only when accepted, so a
    /// stale payload cannot launder itself through a later strategy.
    pub async fn extract(
        &self,
        page: &dyn PageSession,
        verifier: &Verifier,
        rolling: &mut RollingHash,
        opts: &ExtractOptions,
    ) -> Result<Capture, ChainError> {
        let mut notes: Vec<String> = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            match strategy.attempt(page, opts).await {
                Ok(candidate) => match verifier.verify(&candidate, rolling.previous()) {
                    Ok(hash) => {
                        tracing::debug!(strategy = %kind, len = candidate.len(), "capture accepted");
                        rolling.advance(hash.clone());
                        return Ok(Capture {
                            text: candidate,
                            hash,
                            strategy: kind,
                        });
                    }
                    Err(rejection) => {
                        tracing::debug!(strategy = %kind, %rejection, "capture rejected");
                        notes.push(format!("{kind}: {rejection}"));
                    }
                },
                Err(StrategyFailure::Automation(e @ AutomationError::TargetClosed(_))) => {
                    return Err(ChainError::Automation(e));
                }
                Err(failure) => {
                    tracing::debug!(strategy = %kind, %failure, "strategy failed");
                    notes.push(format!("{kind}: {failure}"));
                }
            }
        }

        Err(ChainError::Exhausted {
            summary: notes.join("; "),
        })
    }
}

/// Access classification of a detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    Open,
    InviteOnly,
    Protected,
    NotOpenSource,
}

impl Protection {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Open => "open-source",
            Self::InviteOnly => "invite-only",
            Self::Protected => "protected",
            Self::NotOpenSource => "not open-source",
        }
    }
}

/// Classify page text. Invite-only and protected markers override an
/// open-source marker when both appear (promo copy quotes them together).
pub fn classify_text(body: &str) -> Protection {
    let lower = body.to_lowercase();
    if lower.contains("invite-only") {
        Protection::InviteOnly
    } else if lower.contains("protected script") {
        Protection::Protected
    } else if lower.contains("open-source") {
        Protection::Open
    } else {
        Protection::NotOpenSource
    }
}

/// Classify the live page.
pub async fn classify(page: &dyn PageSession) -> Result<Protection, AutomationError> {
    let body = page.evaluate(js::BODY_TEXT).await?;
    Ok(classify_text(body.as_str().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_order_default_and_preferred() {
        let chain = StrategyChain::new(false);
        assert_eq!(
            chain.kinds(),
            vec![
                StrategyKind::CopyTrigger,
                StrategyKind::PositionalClick,
                StrategyKind::TabScrape,
                StrategyKind::EmbeddedScrape,
            ]
        );
        let chain = StrategyChain::new(true);
        assert_eq!(
            chain.kinds()[..2],
            [StrategyKind::PositionalClick, StrategyKind::CopyTrigger]
        );
    }

    #[test]
    fn classifier_precedence() {
        assert_eq!(
            classify_text("Open-source script\nSession VWAP"),
            Protection::Open
        );
        assert_eq!(
            classify_text("This is an invite-only script. Open-source scripts are different."),
            Protection::InviteOnly
        );
        assert_eq!(
            classify_text("Protected script: the author chose to hide the source."),
            Protection::Protected
        );
        assert_eq!(classify_text("Some unrelated page"), Protection::NotOpenSource);
    }

    #[test]
    fn rolling_hash_carry_policies() {
        let mut rolling = RollingHash::default();
        rolling.advance(ContentHash::of("a"));
        rolling.on_attempt_start(HashCarry::Context);
        assert!(rolling.previous().is_some());
        rolling.on_attempt_start(HashCarry::Attempt);
        assert!(rolling.previous().is_none());
    }
}
