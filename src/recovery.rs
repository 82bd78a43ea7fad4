// Copyright 2026 Magpie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Recovery controller — bounded-retry state machine wrapping one item's
//! extraction.
//!
//! Escalation is modeled as explicit states, not inline branching: a failed
//! first attempt soft-restarts (fresh context, rolling hash reset), a failed
//! second attempt hard-restarts the whole automation process, and a failed
//! third attempt is terminal. Fast mode caps the machine at a single attempt.

use crate::automation::{Automation, PageSession};
use crate::config::HashCarry;
use crate::extract::RollingHash;
use crate::types::ExtractionResult;
use async_trait::async_trait;

/// States of the per-item machine. `Failed` is terminal; success exits from
/// any attempt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attempt1,
    SoftRestarted,
    Attempt2,
    HardRestarted,
    Attempt3,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Up to three attempts with soft, then hard, restarts in between.
    Default,
    /// Single attempt; trades resilience for throughput.
    Fast,
}

/// Transient state for one item, bound to the current automation context.
/// Never persisted.
pub struct AttemptState {
    pub phase: Phase,
    pub rolling: RollingHash,
}

/// What a successful attempt produced.
#[derive(Debug)]
pub enum AttemptOutcome {
    Captured(Box<ExtractionResult>),
    /// Protection classifier short-circuit; the reason string lands in the
    /// ledger. Not a failure: never retried.
    Protected(&'static str),
}

/// One full extraction attempt against a fresh page session. Implemented by
/// the orchestrator's pipeline; tests supply deterministic fakes.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn attempt(
        &self,
        session: &mut Box<dyn PageSession>,
        state: &mut AttemptState,
    ) -> Result<AttemptOutcome, String>;
}

/// Everything the orchestrator needs to turn the run into a ledger status.
#[derive(Debug)]
pub struct RecoveryReport {
    pub outcome: Option<AttemptOutcome>,
    pub attempts: u32,
    pub phases: Vec<Phase>,
    pub last_failure: Option<String>,
}

pub struct RecoveryController {
    mode: RecoveryMode,
    hash_carry: HashCarry,
}

impl RecoveryController {
    pub fn new(mode: RecoveryMode, hash_carry: HashCarry) -> Self {
        Self { mode, hash_carry }
    }

    /// Drive one item to a terminal state. Failures never propagate; the
    /// caller reads the report.
    pub async fn run(
        &self,
        automation: &dyn Automation,
        runner: &dyn AttemptRunner,
    ) -> RecoveryReport {
        let mut state = AttemptState {
            phase: Phase::Attempt1,
            rolling: RollingHash::default(),
        };
        let mut phases = Vec::new();
        let mut attempts = 0u32;
        let mut last_failure: Option<String> = None;

        loop {
            phases.push(state.phase);
            match state.phase {
                Phase::Attempt1 | Phase::Attempt2 | Phase::Attempt3 => {
                    attempts += 1;
                    state.rolling.on_attempt_start(self.hash_carry);
                    match self.try_once(automation, runner, &mut state).await {
                        Ok(outcome) => {
                            return RecoveryReport {
                                outcome: Some(outcome),
                                attempts,
                                phases,
                                last_failure,
                            }
                        }
                        Err(reason) => {
                            tracing::debug!(phase = ?state.phase, %reason, "attempt failed");
                            last_failure = Some(reason);
                            state.phase = self.next_phase(state.phase);
                        }
                    }
                }
                Phase::SoftRestarted => {
                    // Each attempt binds a fresh context; the state change
                    // here is discarding the rolling hash with it.
                    state.rolling.reset();
                    state.phase = Phase::Attempt2;
                }
                Phase::HardRestarted => {
                    if let Err(e) = automation.restart().await {
                        last_failure = Some(format!("hard restart failed: {e}"));
                        state.phase = Phase::Failed;
                    } else {
                        state.rolling.reset();
                        state.phase = Phase::Attempt3;
                    }
                }
                Phase::Failed => {
                    return RecoveryReport {
                        outcome: None,
                        attempts,
                        phases,
                        last_failure,
                    }
                }
            }
        }
    }

    async fn try_once(
        &self,
        automation: &dyn Automation,
        runner: &dyn AttemptRunner,
        state: &mut AttemptState,
    ) -> Result<AttemptOutcome, String> {
        // A context that cannot even open counts as a failed attempt, so the
        // machine escalates instead of crashing the batch.
        let mut session = automation
            .new_context()
            .await
            .map_err(|e| format!("context setup: {e}"))?;
        let result = runner.attempt(&mut session, state).await;
        let _ = session.close().await;
        result
    }

    fn next_phase(&self, current: Phase) -> Phase {
        if self.mode == RecoveryMode::Fast {
            return Phase::Failed;
        }
        match current {
            Phase::Attempt1 => Phase::SoftRestarted,
            Phase::Attempt2 => Phase::HardRestarted,
            Phase::Attempt3 => Phase::Failed,
            // Restart states transition unconditionally in `run`.
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::ClickTarget;
    use crate::error::AutomationError;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct NullSession;

    #[async_trait]
    impl PageSession for NullSession {
        async fn navigate(&mut self, _url: &str, _timeout_ms: u64) -> Result<(), AutomationError> {
            Ok(())
        }
        async fn find(&self, _selector: &str) -> Result<bool, AutomationError> {
            Ok(false)
        }
        async fn click(&self, _target: ClickTarget<'_>) -> Result<bool, AutomationError> {
            Ok(false)
        }
        async fn read_clipboard(&self) -> Result<String, AutomationError> {
            Ok(String::new())
        }
        async fn evaluate(&self, _script: &str) -> Result<Value, AutomationError> {
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

    #[derive(Default)]
    struct CountingAutomation {
        contexts: AtomicU32,
        restarts: AtomicU32,
    }

    #[async_trait]
    impl Automation for CountingAutomation {
        async fn new_context(&self) -> Result<Box<dyn PageSession>, AutomationError> {
            self.contexts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullSession))
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

    /// Fails the first `fail_count` attempts, then succeeds.
    struct FlakyRunner {
        fail_count: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl AttemptRunner for FlakyRunner {
        async fn attempt(
            &self,
            _session: &mut Box<dyn PageSession>,
            _state: &mut AttemptState,
        ) -> Result<AttemptOutcome, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_count {
                Err("clipboard extraction failed".into())
            } else {
                Ok(AttemptOutcome::Protected("open-source"))
            }
        }
    }

    fn flaky(fail_count: u32) -> (FlakyRunner, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            FlakyRunner {
                fail_count,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn default_mode_fails_after_exactly_three_attempts() {
        let automation = CountingAutomation::default();
        let (runner, calls) = flaky(u32::MAX);
        let controller = RecoveryController::new(RecoveryMode::Default, HashCarry::Context);

        let report = controller.run(&automation, &runner).await;
        assert!(report.outcome.is_none());
        assert_eq!(report.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            report.phases,
            vec![
                Phase::Attempt1,
                Phase::SoftRestarted,
                Phase::Attempt2,
                Phase::HardRestarted,
                Phase::Attempt3,
                Phase::Failed,
            ]
        );
        assert_eq!(automation.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(report.last_failure.as_deref(), Some("clipboard extraction failed"));
    }

    #[tokio::test]
    async fn fast_mode_fails_after_one_attempt() {
        let automation = CountingAutomation::default();
        let (runner, calls) = flaky(u32::MAX);
        let controller = RecoveryController::new(RecoveryMode::Fast, HashCarry::Context);

        let report = controller.run(&automation, &runner).await;
        assert!(report.outcome.is_none());
        assert_eq!(report.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.phases, vec![Phase::Attempt1, Phase::Failed]);
        assert_eq!(automation.restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_on_second_attempt_soft_restarts_only() {
        let automation = CountingAutomation::default();
        let (runner, _) = flaky(1);
        let controller = RecoveryController::new(RecoveryMode::Default, HashCarry::Context);

        let report = controller.run(&automation, &runner).await;
        assert!(matches!(report.outcome, Some(AttemptOutcome::Protected(_))));
        assert_eq!(report.attempts, 2);
        assert_eq!(
            report.phases,
            vec![Phase::Attempt1, Phase::SoftRestarted, Phase::Attempt2]
        );
        assert_eq!(automation.restarts.load(Ordering::SeqCst), 0);
        // Two attempts, two isolated contexts.
        assert_eq!(automation.contexts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_attempt_success_uses_one_context() {
        let automation = CountingAutomation::default();
        let (runner, _) = flaky(0);
        let controller = RecoveryController::new(RecoveryMode::Default, HashCarry::Context);

        let report = controller.run(&automation, &runner).await;
        assert!(report.outcome.is_some());
        assert_eq!(report.attempts, 1);
        assert_eq!(report.phases, vec![Phase::Attempt1]);
        assert_eq!(automation.contexts.load(Ordering::SeqCst), 1);
    }
}
