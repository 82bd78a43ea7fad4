//! Copy-trigger strategy: find a copy affordance, invoke it, read the
//! clipboard. Highest success rate of the chain, slowest (broad selector
//! search).

use super::{js, ExtractOptions, Strategy};
use crate::automation::{ClickTarget, PageSession};
use crate::error::StrategyFailure;
use crate::types::StrategyKind;
use async_trait::async_trait;

/// Copy affordances, most specific first.
const COPY_SELECTORS: &[&str] = &[
    "button[aria-label*='copy' i]",
    "button[title*='Copy']",
    ".copy-to-clipboard",
    "[data-qa-id*='copy']",
    "[class*='copy']",
];

pub struct CopyTrigger;

#[async_trait]
impl Strategy for CopyTrigger {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CopyTrigger
    }

    async fn attempt(
        &self,
        page: &dyn PageSession,
        opts: &ExtractOptions,
    ) -> Result<String, StrategyFailure> {
        // Some pages hold the payload in a clipboard data attribute; no click
        // needed at all.
        let direct = page.evaluate(js::COPY_DATA_ATTRIBUTE).await?;
        if let Some(text) = direct.as_str().filter(|t| !t.is_empty()) {
            return Ok(text.to_string());
        }

        // A stale payload from the previous read must not satisfy this one.
        page.evaluate(js::CLEAR_CLIPBOARD).await?;

        let settle_ms = if opts.fast_mode { 300 } else { 500 };
        let mut any_clicked = false;
        for selector in COPY_SELECTORS {
            if !page.click(ClickTarget::Selector(selector)).await? {
                continue;
            }
            any_clicked = true;
            page.wait(settle_ms).await;
            let text = page.read_clipboard().await?;
            if !text.is_empty() {
                return Ok(text);
            }
        }

        if any_clicked {
            Err(StrategyFailure::ClipboardEmpty)
        } else {
            Err(StrategyFailure::NoTrigger)
        }
    }
}
