//! Tab-scrape strategy: activate the source tab and read the visible code
//! container. The container is recognized by its many line-like children;
//! line-number gutter tokens are stripped.

use super::{js, ExtractOptions, Strategy};
use crate::automation::PageSession;
use crate::error::StrategyFailure;
use crate::types::StrategyKind;
use async_trait::async_trait;

pub struct TabScrape;

/// Drop pure-digit gutter tokens that line-by-line DOM rendering interleaves
/// with the code.
pub fn strip_line_numbers(raw: &str) -> String {
    raw.lines()
        .filter(|line| {
            let t = line.trim();
            !t.is_empty() && !t.chars().all(|c| c.is_ascii_digit())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Strategy for TabScrape {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TabScrape
    }

    async fn attempt(
        &self,
        page: &dyn PageSession,
        opts: &ExtractOptions,
    ) -> Result<String, StrategyFailure> {
        let clicked = page.evaluate(js::CLICK_SOURCE_TAB).await?;
        if !clicked.as_bool().unwrap_or(false) {
            return Err(StrategyFailure::NotApplicable);
        }
        page.wait(if opts.fast_mode { 600 } else { 1500 }).await;

        let raw = page.evaluate(js::SOURCE_TAB_LINES).await?;
        let raw = raw.as_str().unwrap_or_default();
        if raw.is_empty() {
            return Err(StrategyFailure::DomShapeUnrecognized);
        }
        Ok(strip_line_numbers(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_gutter_tokens() {
        let raw = "1\n//@version=5\n2\nindicator(\"x\")\n3\nplot(close)";
        assert_eq!(
            strip_line_numbers(raw),
            "//@version=5\nindicator(\"x\")\nplot(close)"
        );
    }

    #[test]
    fn keeps_lines_with_digits_and_code() {
        let raw = "len = 14\n200\nsma = ta.sma(close, len)";
        assert_eq!(strip_line_numbers(raw), "len = 14\nsma = ta.sma(close, len)");
    }

    #[test]
    fn drops_blank_lines_from_gutter_rendering() {
        assert_eq!(strip_line_numbers("\n\nplot(close)\n\n"), "plot(close)");
    }
}
