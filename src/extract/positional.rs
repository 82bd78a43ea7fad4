//! Fixed-position click strategy: click where the copy button lives relative
//! to the code container, then read the clipboard. 3-5x faster than the
//! selector search, fragile to layout drift; only ahead of copy_trigger when
//! explicitly preferred.

use super::{js, ExtractOptions, Strategy};
use crate::automation::{ClickTarget, PageSession, Rect};
use crate::error::StrategyFailure;
use crate::types::StrategyKind;
use async_trait::async_trait;

/// Fallback click offsets from the container's top-right corner, where the
/// copy button sits in the known layout.
const OFFSET_FROM_RIGHT: f64 = 40.0;
const OFFSET_FROM_TOP: f64 = 30.0;

pub struct PositionalClick;

/// Where to click for a container box when no inner copy control was found.
pub fn fallback_click_point(container: &Rect) -> (f64, f64) {
    let x = container.x + (container.width - OFFSET_FROM_RIGHT).max(16.0);
    let y = container.y + OFFSET_FROM_TOP;
    (x, y)
}

fn rect_from(value: &serde_json::Value) -> Option<Rect> {
    serde_json::from_value(value.clone()).ok()
}

#[async_trait]
impl Strategy for PositionalClick {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PositionalClick
    }

    async fn attempt(
        &self,
        page: &dyn PageSession,
        opts: &ExtractOptions,
    ) -> Result<String, StrategyFailure> {
        let container = page.evaluate(js::CODE_CONTAINER_BOX).await?;
        let Some(container) = rect_from(&container) else {
            return Err(StrategyFailure::DomShapeUnrecognized);
        };

        // Prefer an actual copy control inside the container; raw offsets are
        // the last resort.
        let control = page.evaluate(js::INNER_COPY_CONTROL_BOX).await?;
        let (x, y) = match rect_from(&control) {
            Some(btn) => (btn.x + btn.width / 2.0, btn.y + btn.height / 2.0),
            None => fallback_click_point(&container),
        };

        page.evaluate(js::CLEAR_CLIPBOARD).await?;
        page.click(ClickTarget::Point { x, y }).await?;
        page.wait(if opts.fast_mode { 800 } else { 1000 }).await;

        let text = page.read_clipboard().await?;
        if text.is_empty() {
            Err(StrategyFailure::ClipboardEmpty)
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_point_is_inside_wide_containers() {
        let r = Rect {
            x: 100.0,
            y: 200.0,
            width: 600.0,
            height: 400.0,
        };
        let (x, y) = fallback_click_point(&r);
        assert_eq!(x, 100.0 + 560.0);
        assert_eq!(y, 230.0);
    }

    #[test]
    fn fallback_point_clamps_narrow_containers() {
        let r = Rect {
            x: 10.0,
            y: 0.0,
            width: 30.0,
            height: 50.0,
        };
        let (x, _) = fallback_click_point(&r);
        assert_eq!(x, 26.0);
    }
}
