//! `magpie fetch <url>` — harvest a listing (or a single detail page).

use crate::automation::chromium::ChromiumAutomation;
use crate::automation::Automation;
use crate::batch::Orchestrator;
use crate::config::Config;
use crate::events::HarvestEvent;
use crate::types::ItemStatus;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    url: &str,
    output: Option<PathBuf>,
    delay: f64,
    max_pages: u32,
    no_resume: bool,
    visible: bool,
    positional_click: bool,
    fast: bool,
) -> Result<()> {
    let mut config = Config::new(output);
    config.delay_secs = delay;
    config.max_pages = max_pages;
    config.resume = !no_resume;
    config.headless = !visible;
    config.positional_click = positional_click;
    config.fast_mode = fast;

    let automation = ChromiumAutomation::launch(config.headless, &config.user_agent)
        .await
        .context("cannot initialize automation layer")?;
    let automation: Arc<dyn Automation> = Arc::new(automation);

    let orchestrator = Orchestrator::new(Arc::clone(&automation), config);
    let events = orchestrator.subscribe();
    let printer = tokio::spawn(render_events(events));

    let result = orchestrator.run(url).await;
    let _ = automation.shutdown().await;
    // Dropping the orchestrator closes the event channel so the printer
    // drains and exits even when the run errored out early.
    drop(orchestrator);
    let _ = printer.await;

    let report = result.context("batch run failed")?;
    println!();
    println!("Summary");
    println!("  done:               {}", report.done);
    println!("  skipped (protected): {}", report.skipped_protected);
    println!("  failed:             {}", report.failed);
    if !report.failures.is_empty() {
        println!();
        println!("Failed items:");
        for (id, reason) in &report.failures {
            println!("  {id}: {reason}");
        }
    }
    Ok(())
}

async fn render_events(mut events: crate::events::EventReceiver) {
    let mut bar: Option<ProgressBar> = None;

    while let Ok(event) = events.recv().await {
        match event {
            HarvestEvent::BatchStarted { category, url, .. } => {
                println!("Harvesting '{category}' from {url}");
            }
            HarvestEvent::ListingPageScanned {
                page,
                discovered,
                new_items,
            } => {
                println!("  page {page}: {discovered} items ({new_items} new)");
            }
            HarvestEvent::ItemStarted {
                id, title, total, ..
            } => {
                let bar = bar.get_or_insert_with(|| {
                    let b = ProgressBar::new(total as u64);
                    b.set_style(
                        ProgressStyle::with_template(
                            "  [{bar:30}] {pos}/{len} {msg}",
                        )
                        .expect("static template")
                        .progress_chars("=> "),
                    );
                    b
                });
                bar.set_message(format!("{id} {title}"));
            }
            HarvestEvent::ItemRetrying { id, attempt } => {
                if let Some(bar) = &bar {
                    bar.println(format!("  retry {attempt} for {id}"));
                }
            }
            HarvestEvent::ItemFinished {
                id,
                status,
                strategy,
                reason,
            } => {
                if let Some(bar) = &bar {
                    let line = match status {
                        ItemStatus::Done => {
                            let via = strategy
                                .map(|s| s.to_string())
                                .unwrap_or_else(|| "?".to_string());
                            format!("  ok      {id} (via {via})")
                        }
                        ItemStatus::SkippedProtected => {
                            format!("  skipped {id} ({})", reason.unwrap_or_default())
                        }
                        _ => format!("  FAILED  {id}: {}", reason.unwrap_or_default()),
                    };
                    bar.println(line);
                    bar.inc(1);
                }
            }
            HarvestEvent::BatchComplete { elapsed_ms, .. } => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
                println!("Completed in {:.1}s", elapsed_ms as f64 / 1000.0);
                break;
            }
        }
    }
}
