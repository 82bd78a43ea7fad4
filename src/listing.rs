//! Listing discovery — turn a listing URL into an ordered item worklist.
//!
//! Collects detail links from the base listing page, then walks generated
//! `?page=N` pages up to the configured cap, stopping early once several
//! consecutive pages yield nothing new.

use crate::automation::PageSession;
use crate::error::AutomationError;
use crate::events::{emit, EventSender, HarvestEvent};
use crate::extract::js;
use crate::types::{Category, Item};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

/// Stop visiting generated pages after this many in a row add nothing.
const MAX_EMPTY_PAGES: u32 = 3;

#[derive(Debug, Deserialize)]
struct LinkEntry {
    url: String,
    #[serde(default)]
    title: String,
}

/// Build the URL for page `n` of a listing, replacing any existing page
/// marker in path or query.
pub fn page_url(base: &str, n: u32) -> String {
    let Ok(mut parsed) = Url::parse(base) else {
        return format!("{base}?page={n}");
    };
    let path_re = Regex::new(r"/page-\d+").expect("static regex");
    let clean_path = path_re.replace_all(parsed.path(), "").to_string();
    parsed.set_path(&clean_path);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed.set_query(None);
    {
        let mut qp = parsed.query_pairs_mut();
        for (k, v) in &kept {
            qp.append_pair(k, v);
        }
        qp.append_pair("page", &n.to_string());
    }
    parsed.to_string()
}

/// Discover items for one category, in listing order.
pub async fn discover(
    session: &mut Box<dyn PageSession>,
    base_url: &str,
    category: &Category,
    max_pages: u32,
    nav_timeout_ms: u64,
    events: &EventSender,
) -> Result<Vec<Item>, AutomationError> {
    let mut items: Vec<Item> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    session.navigate(base_url, nav_timeout_ms).await?;
    session.wait(1200).await;
    let new_items = collect_page(session, category, &mut items, &mut seen).await?;
    emit(
        events,
        HarvestEvent::ListingPageScanned {
            page: 1,
            discovered: items.len() as u32,
            new_items,
        },
    );

    let mut empty_pages = 0u32;
    for page in 2..=max_pages {
        let url = page_url(base_url, page);
        if let Err(e) = session.navigate(&url, nav_timeout_ms).await {
            tracing::warn!(%url, error = %e, "listing page navigation failed, stopping pagination");
            break;
        }
        session.wait(1200).await;
        let new_items = collect_page(session, category, &mut items, &mut seen).await?;
        emit(
            events,
            HarvestEvent::ListingPageScanned {
                page,
                discovered: items.len() as u32,
                new_items,
            },
        );

        if new_items == 0 {
            empty_pages += 1;
            if empty_pages >= MAX_EMPTY_PAGES {
                tracing::debug!(page, "no new items on {MAX_EMPTY_PAGES} consecutive pages, stopping");
                break;
            }
        } else {
            empty_pages = 0;
        }
    }

    Ok(items)
}

async fn collect_page(
    session: &mut Box<dyn PageSession>,
    category: &Category,
    items: &mut Vec<Item>,
    seen: &mut HashSet<String>,
) -> Result<u32, AutomationError> {
    let value = session.evaluate(js::LISTING_LINKS).await?;
    let links: Vec<LinkEntry> = serde_json::from_value(value).unwrap_or_default();

    let mut added = 0u32;
    for link in links {
        let Some(item) = Item::from_url(&link.url, &link.title, category.clone()) else {
            continue;
        };
        if seen.insert(item.id.clone()) {
            items.push(item);
            added += 1;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_appends_page_param() {
        assert_eq!(
            page_url("https://x.test/scripts/indicators/", 3),
            "https://x.test/scripts/indicators/?page=3"
        );
    }

    #[test]
    fn page_url_replaces_existing_page_param() {
        assert_eq!(
            page_url("https://x.test/scripts/?sort=new&page=7", 2),
            "https://x.test/scripts/?sort=new&page=2"
        );
    }

    #[test]
    fn page_url_strips_page_path_segment() {
        assert_eq!(
            page_url("https://x.test/scripts/indicators/page-4", 2),
            "https://x.test/scripts/indicators?page=2"
        );
    }
}
