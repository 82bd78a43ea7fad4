//! Detail-page metadata: title, author, tags, likes, and the publication
//! timestamp in the half-dozen shapes the site renders it.

use super::js;
use crate::automation::PageSession;
use crate::error::AutomationError;
use crate::types::PageMeta;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct ExtendedMeta {
    #[serde(default)]
    published: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    likes: u32,
}

/// Scrape everything the header and sidecar need, except the source itself.
pub async fn scrape(page: &dyn PageSession) -> Result<PageMeta, AutomationError> {
    let title = page.evaluate(js::TITLE).await?;
    let author = page.evaluate(js::AUTHOR).await?;
    let extended = page.evaluate(js::EXTENDED_META).await?;
    let extended: ExtendedMeta = serde_json::from_value(extended).unwrap_or_default();

    let mut meta = PageMeta {
        title: title.as_str().unwrap_or_default().to_string(),
        author: author.as_str().unwrap_or_default().to_string(),
        tags: extended.tags,
        description: extended.description,
        likes: extended.likes,
        ..PageMeta::default()
    };

    let raw = extended.published.trim();
    if !raw.is_empty() {
        match parse_published(raw, Utc::now()) {
            Some(ts) => meta.published_at = Some(ts),
            None => meta.published_raw = Some(raw.to_string()),
        }
    }

    Ok(meta)
}

/// Pine version declared in the source, e.g. `//@version=5` → "5".
pub fn version_from_source(source: &str) -> Option<String> {
    let re = Regex::new(r"//@version=(\d+)").expect("static regex");
    re.captures(source).map(|c| c[1].to_string())
}

/// Parse the publication text the page shows. Handles, in order: relative
/// forms ("6 days ago"), today/yesterday, "Mon D, YYYY", ISO-8601, and
/// RFC-2822 HTTP dates. Returns `None` when nothing matches; callers keep
/// the raw text in that case.
pub fn parse_published(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    let rel = Regex::new(r"(?i)(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago")
        .expect("static regex");
    if let Some(c) = rel.captures(s) {
        let num: i64 = c[1].parse().ok()?;
        let delta = match c[2].to_lowercase().as_str() {
            "second" => Duration::seconds(num),
            "minute" => Duration::minutes(num),
            "hour" => Duration::hours(num),
            "day" => Duration::days(num),
            "week" => Duration::weeks(num),
            // Months and years approximated the way the page rounds them.
            "month" => Duration::days(30 * num),
            "year" => Duration::days(365 * num),
            _ => return None,
        };
        return Some(now - delta);
    }

    let lower = s.to_lowercase();
    if lower.starts_with("today") {
        return Some(now);
    }
    if lower.starts_with("yesterday") {
        return Some(now - Duration::days(1));
    }

    let abs = Regex::new(r"^(\w{3,9})\s+(\d{1,2}),\s*(\d{4})$").expect("static regex");
    if let Some(c) = abs.captures(s) {
        let month = month_number(&c[1])?;
        let day: u32 = c[2].parse().ok()?;
        let year: i32 = c[3].parse().ok()?;
        return Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Utc
            .with_ymd_and_hms(d.year(), d.month(), d.day(), 0, 0, 0)
            .single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

fn month_number(name: &str) -> Option<u32> {
    let key: String = name.chars().take(3).collect::<String>().to_lowercase();
    Some(match key.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    })
}
