//! Embedded-data strategy: scan the page's script blocks for a serialized
//! `source` field. Lowest reliability, legacy fallback for pages that still
//! ship the source in their bootstrap data.

use super::{js, ExtractOptions, Strategy};
use crate::automation::PageSession;
use crate::error::StrategyFailure;
use crate::types::StrategyKind;
use crate::verify::has_signature;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

pub struct EmbeddedScrape;

/// Decode the escape sequences found in serialized script payloads:
/// `\n`, `\t`, `\r`, `\"`, `\'`, `\\`, `\/`, and `\uXXXX` (including
/// surrogate pairs).
pub fn decode_js_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('/') => out.push('/'),
            Some('\\') => out.push('\\'),
            Some('u') => {
                let high = read_hex4(&mut chars);
                match high {
                    Some(h @ 0xD800..=0xDBFF) => {
                        // Expect a low surrogate as \uXXXX right behind.
                        let mut clone = chars.clone();
                        if clone.next() == Some('\\') && clone.next() == Some('u') {
                            if let Some(l @ 0xDC00..=0xDFFF) = read_hex4(&mut clone) {
                                let combined =
                                    0x10000 + ((h - 0xD800) << 10) + (l - 0xDC00);
                                if let Some(ch) = char::from_u32(combined) {
                                    out.push(ch);
                                    chars = clone;
                                    continue;
                                }
                            }
                        }
                        out.push(char::REPLACEMENT_CHARACTER);
                    }
                    Some(code) => {
                        out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
                    }
                    None => out.push_str("\\u"),
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn read_hex4(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..4 {
        let c = *chars.peek()?;
        let digit = c.to_digit(16)?;
        chars.next();
        value = value * 16 + digit;
    }
    Some(value)
}

/// Pull a decoded source payload out of the document's script blocks, if any
/// block serializes one under a `source` (or legacy `body`) key.
pub fn scan_embedded(html: &str) -> Option<String> {
    let source_re = Regex::new(r#""source"\s*:\s*"((?:\\.|[^"\\])*)""#).expect("static regex");
    let body_re = Regex::new(r#""body"\s*:\s*"((?:\\.|[^"\\])*)""#).expect("static regex");

    let doc = Html::parse_document(html);
    let selector = Selector::parse("script").expect("static selector");
    for script in doc.select(&selector) {
        let content: String = script.text().collect();
        for re in [&source_re, &body_re] {
            if let Some(m) = re.captures(&content) {
                let decoded = decode_js_string(&m[1]);
                if has_signature(&decoded) {
                    return Some(decoded);
                }
            }
        }
    }
    None
}

#[async_trait]
impl Strategy for EmbeddedScrape {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EmbeddedScrape
    }

    async fn attempt(
        &self,
        page: &dyn PageSession,
        _opts: &ExtractOptions,
    ) -> Result<String, StrategyFailure> {
        let html = page.evaluate(js::PAGE_HTML).await?;
        let html = html.as_str().unwrap_or_default();
        scan_embedded(html).ok_or(StrategyFailure::DomShapeUnrecognized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_common_escapes() {
        assert_eq!(
            decode_js_string(r#"//@version=5\nindicator(\"x\")\n\tplot(close)"#),
            "//@version=5\nindicator(\"x\")\n\tplot(close)"
        );
        assert_eq!(decode_js_string(r"a\/b"), "a/b");
        assert_eq!(decode_js_string(r"back\\slash"), "back\\slash");
    }

    #[test]
    fn decodes_unicode_escapes() {
        assert_eq!(decode_js_string(r"\u00e9"), "\u{00e9}");
        // Surrogate pair for U+1F4C8 (chart emoji).
        assert_eq!(decode_js_string(r"\ud83d\udcc8"), "\u{1F4C8}");
        // Lone high surrogate degrades to the replacement char.
        assert_eq!(decode_js_string(r"\ud83d"), "\u{FFFD}");
    }

    #[test]
    fn leaves_unknown_escapes_alone() {
        assert_eq!(decode_js_string(r"\x41"), r"\x41");
    }

    #[test]
    fn scans_script_blocks_for_source_field() {
        let html = r#"<html><head><script>
            window.init = {"id": 1, "source": "//@version=5\nindicator(\"Embedded\")\nplot(close)"};
        </script></head><body></body></html>"#;
        let found = scan_embedded(html).expect("source found");
        assert!(found.starts_with("//@version=5\nindicator(\"Embedded\")"));
    }

    #[test]
    fn ignores_payloads_without_signature() {
        let html = r#"<html><script>var a = {"source": "just some text"};</script></html>"#;
        assert_eq!(scan_embedded(html), None);
    }

    #[test]
    fn falls_back_to_body_key() {
        let html = r#"<html><script>var a = {"body": "//@version=4\nstudy(\"legacy\")\nplot(close)"};</script></html>"#;
        let found = scan_embedded(html).expect("body found");
        assert!(found.contains("//@version=4"));
    }
}
