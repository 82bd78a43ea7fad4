//! Content verifier — decides whether a candidate capture is worth keeping.
//!
//! Pure logic over the candidate text plus the rolling hash carried by the
//! caller. Rejections feed the recovery controller; accepted captures hand
//! their hash back for the next staleness check.

use crate::error::Rejection;
use crate::types::ContentHash;

/// Tokens that mark real script content as opposed to a placeholder.
const SIGNATURE_TOKENS: &[&str] = &[
    "//@version",
    "indicator(",
    "strategy(",
    "library(",
    "plot(",
];

/// Whether the text carries at least one recognized content signature.
pub fn has_signature(text: &str) -> bool {
    SIGNATURE_TOKENS.iter().any(|t| text.contains(t))
}

/// Whether every significant line is a bare import statement. Pages sometimes
/// surface a one-line `import author/lib/1` stub where the source should be.
fn import_only_shape(text: &str) -> bool {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut any = false;
    for line in &mut lines {
        if !line.starts_with("import ") {
            return false;
        }
        any = true;
    }
    any
}

#[derive(Debug, Clone)]
pub struct Verifier {
    min_len: usize,
}

impl Verifier {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Apply the acceptance rules in order: length, staleness against the
    /// previous capture, placeholder shape. Returns the new hash to roll
    /// forward on acceptance.
    pub fn verify(
        &self,
        candidate: &str,
        previous: Option<&ContentHash>,
    ) -> Result<ContentHash, Rejection> {
        let trimmed = candidate.trim();
        if trimmed.len() < self.min_len {
            return Err(Rejection::TooShort {
                len: trimmed.len(),
                min: self.min_len,
            });
        }

        let hash = ContentHash::of(candidate);
        if previous == Some(&hash) {
            return Err(Rejection::Stale);
        }

        if import_only_shape(trimmed) && !has_signature(trimmed) {
            return Err(Rejection::ImportOnly);
        }

        Ok(hash)
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "//@version=5\nindicator(\"Session VWAP\", overlay=true)\nvwap = ta.vwap(close)\nplot(vwap, color=color.teal)\n";

    #[test]
    fn accepts_real_source() {
        let v = Verifier::default();
        let hash = v.verify(SOURCE, None).expect("should accept");
        assert_eq!(hash, ContentHash::of(SOURCE));
    }

    #[test]
    fn rejects_empty_and_short() {
        let v = Verifier::default();
        assert_eq!(
            v.verify("", None),
            Err(Rejection::TooShort { len: 0, min: 64 })
        );
        assert!(matches!(
            v.verify("plot(close)", None),
            Err(Rejection::TooShort { .. })
        ));
    }

    #[test]
    fn rejects_stale_repeat() {
        let v = Verifier::default();
        let first = v.verify(SOURCE, None).unwrap();
        assert_eq!(v.verify(SOURCE, Some(&first)), Err(Rejection::Stale));
        // A different capture against the same previous hash is fine.
        let other = format!("{SOURCE}\nplot(close)\n");
        assert!(v.verify(&other, Some(&first)).is_ok());
    }

    #[test]
    fn rejects_import_only_placeholder() {
        let v = Verifier::new(10);
        let stub = "import someauthor/somelib/3 as lib\nimport other/util/1 as u";
        assert_eq!(v.verify(stub, None), Err(Rejection::ImportOnly));
    }

    #[test]
    fn accepts_imports_followed_by_signature() {
        let v = Verifier::new(10);
        let src = "import someauthor/somelib/3 as lib\n//@version=5\nindicator(\"x\")";
        assert!(v.verify(src, None).is_ok());
    }

    #[test]
    fn accepts_unshaped_text_without_signature() {
        // Rule 3 only filters import-shaped placeholders; other text of
        // sufficient length passes even without a signature token.
        let v = Verifier::new(10);
        assert!(v.verify("some prose that is long enough to pass", None).is_ok());
    }

    #[test]
    fn length_check_runs_before_staleness() {
        let v = Verifier::default();
        let prev = ContentHash::of("");
        assert!(matches!(
            v.verify("", Some(&prev)),
            Err(Rejection::TooShort { .. })
        ));
    }
}
