//! Finite expansion of a pattern facet into one matching string.
//!
//! Works on the parsed HIR of the expression: literals emit themselves,
//! classes contribute one member (alphanumeric preferred), repetitions
//! expand to their minimum count, alternations take the first branch.
//! Constructs without a finite canonical expansion (anchors, look-arounds,
//! empty classes) are reported as too complex; the caller falls back to
//! the raw pattern text with a warning.

use regex_syntax::hir::{Class, Hir, HirKind};

#[derive(Debug, thiserror::Error)]
#[error("pattern {pattern:?} is too complex to expand: {reason}")]
pub struct PatternTooComplex {
    pub pattern: String,
    pub reason: String,
}

pub fn sample_matching(pattern: &str) -> Result<String, PatternTooComplex> {
    let err = |reason: &str| PatternTooComplex {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };
    let hir = regex_syntax::Parser::new()
        .parse(pattern)
        .map_err(|e| err(&e.to_string()))?;
    let mut out = String::new();
    expand(&hir, &mut out).map_err(|reason| err(reason))?;
    Ok(out)
}

fn expand(hir: &Hir, out: &mut String) -> Result<(), &'static str> {
    match hir.kind() {
        HirKind::Empty => Ok(()),
        HirKind::Literal(lit) => {
            out.push_str(&String::from_utf8_lossy(&lit.0));
            Ok(())
        }
        HirKind::Class(class) => {
            out.push(pick_class_member(class).ok_or("empty character class")?);
            Ok(())
        }
        HirKind::Look(_) => Err("anchors and look-arounds are unsupported"),
        HirKind::Repetition(rep) => {
            for _ in 0..rep.min {
                expand(&rep.sub, out)?;
            }
            Ok(())
        }
        HirKind::Capture(cap) => expand(&cap.sub, out),
        HirKind::Concat(parts) => {
            for part in parts {
                expand(part, out)?;
            }
            Ok(())
        }
        HirKind::Alternation(branches) => match branches.first() {
            Some(first) => expand(first, out),
            None => Err("empty alternation"),
        },
    }
}

/// One representative member of a character class, preferring something
/// printable and alphanumeric so generated documents read naturally.
fn pick_class_member(class: &Class) -> Option<char> {
    match class {
        Class::Unicode(set) => {
            for range in set.ranges() {
                for c in (range.start()..=range.end()).take(64) {
                    if c.is_ascii_alphanumeric() {
                        return Some(c);
                    }
                }
            }
            set.ranges().first().map(|r| r.start())
        }
        Class::Bytes(set) => {
            for range in set.ranges() {
                for b in (range.start()..=range.end()).take(64) {
                    if b.is_ascii_alphanumeric() {
                        return Some(b as char);
                    }
                }
            }
            set.ranges().first().map(|r| r.start() as char)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, value: &str) -> bool {
        regex::Regex::new(&format!("^(?:{pattern})$"))
            .unwrap()
            .is_match(value)
    }

    #[test]
    fn literals_and_classes() {
        let pattern = r"[A-Z]{2}\d{3}-[a-z]+";
        let sample = sample_matching(pattern).unwrap();
        assert!(matches(pattern, &sample), "{sample:?} should match {pattern:?}");
    }

    #[test]
    fn alternation_takes_first_branch() {
        let sample = sample_matching("yes|no").unwrap();
        assert_eq!(sample, "yes");
    }

    #[test]
    fn optional_expands_to_nothing() {
        let sample = sample_matching("a?b*c").unwrap();
        assert_eq!(sample, "c");
    }

    #[test]
    fn anchors_are_too_complex() {
        assert!(sample_matching("^abc$").is_err());
    }
}
