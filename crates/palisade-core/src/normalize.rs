//! Text canonicalization for lexical matching.

/// Text in canonical form: lowercase, trimmed, inner whitespace collapsed.
///
/// Only the lexical layer consumes this; the semantic layer embeds raw
/// text, since the model tolerates surface variation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText(String);

impl NormalizedText {
    /// Returns the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the canonical form is empty (matches nothing).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwraps the canonical string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalizes `text`: lowercases, strips leading/trailing whitespace,
/// and collapses every internal whitespace run to a single space.
///
/// Pure and total; idempotent by construction. Empty input yields an
/// empty canonical form.
pub fn normalize(text: &str) -> NormalizedText {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    NormalizedText(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("IGNORE   PREVIOUS").as_str(), "ignore previous");
        assert_eq!(
            normalize("  Ignore\tPrevious\n\nInstructions  ").as_str(),
            "ignore previous instructions"
        );
    }

    #[test]
    fn matches_already_canonical_input() {
        assert_eq!(normalize("IGNORE   PREVIOUS"), normalize("ignore previous"));
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "  MiXeD   Case\t text ",
            "already normal",
            "",
            "   \t\n  ",
            "Üppercase Ünïcode",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "normalize must be idempotent for {:?}", input);
        }
    }

    #[test]
    fn empty_and_blank_input() {
        assert!(normalize("").is_empty());
        assert!(normalize("   \t  \n ").is_empty());
        assert_eq!(normalize("").as_str(), "");
    }

    #[test]
    fn preserves_single_spaces_and_punctuation() {
        assert_eq!(
            normalize("What's the weather today?").as_str(),
            "what's the weather today?"
        );
    }
}
