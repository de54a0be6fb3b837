//! Lexical phrase matching: the first detection layer.
//!
//! Tests substring containment of every corpus phrase against
//! canonicalized input. The compiled set is an internal fast path only;
//! observable results are identical to a naive per-phrase scan.

use regex::RegexSet;
use serde::Serialize;
use tracing::debug;

use crate::corpus::{CorpusError, ThreatCorpus};
use crate::normalize::{normalize, NormalizedText};
use crate::risk::RiskLevel;

/// Verdict from the lexical layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalVerdict {
    /// True when at least one corpus phrase was found.
    pub blocked: bool,
    /// HIGH on any match, NONE otherwise; the lexical layer has no
    /// graded tiers.
    pub risk: RiskLevel,
    /// Every corpus phrase found in the text, in corpus order.
    pub matches: Vec<String>,
}

impl LexicalVerdict {
    fn clear() -> Self {
        Self {
            blocked: false,
            risk: RiskLevel::None,
            matches: Vec::new(),
        }
    }
}

/// Scans normalized text for exact threat phrases.
pub struct LexicalMatcher {
    phrases: Vec<String>,
    set: RegexSet,
}

impl LexicalMatcher {
    /// Builds a matcher over the corpus's lexical list.
    ///
    /// Phrases are canonicalized here once, so irregular casing or spacing
    /// in a corpus file cannot break matching.
    pub fn new(corpus: &ThreatCorpus) -> Result<Self, CorpusError> {
        let phrases: Vec<String> = corpus
            .lexical()
            .iter()
            .map(|p| normalize(p).into_inner())
            .collect();
        let set = RegexSet::new(phrases.iter().map(|p| regex::escape(p)))?;

        debug!(phrases = phrases.len(), "Compiled lexical matcher");

        Ok(Self { phrases, set })
    }

    /// Scans `text` and reports every corpus phrase it contains.
    ///
    /// Never fails; an empty canonical form matches nothing.
    pub fn scan(&self, text: &NormalizedText) -> LexicalVerdict {
        let hits = self.set.matches(text.as_str());
        if !hits.matched_any() {
            return LexicalVerdict::clear();
        }

        // Matched indices come back ascending, which is corpus order.
        let matches: Vec<String> = hits.iter().map(|i| self.phrases[i].clone()).collect();
        debug!(count = matches.len(), "Lexical threat phrases matched");

        LexicalVerdict {
            blocked: true,
            risk: RiskLevel::High,
            matches,
        }
    }

    /// Number of phrases in the compiled set.
    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }
}
