
use serde::{Deserialize, Serialize};

/// How a lexicon term is compared against the words of a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    #[default]
    Word,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub term: String,
    #[serde(default)]
    pub kind: MatchKind,
}

impl LexiconEntry {
    #[inline]
    pub fn word(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            kind: MatchKind::Word,
        }
    }

    #[inline]
    pub fn prefix(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            kind: MatchKind::Prefix,
        }
    }

    /// Common Romanized Manipuri question words
    #[inline]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::prefix("houjik"),
            Self::word("houjikti"),
            Self::word("nahakki"),
            Self::word("eemagi"),
            Self::word("khallabani"),
            Self::word("nattraga"),
            Self::word("eikhoigi"),
            Self::word("phangjaba"),
        ]
    }

    #[inline]
    pub fn matches(&self, word: &str) -> bool {
        match self.kind {
            MatchKind::Word => word == self.term,
            MatchKind::Prefix => word.starts_with(&self.term),
        }
    }
}

/// Clue words marking a query as Romanized Manipuri
pub trait Lexicon: Send + Sync {
    /// Terms of the lexicon found in `text`, in the order they first appear
    fn clues(&self, text: &str) -> Vec<String>;

    #[inline]
    fn has_clue(&self, text: &str) -> bool {
        !self.clues(text).is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManipuriLexicon {
    entries: Vec<LexiconEntry>,
}

impl ManipuriLexicon {
    #[inline]
    pub fn new(entries: Vec<LexiconEntry>) -> Self {
        Self { entries }
    }

    #[inline]
    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }
}

impl Default for ManipuriLexicon {
    #[inline]
    fn default() -> Self {
        Self::new(LexiconEntry::defaults())
    }
}

impl Lexicon for ManipuriLexicon {
    #[inline]
    fn clues(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut found: Vec<String> = Vec::new();

        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            for entry in &self.entries {
                if entry.matches(word) && !found.contains(&entry.term) {
                    found.push(entry.term.clone());
                }
            }
        }

        found
    }
}
