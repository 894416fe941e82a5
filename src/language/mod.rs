// Language module
// Detects the language of a query, brings Manipuri queries into English for retrieval, and
// carries English answers back into Romanized Manipuri

pub mod lexicon;
pub mod translate;
pub mod transliterate;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use whatlang::Lang;

use crate::config::LanguageConfig;
use crate::{QaError, Result};
use lexicon::{Lexicon, ManipuriLexicon};
use translate::{LangCode, Translator};
use transliterate::{is_meetei_mayek, to_roman, to_script};

/// What the normalizer decided about one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageState {
    English,
    RomanizedManipuri,
    NativeManipuri,
    Other,
}

impl LanguageState {
    /// Manipuri queries get their answer translated back
    #[inline]
    pub fn is_manipuri(self) -> bool {
        matches!(self, Self::RomanizedManipuri | Self::NativeManipuri)
    }
}

impl fmt::Display for LanguageState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::English => "english",
            Self::RomanizedManipuri => "romanized_manipuri",
            Self::NativeManipuri => "native_manipuri",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Where Latin-script text that is confidently not English goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonEnglishRouting {
    /// Treat it as Romanized Manipuri
    #[default]
    Manipuri,
    /// Leave it untranslated
    Passthrough,
}

/// Outcome of statistical detection, before lexicon and routing rules apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    English,
    /// Latin script, reliably some language other than English
    NonEnglish,
    MeeteiMayek,
    /// Mostly letters of a script other than Latin or Meetei Mayek
    OtherScript,
    Unknown,
}

pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Detection;
}

/// Script counting plus `whatlang` trigram detection for Latin text
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    #[inline]
    fn detect(&self, text: &str) -> Detection {
        let mut meetei = 0_usize;
        let mut latin = 0_usize;
        let mut other = 0_usize;

        for c in text.chars() {
            if is_meetei_mayek(c) {
                meetei += 1;
            } else if c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c) {
                latin += 1;
            } else if c.is_alphabetic() {
                other += 1;
            }
        }

        let letters = meetei + latin + other;
        if letters == 0 {
            return Detection::Unknown;
        }
        if meetei * 2 > letters {
            return Detection::MeeteiMayek;
        }
        if other * 2 > letters {
            return Detection::OtherScript;
        }

        match whatlang::detect(text) {
            Some(info) if info.is_reliable() => {
                if info.lang() == Lang::Eng {
                    Detection::English
                } else {
                    debug!(
                        "Detected {:?} with confidence {:.2}",
                        info.lang(),
                        info.confidence()
                    );
                    Detection::NonEnglish
                }
            }
            _ => Detection::Unknown,
        }
    }
}

/// A query ready for retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub original: String,
    /// The query in English; equal to `original` when nothing was translated
    pub english: String,
    /// Meetei Mayek form handed to the translator, for Manipuri queries
    pub native: Option<String>,
    pub state: LanguageState,
}

pub struct LanguageNormalizer {
    detector: Box<dyn LanguageDetector>,
    lexicon: Arc<dyn Lexicon>,
    translator: Arc<dyn Translator>,
    routing: NonEnglishRouting,
}

impl LanguageNormalizer {
    #[inline]
    pub fn new(
        detector: Box<dyn LanguageDetector>,
        lexicon: Arc<dyn Lexicon>,
        translator: Arc<dyn Translator>,
        routing: NonEnglishRouting,
    ) -> Self {
        Self {
            detector,
            lexicon,
            translator,
            routing,
        }
    }

    /// `whatlang` detection and the configured lexicon
    #[inline]
    pub fn from_config(config: &LanguageConfig, translator: Arc<dyn Translator>) -> Self {
        Self::new(
            Box::new(WhatlangDetector),
            Arc::new(ManipuriLexicon::new(config.lexicon.clone())),
            translator,
            config.non_english_routing,
        )
    }

    /// Classify a query without translating it. Lexicon clues win over the detector.
    #[inline]
    pub fn classify(&self, text: &str) -> LanguageState {
        let clues = self.lexicon.clues(text);
        if !clues.is_empty() {
            debug!("Lexicon clues {:?} mark query as Romanized Manipuri", clues);
            return LanguageState::RomanizedManipuri;
        }

        match self.detector.detect(text) {
            Detection::MeeteiMayek => LanguageState::NativeManipuri,
            Detection::English | Detection::Unknown => LanguageState::English,
            Detection::NonEnglish => match self.routing {
                NonEnglishRouting::Manipuri => LanguageState::RomanizedManipuri,
                NonEnglishRouting::Passthrough => LanguageState::Other,
            },
            Detection::OtherScript => LanguageState::Other,
        }
    }

    /// Bring a query into English. Translation failures abort the request.
    #[inline]
    pub fn normalize(&self, raw_query: &str) -> Result<NormalizedQuery> {
        let original = raw_query.trim();
        if original.is_empty() {
            return Err(QaError::Input("Query is empty".to_string()));
        }

        let state = self.classify(original);
        let native = match state {
            LanguageState::RomanizedManipuri => Some(to_script(original)),
            LanguageState::NativeManipuri => Some(original.to_string()),
            LanguageState::English | LanguageState::Other => None,
        };

        let english = match &native {
            Some(script) => {
                self.translator
                    .translate(script, LangCode::Manipuri, LangCode::English)?
            }
            None => original.to_string(),
        };

        info!("Query classified as {}", state);

        Ok(NormalizedQuery {
            original: original.to_string(),
            english,
            native,
            state,
        })
    }

    /// Romanized Manipuri rendering of an English answer, for Manipuri queries only
    #[inline]
    pub fn reverse(&self, english_answer: &str, state: LanguageState) -> Result<Option<String>> {
        if !state.is_manipuri() {
            return Ok(None);
        }

        let native = self
            .translator
            .translate(english_answer, LangCode::English, LangCode::Manipuri)?;
        Ok(Some(to_roman(&native)))
    }
}
