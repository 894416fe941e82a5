
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::TranslationConfig;
use crate::{QaError, Result};

/// Languages understood by the translation service, in its FLORES-style codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LangCode {
    #[serde(rename = "eng_Latn")]
    English,
    /// Manipuri in Meetei Mayek script
    #[serde(rename = "mni_Mtei")]
    Manipuri,
}

impl LangCode {
    #[inline]
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "eng_Latn",
            Self::Manipuri => "mni_Mtei",
        }
    }
}

impl fmt::Display for LangCode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

pub trait Translator: Send + Sync {
    /// Translate `text`. An empty translation counts as a failure.
    fn translate(&self, text: &str, source: LangCode, target: LangCode) -> Result<String>;
}

impl<T: Translator + ?Sized> Translator for std::sync::Arc<T> {
    #[inline]
    fn translate(&self, text: &str, source: LangCode, target: LangCode) -> Result<String> {
        (**self).translate(text, source, target)
    }
}

/// Client for a REST machine translation service such as an IndicTrans2 server
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    endpoint: Url,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: LangCode,
    target_lang: LangCode,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translation: String,
}

impl HttpTranslator {
    #[inline]
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| QaError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self { endpoint, agent })
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, text: &str, source: LangCode, target: LangCode) -> anyhow::Result<String> {
        let body = serde_json::to_string(&TranslateRequest {
            text,
            source_lang: source,
            target_lang: target,
        })
        .context("Failed to serialize translation request")?;

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .with_context(|| format!("Translation request to {} failed", self.endpoint))?;

        let response: TranslateResponse = serde_json::from_str(&response_text)
            .context("Failed to parse translation response")?;

        Ok(response.translation)
    }
}

impl Translator for HttpTranslator {
    #[inline]
    fn translate(&self, text: &str, source: LangCode, target: LangCode) -> Result<String> {
        debug!(
            "Translating {} chars from {} to {}",
            text.chars().count(),
            source,
            target
        );

        let translation = self
            .request(text, source, target)
            .map_err(|e| QaError::Translation(format!("{:#}", e)))?;

        let translation = translation.trim();
        if translation.is_empty() {
            return Err(QaError::Translation(format!(
                "Empty translation from {} to {}",
                source, target
            )));
        }

        Ok(translation.to_string())
    }
}
