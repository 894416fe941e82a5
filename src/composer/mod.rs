
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::document::{DocumentMetadata, UNKNOWN_AUTHOR, UNKNOWN_TITLE};
use crate::embeddings::ChatCompletion;
use crate::session::{ChatMessage, Role};
use crate::{QaError, Result};

pub const DOCUMENT_QA_SYSTEM_PROMPT: &str = "You are an expert PDF question answering assistant.";

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes PDF content.";

pub const CODE_SYSTEM_PROMPT: &str = "You are a helpful coding assistant. \
    When users ask for code, return only the code wrapped in triple backticks (```). \
    Do not add any extra explanation unless specifically asked to explain.";

const METRICS_PARSE_ERROR: &str = "Failed to parse metrics";
const DEFAULT_CODE_LANGUAGE: &str = "code";

static TARGET_LANGUAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bin\s+(\w+\+\+|\w+)").expect("valid regex"));

static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("valid regex")
});

/// What the code assistant is asked to do, chosen once per request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Generate,
    Explain,
    Optimize,
}

impl RequestKind {
    /// Guess the kind from the wording of a prompt, for callers without explicit flags
    #[inline]
    pub fn infer(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        if ["explain", "describe", "what does", "analyze"]
            .iter()
            .any(|word| lower.contains(word))
        {
            Self::Explain
        } else if lower.contains("optimize") {
            Self::Optimize
        } else {
            Self::Generate
        }
    }
}

impl fmt::Display for RequestKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Explain => write!(f, "explain"),
            Self::Optimize => write!(f, "optimize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRequest {
    pub prompt: String,
    pub kind: RequestKind,
}

impl CodeRequest {
    #[inline]
    pub fn new(prompt: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            prompt: prompt.into(),
            kind,
        }
    }
}

/// A complexity figure, either compared across versions or given as one description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Complexity {
    Compared { original: String, optimized: String },
    Summary(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub time_complexity: Complexity,
    pub space_complexity: Complexity,
    pub remarks: String,
}

/// Metrics estimate of an optimization. Unparsable model output becomes `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricsReport {
    Parsed(ComplexityMetrics),
    Error { error: String },
}

impl MetricsReport {
    /// Parse the model's metrics reply, tolerating a surrounding code fence
    #[inline]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let body = match CODE_FENCE_REGEX.captures(trimmed) {
            Ok(Some(captures)) => captures.get(1).map_or(trimmed, |m| m.as_str()),
            _ => trimmed,
        };

        match serde_json::from_str::<ComplexityMetrics>(body) {
            Ok(metrics) => Self::Parsed(metrics),
            Err(e) => {
                warn!("Could not parse metrics reply: {}", e);
                Self::Error {
                    error: METRICS_PARSE_ERROR.to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeResponse {
    pub kind: RequestKind,
    /// The user turn sent to the model, as recorded in the conversation
    pub prompt: String,
    pub code: String,
    /// Why the optimized version is better; only for `Optimize`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsReport>,
}

/// Builds prompts and runs completions for document answers, summaries and code help
#[derive(Clone)]
pub struct AnswerComposer {
    chat: Arc<dyn ChatCompletion>,
    model: String,
}

impl AnswerComposer {
    #[inline]
    pub fn new(chat: Arc<dyn ChatCompletion>, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// System instruction, prior turns, then the question with its retrieved context
    #[inline]
    pub fn document_messages(
        history: &[ChatMessage],
        context: &str,
        question: &str,
        metadata: Option<&DocumentMetadata>,
    ) -> Vec<ChatMessage> {
        let mut user_turn = String::new();
        if let Some(block) = metadata.and_then(metadata_block) {
            user_turn.push_str(&block);
            user_turn.push_str("\n\n");
        }
        user_turn.push_str(&format!("Context:\n{}\n\nQuestion: {}", context, question));

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::new(Role::System, DOCUMENT_QA_SYSTEM_PROMPT));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::new(Role::User, user_turn));
        messages
    }

    /// One completion answering `question` from `context`
    #[inline]
    pub fn answer(
        &self,
        history: &[ChatMessage],
        context: &str,
        question: &str,
        metadata: Option<&DocumentMetadata>,
    ) -> Result<String> {
        let messages = Self::document_messages(history, context, question, metadata);
        debug!(
            "Composing answer with {} prior messages and {} chars of context",
            history.len(),
            context.len()
        );
        Ok(self.chat.chat(&self.model, &messages)?.trim().to_string())
    }

    /// Summarize document text, truncated to `max_chars` characters
    #[inline]
    pub fn summarize(&self, text: &str, max_chars: usize) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QaError::Input("Document has no text to summarize".to_string()));
        }

        let truncated: String = text.chars().take(max_chars).collect();
        if truncated.len() < text.len() {
            debug!("Summary input truncated to {} characters", max_chars);
        }

        let messages = [
            ChatMessage::new(Role::System, SUMMARY_SYSTEM_PROMPT),
            ChatMessage::new(
                Role::User,
                format!("Summarize the following PDF content:\n\n{}", truncated),
            ),
        ];
        Ok(self.chat.chat(&self.model, &messages)?.trim().to_string())
    }

    /// The user turn for a code request
    #[inline]
    pub fn code_prompt(request: &CodeRequest) -> String {
        let language = target_language(&request.prompt);
        match request.kind {
            RequestKind::Explain => format!(
                "Please explain the following {} code:\n\n{}",
                language, request.prompt
            ),
            RequestKind::Optimize => format!(
                "Please optimize the following {} code:\n\n{}\n\n\
                 Return only the optimized code, wrapped in triple backticks (```). \
                 No extra explanations.",
                language, request.prompt
            ),
            RequestKind::Generate => format!(
                "Write a {} program or snippet for the following requirement:\n\n{}\n\n\
                 Return only the code, wrapped in triple backticks (```). \
                 Do not include any explanation.",
                language, request.prompt
            ),
        }
    }

    /// Run a code request in the context of earlier turns. Optimize adds one call for the
    /// comparison narrative and one for the metrics estimate.
    #[inline]
    pub fn assist_code(
        &self,
        history: &[ChatMessage],
        request: &CodeRequest,
    ) -> Result<CodeResponse> {
        if request.prompt.trim().is_empty() {
            return Err(QaError::Input("Prompt is required".to_string()));
        }

        let prompt = Self::code_prompt(request);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::new(Role::System, CODE_SYSTEM_PROMPT));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::new(Role::User, prompt.clone()));

        let code = self.chat.chat(&self.model, &messages)?;

        let (reason, metrics) = if request.kind == RequestKind::Optimize {
            let reason = self.chat.chat(
                &self.model,
                &[ChatMessage::new(
                    Role::User,
                    format!(
                        "Compare the original and optimized code below and explain the \
                         improvements:\n\nOriginal Code:\n{}\n\nOptimized Code:\n{}",
                        request.prompt, code
                    ),
                )],
            )?;

            let metrics_reply = self.chat.chat(
                &self.model,
                &[ChatMessage::new(Role::User, metrics_prompt(&request.prompt, &code))],
            )?;

            (Some(reason), Some(MetricsReport::parse(&metrics_reply)))
        } else {
            (None, None)
        };

        Ok(CodeResponse {
            kind: request.kind,
            prompt,
            code,
            reason,
            metrics,
        })
    }
}

/// Programming language named by an `in <language>` phrase, or "code"
#[inline]
pub fn target_language(prompt: &str) -> String {
    match TARGET_LANGUAGE_REGEX.captures(&prompt.to_lowercase()) {
        Ok(Some(captures)) => captures
            .get(1)
            .map_or(DEFAULT_CODE_LANGUAGE.to_string(), |m| m.as_str().to_string()),
        _ => DEFAULT_CODE_LANGUAGE.to_string(),
    }
}

fn metadata_block(metadata: &DocumentMetadata) -> Option<String> {
    let mut lines = Vec::new();
    if metadata.title != UNKNOWN_TITLE {
        lines.push(format!("Title: {}", metadata.title));
    }
    if metadata.author != UNKNOWN_AUTHOR {
        lines.push(format!("Author: {}", metadata.author));
    }
    if !metadata.subject.is_empty() {
        lines.push(format!("Subject: {}", metadata.subject));
    }

    if lines.is_empty() {
        None
    } else {
        Some(format!("Metadata:\n{}", lines.join("\n")))
    }
}

fn metrics_prompt(original: &str, optimized: &str) -> String {
    format!(
        r#"Estimate and compare the runtime performance and memory usage (space complexity) between the following two versions of code. Give the result as a JSON:
{{
  "time_complexity": {{ "original": "...", "optimized": "..." }},
  "space_complexity": {{ "original": "...", "optimized": "..." }},
  "remarks": "..."
}}

Original Code:
{}

Optimized Code:
{}"#,
        original, optimized
    )
}
