
use itertools::Itertools;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::composer::{AnswerComposer, CodeRequest, CodeResponse};
use crate::config::Config;
use crate::document::{Chunk, DocumentMetadata, chunk_document, extract_document};
use crate::embeddings::{ChatCompletion, Embedder, OllamaClient};
use crate::index::{IndexHandle, SearchHit, VectorIndex};
use crate::language::translate::{HttpTranslator, Translator};
use crate::language::{LanguageNormalizer, LanguageState, NormalizedQuery};
use crate::session::{ChatMessage, Role, SessionDocument, SessionStore, validate_session_id};
use crate::{QaError, Result};

/// What ingesting a PDF produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub session_id: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub metadata: DocumentMetadata,
}

/// English answer for one query, before any reverse translation
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    pub english_answer: String,
    pub query: NormalizedQuery,
    pub chunks: Vec<SearchHit>,
}

impl QueryAnswer {
    #[inline]
    pub fn language_state(&self) -> LanguageState {
        self.query.state
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerText {
    pub en: String,
    /// Romanized Manipuri, present only for Manipuri queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mni: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub page_num: Option<u32>,
    pub text: String,
    pub distance: f32,
}

impl From<&SearchHit> for RetrievedChunk {
    #[inline]
    fn from(hit: &SearchHit) -> Self {
        Self {
            page_num: hit.chunk.page_num(),
            text: hit.chunk.text().to_string(),
            distance: hit.distance,
        }
    }
}

/// Full reply to a user question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResponse {
    pub answer: AnswerText,
    pub language: LanguageState,
    pub metadata: DocumentMetadata,
    pub chunks: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub metadata: DocumentMetadata,
}

/// Ingest, retrieval and answering for many concurrent sessions
pub struct Pipeline {
    config: Config,
    index: VectorIndex,
    normalizer: Arc<LanguageNormalizer>,
    composer: AnswerComposer,
    sessions: SessionStore,
}

impl Pipeline {
    #[inline]
    pub async fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatCompletion>,
        translator: Arc<dyn Translator>,
    ) -> Result<Self> {
        let index = VectorIndex::from_config(&config, embedder).await?;
        let normalizer = Arc::new(LanguageNormalizer::from_config(&config.language, translator));
        let composer = AnswerComposer::new(chat, config.ollama.chat_model.clone());
        let sessions = SessionStore::from_config(&config.session);

        Ok(Self {
            config,
            index,
            normalizer,
            composer,
            sessions,
        })
    }

    /// Ollama for embeddings and chat, the configured HTTP service for translation
    #[inline]
    pub async fn from_config(config: Config) -> Result<Self> {
        let ollama = Arc::new(OllamaClient::new(&config.ollama)?);
        let translator = Arc::new(HttpTranslator::new(&config.translation)?);
        Self::new(config, ollama.clone(), ollama, translator).await
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Extract, chunk and index a PDF for `session_id`, starting a fresh conversation
    #[inline]
    pub async fn ingest_pdf(&self, path: &Path, session_id: &str) -> Result<IngestReport> {
        validate_session_id(session_id)?;

        let owned_path: PathBuf = path.to_path_buf();
        let document = blocking(move || extract_document(&owned_path)).await?;
        let chunks = chunk_document(&document, &self.config.chunking);
        debug!(
            "Chunked {} pages into {} chunks with {} policy",
            document.pages.len(),
            chunks.len(),
            self.config.chunking.policy
        );

        if chunks.is_empty() {
            return Err(QaError::Input(format!(
                "No extractable text found in {}",
                path.display()
            )));
        }

        self.build(&chunks, session_id, document.metadata.clone())
            .await?;

        Ok(IngestReport {
            session_id: session_id.to_string(),
            page_count: document.pages.len(),
            chunk_count: chunks.len(),
            metadata: document.metadata,
        })
    }

    /// Index `chunks` under `session_id`, replacing any earlier document and history
    #[inline]
    pub async fn build(
        &self,
        chunks: &[Chunk],
        session_id: &str,
        metadata: DocumentMetadata,
    ) -> Result<IndexHandle> {
        let handle = self.index.build(chunks, session_id).await?;
        self.sessions.create(
            session_id,
            Some(SessionDocument {
                handle: handle.clone(),
                metadata,
            }),
        )?;
        Ok(handle)
    }

    /// Normalize the query, retrieve the nearest chunks, and answer in English
    #[inline]
    pub async fn answer_query(&self, raw_query: &str, session_id: &str) -> Result<QueryAnswer> {
        let answer = self.compose_answer(raw_query, session_id).await?;
        self.record_exchange(session_id, &answer)?;
        Ok(answer)
    }

    /// Everything `answer_query` does except touching the history
    async fn compose_answer(&self, raw_query: &str, session_id: &str) -> Result<QueryAnswer> {
        validate_session_id(session_id)?;

        let session = self.sessions.get(session_id);
        let (handle, metadata) = match session.as_ref().and_then(|s| s.document()) {
            Some(document) => (document.handle.clone(), Some(document.metadata.clone())),
            None => (self.index.handle(session_id).await?, None),
        };
        let history: Vec<ChatMessage> = session
            .as_ref()
            .map(|s| s.history().to_vec())
            .unwrap_or_default();

        let normalizer = Arc::clone(&self.normalizer);
        let raw = raw_query.to_string();
        let query = blocking(move || normalizer.normalize(&raw)).await?;

        let chunks = self
            .index
            .search(&handle, &query.english, self.config.retrieval.top_k)
            .await?;
        let context = chunks.iter().map(|hit| hit.chunk.text()).join("\n\n");

        let composer = self.composer.clone();
        let question = query.english.clone();
        let english_answer = blocking(move || {
            composer.answer(&history, &context, &question, metadata.as_ref())
        })
        .await?;

        info!(
            "Answered {} query for session {} from {} chunks",
            query.state,
            session_id,
            chunks.len()
        );

        Ok(QueryAnswer {
            english_answer,
            query,
            chunks,
        })
    }

    /// Answer a question, translating the answer back when the question was Manipuri
    #[inline]
    pub async fn ask(&self, raw_query: &str, session_id: &str) -> Result<AskResponse> {
        let answer = self.compose_answer(raw_query, session_id).await?;
        let state = answer.language_state();

        let normalizer = Arc::clone(&self.normalizer);
        let english = answer.english_answer.clone();
        let mni = blocking(move || normalizer.reverse(&english, state)).await?;

        // Nothing reaches the history until the reverse translation has succeeded
        self.record_exchange(session_id, &answer)?;

        let metadata = self
            .sessions
            .get(session_id)
            .and_then(|s| s.document().map(|d| d.metadata.clone()))
            .unwrap_or_default();

        Ok(AskResponse {
            answer: AnswerText {
                en: answer.english_answer,
                mni,
            },
            language: state,
            metadata,
            chunks: answer.chunks.iter().map(RetrievedChunk::from).collect(),
        })
    }

    fn record_exchange(&self, session_id: &str, answer: &QueryAnswer) -> Result<()> {
        self.sessions.append(
            session_id,
            ChatMessage::new(Role::User, answer.query.english.clone()),
            ChatMessage::new(Role::Assistant, answer.english_answer.clone()),
        )
    }

    /// Summarize a whole PDF
    #[inline]
    pub async fn summarize(&self, path: &Path) -> Result<SummaryResponse> {
        let owned_path = path.to_path_buf();
        let document = blocking(move || extract_document(&owned_path)).await?;

        let composer = self.composer.clone();
        let text = document.full_text();
        let max_chars = self.config.chunking.summary_max_chars;
        let summary = blocking(move || composer.summarize(&text, max_chars)).await?;

        Ok(SummaryResponse {
            summary,
            metadata: document.metadata,
        })
    }

    /// Code generation, explanation or optimization within a session's conversation
    #[inline]
    pub async fn assist_code(&self, session_id: &str, request: CodeRequest) -> Result<CodeResponse> {
        validate_session_id(session_id)?;

        let history: Vec<ChatMessage> = self
            .sessions
            .get(session_id)
            .map(|s| s.history().to_vec())
            .unwrap_or_default();

        let composer = self.composer.clone();
        let response = blocking(move || composer.assist_code(&history, &request)).await?;

        self.sessions.append(
            session_id,
            ChatMessage::new(Role::User, response.prompt.clone()),
            ChatMessage::new(Role::Assistant, response.code.clone()),
        )?;

        Ok(response)
    }

    /// Forget the conversation but keep the session's document
    #[inline]
    pub fn reset_history(&self, session_id: &str) -> Result<()> {
        let document = self
            .sessions
            .get(session_id)
            .and_then(|s| s.document().cloned());
        self.sessions.create(session_id, document)?;
        Ok(())
    }

    /// Drop a session's history and its persisted index. Returns whether anything existed.
    #[inline]
    pub async fn clear_session(&self, session_id: &str) -> Result<bool> {
        validate_session_id(session_id)?;

        let had_session = self.sessions.clear(session_id).is_some();
        let had_index = self.index.remove(session_id).await?;
        Ok(had_session || had_index)
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| QaError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))?
}
