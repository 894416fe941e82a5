#[cfg(test)]
mod tests;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use dashmap::DashMap;
use futures::TryStreamExt;
use lancedb::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::AddDataMode;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::Chunk;
use crate::embeddings::Embedder;
use crate::session::validate_session_id;
use crate::{QaError, Result};

const VECTOR_COLUMN: &str = "vector";
const POSITION_COLUMN: &str = "position";
const TEXT_COLUMN: &str = "text";
const DISTANCE_COLUMN: &str = "_distance";

/// The vector table and chunk metadata file of one session, always used together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHandle {
    session_id: String,
    table_name: String,
    metadata_path: PathBuf,
    dimension: usize,
}

impl IndexHandle {
    #[inline]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }
}

/// One retrieved chunk with its squared L2 distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub position: usize,
    pub distance: f32,
}

/// Flat L2 index over chunk embeddings, one LanceDB table per session
pub struct VectorIndex {
    connection: Connection,
    index_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    build_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VectorIndex {
    #[inline]
    pub async fn open(index_dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(index_dir).map_err(|e| {
            QaError::Index(format!(
                "Failed to create index directory {}: {}",
                index_dir.display(),
                e
            ))
        })?;

        let uri = format!("file://{}", index_dir.join("vectors").display());
        debug!("Connecting to LanceDB at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| QaError::Index(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            index_dir: index_dir.to_path_buf(),
            embedder,
            build_locks: DashMap::new(),
        })
    }

    #[inline]
    pub async fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::open(&config.index_dir(), embedder).await
    }

    /// Embed every chunk and persist vectors plus chunk metadata under `session_id`,
    /// replacing whatever was indexed there before
    #[inline]
    pub async fn build(&self, chunks: &[Chunk], session_id: &str) -> Result<IndexHandle> {
        validate_session_id(session_id)?;
        if chunks.is_empty() {
            return Err(QaError::Input("No text chunks to index".to_string()));
        }

        let lock = self
            .build_locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let texts: Vec<String> = chunks.iter().map(|c| c.text().to_string()).collect();
        let vectors = self.embed(texts).await?;

        if vectors.len() != chunks.len() {
            return Err(QaError::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
            return Err(QaError::Embedding(
                "Embeddings have inconsistent or zero dimension".to_string(),
            ));
        }

        let handle = self.handle_for(session_id, dimension);

        // Write the metadata beside its final path first; it only replaces the old file
        // once the new vectors are committed
        let staged = self.stage_metadata(chunks)?;

        let batch = create_record_batch(chunks, &vectors, dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema.clone());

        if self.table_exists(&handle.table_name).await? {
            let table = self
                .connection
                .open_table(&handle.table_name)
                .execute()
                .await
                .map_err(|e| QaError::Index(format!("Failed to open table: {}", e)))?;
            table
                .add(reader)
                .mode(AddDataMode::Overwrite)
                .execute()
                .await
                .map_err(|e| QaError::Index(format!("Failed to replace vectors: {}", e)))?;
        } else {
            let table = self
                .connection
                .create_empty_table(&handle.table_name, schema)
                .execute()
                .await
                .map_err(|e| QaError::Index(format!("Failed to create table: {}", e)))?;
            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| QaError::Index(format!("Failed to insert vectors: {}", e)))?;
        }

        staged.persist(&handle.metadata_path).map_err(|e| {
            QaError::Index(format!(
                "Failed to persist chunk metadata to {}: {}",
                handle.metadata_path.display(),
                e.error
            ))
        })?;

        info!(
            "Indexed {} chunks ({} dimensions) for session {}",
            chunks.len(),
            dimension,
            session_id
        );
        Ok(handle)
    }

    /// Look up the persisted index of a session without touching its contents
    #[inline]
    pub async fn handle(&self, session_id: &str) -> Result<IndexHandle> {
        validate_session_id(session_id)?;

        let table_name = table_name(session_id);
        if !self.metadata_path(session_id).exists() || !self.table_exists(&table_name).await? {
            return Err(QaError::IndexNotFound {
                session_id: session_id.to_string(),
            });
        }

        let table = self
            .connection
            .open_table(&table_name)
            .execute()
            .await
            .map_err(|e| QaError::Index(format!("Failed to open table: {}", e)))?;
        let schema = table
            .schema()
            .await
            .map_err(|e| QaError::Index(format!("Failed to read table schema: {}", e)))?;

        let dimension = schema
            .fields()
            .iter()
            .find(|field| field.name() == VECTOR_COLUMN)
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| QaError::Index("Could not determine vector dimension".to_string()))?;

        Ok(self.handle_for(session_id, dimension))
    }

    /// The `top_k` chunks nearest to `query`, closest first. Asking for more chunks than
    /// were indexed returns all of them.
    #[inline]
    pub async fn search(
        &self,
        handle: &IndexHandle,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(QaError::Input("top_k must be at least 1".to_string()));
        }

        let chunks = self.load_chunks(handle)?;
        let table = match self.connection.open_table(&handle.table_name).execute().await {
            Ok(table) => table,
            Err(lancedb::Error::TableNotFound { .. }) => {
                return Err(QaError::IndexNotFound {
                    session_id: handle.session_id.clone(),
                });
            }
            Err(e) => return Err(QaError::Index(format!("Failed to open table: {}", e))),
        };

        let row_count = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Index(format!("Failed to count rows: {}", e)))?;
        if row_count != chunks.len() {
            return Err(inconsistent(
                handle,
                format!("{} vectors but {} chunks", row_count, chunks.len()),
            ));
        }

        let mut query_vectors = self.embed(vec![query.to_string()]).await?;
        let query_vector = query_vectors
            .pop()
            .ok_or_else(|| QaError::Embedding("No embedding returned for query".to_string()))?;
        assert_eq!(
            query_vector.len(),
            handle.dimension,
            "query embedding dimension differs from the indexed dimension"
        );

        let limit = top_k.min(row_count);
        debug!(
            "Searching session {} for {} of {} chunks",
            handle.session_id, limit, row_count
        );

        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| QaError::Index(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| QaError::Index(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::with_capacity(limit);
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| QaError::Index(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch, &chunks, handle)?);
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(limit);

        Ok(hits)
    }

    /// Chunks of a persisted index, in indexing order
    #[inline]
    pub fn load_chunks(&self, handle: &IndexHandle) -> Result<Vec<Chunk>> {
        let contents = match std::fs::read_to_string(&handle.metadata_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(QaError::IndexNotFound {
                    session_id: handle.session_id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents).map_err(|e| {
            QaError::Index(format!(
                "Failed to parse chunk metadata {}: {}",
                handle.metadata_path.display(),
                e
            ))
        })
    }

    /// Delete both artifacts of a session. Returns whether anything existed.
    #[inline]
    pub async fn remove(&self, session_id: &str) -> Result<bool> {
        validate_session_id(session_id)?;

        let lock = self
            .build_locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let mut removed = false;
        let table_name = table_name(session_id);
        if self.table_exists(&table_name).await? {
            self.connection
                .drop_table(&table_name)
                .await
                .map_err(|e| QaError::Index(format!("Failed to drop table: {}", e)))?;
            removed = true;
        }

        match std::fs::remove_file(self.metadata_path(session_id)) {
            Ok(()) => removed = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if removed {
            info!("Removed index for session {}", session_id);
        }
        Ok(removed)
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .map_err(|e| QaError::Embedding(format!("Embedding task failed: {}", e)))?
    }

    async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::Index(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.iter().any(|name| name == table_name))
    }

    fn stage_metadata(&self, chunks: &[Chunk]) -> Result<NamedTempFile> {
        let mut staged = NamedTempFile::new_in(&self.index_dir)?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            serde_json::to_writer(&mut writer, chunks)
                .map_err(|e| QaError::Index(format!("Failed to serialize chunks: {}", e)))?;
            writer.flush()?;
        }
        staged.as_file().sync_all()?;
        Ok(staged)
    }

    fn handle_for(&self, session_id: &str, dimension: usize) -> IndexHandle {
        IndexHandle {
            session_id: session_id.to_string(),
            table_name: table_name(session_id),
            metadata_path: self.metadata_path(session_id),
            dimension,
        }
    }

    fn metadata_path(&self, session_id: &str) -> PathBuf {
        self.index_dir.join(format!("{}.chunks.json", session_id))
    }
}

fn table_name(session_id: &str) -> String {
    format!("session_{}", session_id)
}

fn inconsistent(handle: &IndexHandle, reason: String) -> QaError {
    warn!(
        "Index for session {} is inconsistent: {}",
        handle.session_id, reason
    );
    QaError::IndexInconsistent {
        session_id: handle.session_id.clone(),
        reason,
    }
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(POSITION_COLUMN, DataType::UInt32, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new(TEXT_COLUMN, DataType::Utf8, false),
    ]))
}

fn create_record_batch(
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    dimension: usize,
) -> Result<RecordBatch> {
    let positions = (0..chunks.len())
        .map(|i| {
            u32::try_from(i).map_err(|_| QaError::Input("Too many chunks to index".to_string()))
        })
        .collect::<Result<Vec<u32>>>()?;
    let texts: Vec<&str> = chunks.iter().map(Chunk::text).collect();

    let flat_values: Vec<f32> = vectors.iter().flatten().copied().collect();
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| QaError::Index(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(UInt32Array::from(positions)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
    ];

    RecordBatch::try_new(create_schema(dimension), arrays)
        .map_err(|e| QaError::Index(format!("Failed to create record batch: {}", e)))
}

fn parse_search_batch(
    batch: &RecordBatch,
    chunks: &[Chunk],
    handle: &IndexHandle,
) -> Result<Vec<SearchHit>> {
    let positions = batch
        .column_by_name(POSITION_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| QaError::Index("Missing or invalid position column".to_string()))?;
    let texts = batch
        .column_by_name(TEXT_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| QaError::Index("Missing or invalid text column".to_string()))?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| QaError::Index("Missing distance column".to_string()))?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let position = positions.value(row) as usize;
        let chunk = chunks.get(position).ok_or_else(|| {
            inconsistent(handle, format!("vector position {} has no chunk", position))
        })?;
        if chunk.text() != texts.value(row) {
            return Err(inconsistent(
                handle,
                format!("chunk {} text differs from its vector row", position),
            ));
        }

        hits.push(SearchHit {
            chunk: chunk.clone(),
            position,
            distance: distances.value(row),
        });
    }

    Ok(hits)
}
