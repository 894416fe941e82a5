use super::*;
use tempfile::TempDir;

/// Embeds text as keyword counts, so distances are predictable
struct KeywordEmbedder {
    keywords: Vec<&'static str>,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self {
            keywords: vec!["lake", "dance", "deer"],
        }
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                self.keywords
                    .iter()
                    .map(|k| lower.matches(k).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Returns vectors of a fixed width regardless of input
struct FixedWidthEmbedder(usize);

impl Embedder for FixedWidthEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; self.0]).collect())
    }
}

fn chunk(text: &str, page: u32) -> Chunk {
    Chunk::new(text, Some(page), None, 1).expect("chunk is long enough")
}

fn sample_chunks() -> Vec<Chunk> {
    vec![
        chunk("Loktak lake is the largest freshwater lake in the region", 1),
        chunk("Ras Lila is a classical dance form", 2),
        chunk("The sangai deer lives on floating islands of the lake", 3),
    ]
}

async fn create_index(dir: &TempDir) -> VectorIndex {
    VectorIndex::open(dir.path(), Arc::new(KeywordEmbedder::new()))
        .await
        .expect("index opens")
}

#[tokio::test]
async fn build_then_search_ranks_by_distance() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;

    let handle = index
        .build(&sample_chunks(), "lakes")
        .await
        .expect("build succeeds");
    assert_eq!(handle.dimension(), 3);
    assert_eq!(handle.session_id(), "lakes");

    let hits = index
        .search(&handle, "Tell me about the dance", 2)
        .await
        .expect("search succeeds");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.text(), "Ras Lila is a classical dance form");
    assert_eq!(hits[0].position, 1);
    assert!(hits[0].distance.abs() < f32::EPSILON);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn top_k_larger_than_index_returns_everything() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;
    let chunks = sample_chunks();

    let handle = index.build(&chunks, "all").await.expect("build succeeds");
    let hits = index
        .search(&handle, "lake", 10)
        .await
        .expect("search succeeds");

    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert!(chunks.contains(&hit.chunk));
    }
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn never_built_session_is_not_found() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;

    let result = index.handle("nothing-here").await;
    assert!(matches!(
        result,
        Err(QaError::IndexNotFound { ref session_id }) if session_id == "nothing-here"
    ));
}

#[tokio::test]
async fn rebuild_replaces_instead_of_appending() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;

    index
        .build(&sample_chunks(), "doc")
        .await
        .expect("first build");
    let replacement = vec![chunk("Only one chunk about deer remains", 1)];
    let handle = index.build(&replacement, "doc").await.expect("rebuild");

    assert_eq!(index.load_chunks(&handle).expect("chunks load"), replacement);
    let hits = index
        .search(&handle, "deer", 5)
        .await
        .expect("search succeeds");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text(), "Only one chunk about deer remains");
}

#[tokio::test]
async fn identical_rebuilds_give_identical_results() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;

    let first_handle = index.build(&sample_chunks(), "same").await.expect("build");
    let first: Vec<String> = index
        .search(&first_handle, "lake deer", 3)
        .await
        .expect("search")
        .into_iter()
        .map(|h| h.chunk.text().to_string())
        .collect();

    let second_handle = index.build(&sample_chunks(), "same").await.expect("rebuild");
    let second: Vec<String> = index
        .search(&second_handle, "lake deer", 3)
        .await
        .expect("search")
        .into_iter()
        .map(|h| h.chunk.text().to_string())
        .collect();

    assert_eq!(first, second);
    assert_eq!(first_handle, second_handle);
}

#[tokio::test]
async fn reopened_handle_matches_built_handle() {
    let dir = TempDir::new().expect("temp dir");
    let built = {
        let index = create_index(&dir).await;
        index.build(&sample_chunks(), "persisted").await.expect("build")
    };

    let index = create_index(&dir).await;
    let reopened = index.handle("persisted").await.expect("handle reopens");
    assert_eq!(reopened, built);
}

#[tokio::test]
async fn mismatched_metadata_is_inconsistent() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;
    let handle = index.build(&sample_chunks(), "torn").await.expect("build");

    let partial = serde_json::to_string(&sample_chunks()[..2]).expect("serialize");
    std::fs::write(handle.metadata_path(), partial).expect("overwrite metadata");

    let result = index.search(&handle, "lake", 3).await;
    let err = result.expect_err("row count mismatch");
    assert!(matches!(err, QaError::IndexInconsistent { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn altered_chunk_text_is_inconsistent() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;
    let handle = index.build(&sample_chunks(), "edited").await.expect("build");

    let mut chunks = sample_chunks();
    chunks[1] = chunk("Something else entirely, about a dance", 2);
    std::fs::write(
        handle.metadata_path(),
        serde_json::to_string(&chunks).expect("serialize"),
    )
    .expect("overwrite metadata");

    let result = index.search(&handle, "dance", 1).await;
    assert!(matches!(result, Err(QaError::IndexInconsistent { .. })));
}

#[tokio::test]
async fn remove_deletes_both_artifacts() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;
    let handle = index.build(&sample_chunks(), "bye").await.expect("build");

    assert!(index.remove("bye").await.expect("remove succeeds"));
    assert!(!handle.metadata_path().exists());
    assert!(matches!(
        index.handle("bye").await,
        Err(QaError::IndexNotFound { .. })
    ));
    assert!(matches!(
        index.search(&handle, "lake", 1).await,
        Err(QaError::IndexNotFound { .. })
    ));

    assert!(!index.remove("bye").await.expect("second remove succeeds"));
}

#[tokio::test]
async fn empty_chunks_and_bad_ids_are_input_errors() {
    let dir = TempDir::new().expect("temp dir");
    let index = create_index(&dir).await;

    assert!(matches!(
        index.build(&[], "empty").await,
        Err(QaError::Input(_))
    ));
    assert!(matches!(
        index.build(&sample_chunks(), "../escape").await,
        Err(QaError::Input(_))
    ));

    let handle = index.build(&sample_chunks(), "zero").await.expect("build");
    assert!(matches!(
        index.search(&handle, "lake", 0).await,
        Err(QaError::Input(_))
    ));
}

#[tokio::test]
#[should_panic(expected = "query embedding dimension")]
async fn dimension_mismatch_is_a_programmer_error() {
    let dir = TempDir::new().expect("temp dir");
    let wide = VectorIndex::open(dir.path(), Arc::new(FixedWidthEmbedder(4)))
        .await
        .expect("index opens");
    wide.build(&sample_chunks(), "dims").await.expect("build");

    let narrow = VectorIndex::open(dir.path(), Arc::new(FixedWidthEmbedder(2)))
        .await
        .expect("index opens");
    let handle = narrow.handle("dims").await.expect("handle");
    let _ = narrow.search(&handle, "anything", 1).await;
}
