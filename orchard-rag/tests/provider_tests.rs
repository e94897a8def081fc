//! End-to-end tests for the context provider: ingestion, retrieval,
//! persistence and clearing against a temporary index directory.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use orchard_rag::{
    CONTEXT_SEPARATOR, ContextProvider, Document, EmbeddingProvider, HashingEmbeddingProvider,
    Metadata, MetadataValue, RagConfig, RagError, Result,
};

const FOX: &str = "The quick brown fox jumps over the lazy dog.";
const RATES: &str = "Interest rates rose again this quarter.";
const BANANAS: &str = "Bananas are rich in potassium and fibre.";
const APPLES: &str = "Apples grow in orchards on every continent.";

/// Wraps the hashing provider and counts every embedding call.
#[derive(Default)]
struct CountingEmbedder {
    inner: HashingEmbeddingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Always fails, like an unreachable embedding server.
struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError { provider: "failing".into(), message: "offline".into() })
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn model_id(&self) -> &str {
        "fnv-hashing-384"
    }
}

/// Holds the embedding of one query text until released.
struct GatedEmbedder {
    inner: HashingEmbeddingProvider,
    gated: &'static str,
    entered: Notify,
    release: Notify,
}

impl GatedEmbedder {
    fn new(gated: &'static str) -> Self {
        Self {
            inner: HashingEmbeddingProvider::default(),
            gated,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text == self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

fn config(dir: &Path) -> RagConfig {
    RagConfig::builder().index_dir(dir).index_name("test_index").build().unwrap()
}

async fn open(dir: &Path) -> ContextProvider {
    ContextProvider::open(config(dir), Arc::new(HashingEmbeddingProvider::default())).await.unwrap()
}

#[tokio::test]
async fn relevant_document_is_returned_for_query() {
    let dir = tempfile::tempdir().unwrap();
    let provider = open(dir.path()).await;

    let added = provider.add_documents(&[FOX, RATES, BANANAS], None).await.unwrap();
    assert_eq!(added, 3);
    assert!(provider.index_path().exists());

    let context = provider.get_relevant_context("fox", Some(1)).await.unwrap();
    assert_eq!(context, FOX);

    let context = provider.get_relevant_context("potassium", Some(2)).await.unwrap();
    let parts: Vec<&str> = context.split(CONTEXT_SEPARATOR).collect();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0], BANANAS);
}

#[tokio::test]
async fn empty_index_yields_empty_context_without_embedding() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let provider = ContextProvider::open(config(dir.path()), embedder.clone()).await.unwrap();

    assert_eq!(provider.get_relevant_context("anything", None).await.unwrap(), "");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert!(provider.is_empty().await);
}

#[tokio::test]
async fn metadata_count_mismatch_fails_before_embedding() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let provider = ContextProvider::open(config(dir.path()), embedder.clone()).await.unwrap();

    let metadatas = vec![Metadata::new()];
    let err = provider.add_documents(&[FOX, RATES], Some(metadatas.as_slice())).await.unwrap_err();
    assert!(err.is_config(), "{err}");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert!(provider.is_empty().await);
    assert!(!provider.index_path().exists());
}

#[tokio::test]
async fn metadata_is_attached_to_every_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let provider = open(dir.path()).await;

    let mut fox = Metadata::new();
    fox.insert("source".into(), MetadataValue::from("fables.txt"));
    let mut apples = Metadata::new();
    apples.insert("page".into(), MetadataValue::from(7i64));
    provider.add_documents(&[FOX, APPLES], Some(&[fox.clone(), apples.clone()][..])).await.unwrap();

    let results = provider.search("orchards apples", Some(1)).await.unwrap();
    assert_eq!(results[0].chunk.text, APPLES);
    assert_eq!(results[0].chunk.metadata, apples);

    let results = provider.search("fox", Some(1)).await.unwrap();
    assert_eq!(results[0].chunk.metadata, fox);
}

#[tokio::test]
async fn result_count_never_exceeds_k() {
    let dir = tempfile::tempdir().unwrap();
    let provider = open(dir.path()).await;
    provider.add_documents(&[FOX, RATES], None).await.unwrap();

    assert_eq!(provider.search("fox", Some(10)).await.unwrap().len(), 2);
    assert_eq!(provider.search("fox", None).await.unwrap().len(), 2);
    assert_eq!(provider.search("fox", Some(1)).await.unwrap().len(), 1);

    let err = provider.search("fox", Some(0)).await.unwrap_err();
    assert!(err.is_config());
}

#[tokio::test]
async fn index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let provider = open(dir.path()).await;
        provider.add_documents(&[FOX, BANANAS], None).await.unwrap();
    }

    let provider = open(dir.path()).await;
    assert_eq!(provider.len().await, 2);
    assert_eq!(provider.get_relevant_context("bananas", Some(1)).await.unwrap(), BANANAS);
}

#[tokio::test]
async fn ingestion_appends_and_keeps_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let provider = open(dir.path()).await;

    provider.add_documents(&[FOX], None).await.unwrap();
    provider.add_document(Document::new(FOX)).await.unwrap();
    assert_eq!(provider.len().await, 2);

    let results = provider.search("fox", Some(2)).await.unwrap();
    assert_ne!(results[0].chunk.id, results[1].chunk.id);
    assert_eq!(results[0].chunk.text, results[1].chunk.text);
}

#[tokio::test]
async fn long_document_is_split_into_overlapping_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder()
        .index_dir(dir.path())
        .chunk_size(80)
        .chunk_overlap(10)
        .build()
        .unwrap();
    let provider =
        ContextProvider::open(config, Arc::new(HashingEmbeddingProvider::default())).await.unwrap();

    let text = format!("{FOX} {RATES} {BANANAS} {APPLES}").repeat(3);
    let added = provider.add_documents(&[text], None).await.unwrap();
    assert!(added > 1);

    let results = provider.search("fox", Some(added)).await.unwrap();
    for result in &results {
        assert!(result.chunk.text.chars().count() <= 80);
    }
    let mut indices: Vec<usize> = results.iter().map(|r| r.chunk.chunk_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..added).collect::<Vec<_>>());
}

#[tokio::test]
async fn empty_documents_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let provider = open(dir.path()).await;

    assert_eq!(provider.add_documents(&["", "   "], None).await.unwrap(), 0);
    assert_eq!(provider.add_documents::<&str>(&[], None).await.unwrap(), 0);
    assert!(!provider.index_path().exists());
}

#[tokio::test]
async fn clear_removes_snapshot_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let provider = open(dir.path()).await;
    provider.add_documents(&[FOX], None).await.unwrap();
    assert!(provider.index_path().exists());

    provider.clear_database().await.unwrap();
    assert!(!provider.index_path().exists());
    assert!(provider.is_empty().await);
    assert_eq!(provider.get_relevant_context("fox", None).await.unwrap(), "");

    provider.clear_database().await.unwrap();

    provider.add_documents(&[RATES], None).await.unwrap();
    assert_eq!(provider.get_relevant_context("fox", None).await.unwrap(), RATES);
}

#[tokio::test]
async fn corrupted_snapshot_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = config(dir.path()).index_path();
    std::fs::write(&path, b"not an index").unwrap();

    let err = ContextProvider::open(config(dir.path()), Arc::new(HashingEmbeddingProvider::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::PersistenceError { .. }), "{err}");
}

#[tokio::test]
async fn snapshot_from_another_embedding_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    open(dir.path()).await.add_documents(&[FOX], None).await.unwrap();

    let err = ContextProvider::open(config(dir.path()), Arc::new(HashingEmbeddingProvider::new(64)))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::PersistenceError { .. }), "{err}");
}

#[tokio::test]
async fn embedding_failure_leaves_index_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    open(dir.path()).await.add_documents(&[FOX], None).await.unwrap();

    let provider = ContextProvider::open(config(dir.path()), Arc::new(FailingEmbedder)).await.unwrap();
    let err = provider.add_documents(&[RATES], None).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert_eq!(provider.len().await, 1);
}

#[tokio::test]
async fn persistence_failure_rolls_back_memory() {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("data");
    let provider =
        ContextProvider::open(config(&index_dir), Arc::new(HashingEmbeddingProvider::default()))
            .await
            .unwrap();

    // A regular file where the index directory should be created.
    std::fs::write(&index_dir, b"").unwrap();

    let err = provider.add_documents(&[FOX], None).await.unwrap_err();
    assert!(matches!(err, RagError::PersistenceError { .. }), "{err}");
    assert!(provider.is_empty().await);
}

#[tokio::test]
async fn concurrent_ingestion_loses_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(open(dir.path()).await);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let provider = provider.clone();
            tokio::spawn(async move {
                provider.add_documents(&[format!("document number {i}")], None).await.unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }
    assert_eq!(provider.len().await, 8);

    drop(provider);
    assert_eq!(open(dir.path()).await.len().await, 8);

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1, "temporary files left behind");
}

#[tokio::test]
async fn ingestion_proceeds_while_a_query_is_embedding() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(GatedEmbedder::new("slow query"));
    let provider =
        Arc::new(ContextProvider::open(config(dir.path()), embedder.clone()).await.unwrap());
    provider.add_documents(&[FOX], None).await.unwrap();

    let query = tokio::spawn({
        let provider = provider.clone();
        async move { provider.search("slow query", Some(5)).await }
    });
    embedder.entered.notified().await;

    let added = tokio::time::timeout(Duration::from_secs(5), provider.add_documents(&[APPLES], None))
        .await
        .expect("ingestion blocked behind a pending query")
        .unwrap();
    assert_eq!(added, 1);

    embedder.release.notify_one();
    let results = query.await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn query_after_clear_during_embedding_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(GatedEmbedder::new("slow query"));
    let provider =
        Arc::new(ContextProvider::open(config(dir.path()), embedder.clone()).await.unwrap());
    provider.add_documents(&[FOX], None).await.unwrap();

    let query = tokio::spawn({
        let provider = provider.clone();
        async move { provider.search("slow query", None).await }
    });
    embedder.entered.notified().await;
    provider.clear_database().await.unwrap();
    embedder.release.notify_one();

    assert!(query.await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn reload_picks_up_snapshot_written_by_another_provider() {
    let dir = tempfile::tempdir().unwrap();
    let reader = open(dir.path()).await;
    let writer = open(dir.path()).await;

    writer.add_documents(&[APPLES], None).await.unwrap();
    assert!(reader.is_empty().await);

    reader.reload().await.unwrap();
    assert_eq!(reader.len().await, 1);
}
