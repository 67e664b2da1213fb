use tracing::{error, info};
use twiga_common::{Error, Result};
use twiga_db::{ChunkFilter, ScoredChunk, TwigaStore};

use crate::embeddings::EmbeddingProvider;

/// Embed `query` and return the `n_results` chunks closest to it that pass
/// `filter`, nearest first.
pub async fn vector_search(
    embedder: &dyn EmbeddingProvider,
    store: &TwigaStore,
    query: &str,
    n_results: usize,
    filter: &ChunkFilter,
) -> Result<Vec<ScoredChunk>> {
    let query_vector = embedder.embed_query(query).await.map_err(|e| {
        error!("failed to get embedding for query: {e}");
        Error::Embedding(format!("failed to get embedding for query: {e}"))
    })?;

    let results = store
        .search_chunks(&query_vector, n_results, filter)
        .await?;
    info!(
        "vector search returned {} chunks (model {})",
        results.len(),
        embedder.model()
    );
    Ok(results)
}

/// Render retrieved chunks as a numbered context block for the system prompt.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let heading = hit
                .chunk
                .top_level_section_title
                .as_deref()
                .map(|t| format!(" ({t})"))
                .unwrap_or_default();
            format!("[{}]{heading}\n{}", i + 1, hit.chunk.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
