//! Bulk embedding export for corpus statistics. Scans the whole corpus; not for the query path.

use serde::Serialize;

use crate::{PravoService, ServiceResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledEmbedding {
	pub embedding: Vec<f32>,
	/// The owning rule's file name, or `chunk_<id>` when it is unknown.
	pub label: String,
}

impl PravoService {
	pub async fn labeled_embeddings(&self) -> ServiceResult<Vec<LabeledEmbedding>> {
		let chunks = self.corpus.labeled_chunks().await?;

		tracing::info!(count = chunks.len(), "Exported labeled embeddings.");

		Ok(chunks
			.into_iter()
			.map(|chunk| LabeledEmbedding {
				label: chunk
					.file
					.filter(|file| !file.is_empty())
					.unwrap_or_else(|| format!("chunk_{}", chunk.chunk_id)),
				embedding: chunk.embedding,
			})
			.collect())
	}
}
