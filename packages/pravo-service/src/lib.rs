pub mod corpus;
pub mod diagnostics;
pub mod distance;
pub mod fusion;
pub mod retrieve;
pub mod rules;

mod error;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

pub use corpus::{
	CandidateQuery, Corpus, CorpusSnapshot, Fragment, LabeledChunk, MemoryCorpus, PgCorpus,
	RuleMetadata, SnapshotChunk, Strategy,
};
pub use diagnostics::LabeledEmbedding;
pub use distance::{DistanceFunction, ScoreOrder};
pub use error::{Error as ServiceError, Result as ServiceResult};
pub use retrieve::{EmbedResponse, ResultMetadata, RetrieveRequest, RetrieveResponse, RetrieveResult};
pub use rules::format_rules_for_llm;

use pravo_config::{Config, EmbeddingProviderConfig};
use pravo_providers::embedding;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}

/// The retrieval engine: a corpus backend, a query encoder and the tunables from `[retrieval]`.
pub struct PravoService {
	pub cfg: Config,
	pub corpus: Arc<dyn Corpus>,
	pub providers: Providers,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}

impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

impl PravoService {
	pub fn new(cfg: Config, corpus: Arc<dyn Corpus>) -> Self {
		Self { cfg, corpus, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, corpus: Arc<dyn Corpus>, providers: Providers) -> Self {
		Self { cfg, corpus, providers }
	}

	/// Encodes one text and checks the vector against the configured dimension.
	pub async fn embed_text(&self, text: &str) -> ServiceResult<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [text.to_string()];
		let mut vectors = self.providers.embedding.embed(cfg, &texts).await?;

		if vectors.len() != 1 {
			return Err(ServiceError::Provider {
				message: format!("Embedding provider returned {} vectors for one input.", vectors.len()),
			});
		}

		let vec = vectors.remove(0);

		if vec.len() != cfg.dimensions as usize {
			return Err(ServiceError::Provider {
				message: format!(
					"Embedding dimension mismatch: expected {}, got {}.",
					cfg.dimensions,
					vec.len()
				),
			});
		}

		Ok(vec)
	}

	pub async fn storage_healthy(&self) -> bool {
		match self.corpus.ping().await {
			Ok(()) => true,
			Err(err) => {
				tracing::warn!(error = %err, "Storage health probe failed.");

				false
			},
		}
	}

	/// Runs `fut` under `retrieval.timeout_ms`. Nothing partial survives a timeout.
	pub(crate) async fn with_deadline<T>(
		&self,
		operation: &str,
		fut: impl Future<Output = ServiceResult<T>>,
	) -> ServiceResult<T> {
		let timeout_ms = self.cfg.retrieval.timeout_ms;

		match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
			Ok(result) => result,
			Err(_) => Err(ServiceError::Timeout {
				message: format!("{operation} exceeded {timeout_ms} ms."),
			}),
		}
	}
}

pub(crate) fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

/// Parses pgvector text output. Malformed vectors come from storage, so they are integrity errors.
pub(crate) fn parse_pg_vector(text: &str) -> ServiceResult<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets =
		trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')).ok_or_else(|| {
			ServiceError::Integrity { message: "Vector text is not bracketed.".to_string() }
		})?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut vec = Vec::new();

	for part in without_brackets.split(',') {
		let value: f32 = part.trim().parse().map_err(|_| ServiceError::Integrity {
			message: "Vector text contains a non-numeric value.".to_string(),
		})?;

		vec.push(value);
	}

	Ok(vec)
}

/// First 50 characters of a query, for logs.
pub(crate) fn log_preview(query: &str) -> String {
	query.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pg_vector_text_round_trips_through_parser() {
		let text = vector_to_pg(&[0.5, -1.0, 2.25]);

		assert_eq!(text, "[0.5,-1,2.25]");
		assert_eq!(parse_pg_vector(&text).expect("Vector must parse."), vec![0.5, -1.0, 2.25]);
	}

	#[test]
	fn malformed_pg_vector_is_an_integrity_error() {
		let err = parse_pg_vector("0.5,1.0").expect_err("Expected bracket error.");

		assert!(matches!(err, ServiceError::Integrity { .. }));
		assert!(parse_pg_vector("[0.5,abc]").is_err());
	}

	#[test]
	fn log_preview_truncates_on_char_boundaries() {
		let query = "Статья ".repeat(20);

		assert_eq!(log_preview(&query).chars().count(), 50);
		assert_eq!(log_preview("short"), "short");
	}
}
