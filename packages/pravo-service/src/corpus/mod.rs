//! Corpus backends: where candidate lists and fragment metadata come from.

mod memory;
mod postgres;

pub use memory::{CorpusSnapshot, MemoryCorpus, SnapshotChunk};
pub use postgres::PgCorpus;

use std::str::FromStr;

use pravo_storage::models::{CandidateRow, FusedRow};

use crate::{BoxFuture, DistanceFunction, ServiceError, ServiceResult, fusion};

/// Where reciprocal rank fusion runs for a Postgres corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	/// One SQL statement computes both candidate lists and the fused scores.
	Pushdown,
	/// Two bounded queries, fused in process.
	InProcess,
}
impl FromStr for Strategy {
	type Err = ServiceError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"pushdown" => Ok(Self::Pushdown),
			"in_process" => Ok(Self::InProcess),
			other => Err(ServiceError::InvalidRequest {
				message: format!("Unknown retrieval strategy {other:?}."),
			}),
		}
	}
}

/// Inputs of one fused candidate generation.
#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery<'a> {
	pub query_text: &'a str,
	pub query_vec: &'a [f32],
	pub distance: DistanceFunction,
	/// Size of each candidate list before fusion.
	pub candidate_limit: u32,
	pub rrf_k: f64,
	/// Size of the fused list.
	pub limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleMetadata {
	pub file: String,
	pub rule_number: Option<i32>,
	pub rule_title: Option<String>,
	pub section_title: Option<String>,
	pub chapter_title: Option<String>,
}

/// A chunk with its parent rule, as loaded for result assembly.
///
/// `rule` is `None` when the parent rule cannot be found.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
	pub chunk_id: i64,
	pub rule_id: i64,
	pub text: String,
	pub char_start: i32,
	pub char_end: i32,
	pub embedding: Option<Vec<f32>>,
	pub rule: Option<RuleMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledChunk {
	pub chunk_id: i64,
	pub embedding: Vec<f32>,
	pub file: Option<String>,
}

/// Read-only access to the fragment corpus.
///
/// Candidate lists only contain chunks with an embedding, carry 1-based ranks and break ties by
/// ascending chunk id.
pub trait Corpus
where
	Self: Send + Sync,
{
	fn vector_candidates<'a>(
		&'a self,
		query_vec: &'a [f32],
		distance: DistanceFunction,
		limit: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<CandidateRow>>>;

	fn lexical_candidates<'a>(
		&'a self,
		query_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<CandidateRow>>>;

	/// Generates both candidate lists and fuses them.
	fn fused_candidates<'a>(
		&'a self,
		query: CandidateQuery<'a>,
	) -> BoxFuture<'a, ServiceResult<Vec<FusedRow>>> {
		Box::pin(fuse_in_process(self, query))
	}

	/// Loads the given chunks. Ids without a chunk are simply absent from the result.
	fn fetch_fragments<'a>(
		&'a self,
		chunk_ids: &'a [i64],
	) -> BoxFuture<'a, ServiceResult<Vec<Fragment>>>;

	/// Every chunk with an embedding, in chunk id order.
	fn labeled_chunks<'a>(&'a self) -> BoxFuture<'a, ServiceResult<Vec<LabeledChunk>>>;

	fn ping<'a>(&'a self) -> BoxFuture<'a, ServiceResult<()>>;
}

/// Runs both generators concurrently and fuses their lists in process.
pub async fn fuse_in_process<C>(corpus: &C, query: CandidateQuery<'_>) -> ServiceResult<Vec<FusedRow>>
where
	C: Corpus + ?Sized,
{
	let (vector, lexical) = tokio::try_join!(
		corpus.vector_candidates(query.query_vec, query.distance, query.candidate_limit),
		corpus.lexical_candidates(query.query_text, query.candidate_limit),
	)?;

	tracing::debug!(
		vector_candidates = vector.len(),
		lexical_candidates = lexical.len(),
		"Generated candidate lists."
	);

	Ok(fusion::reciprocal_rank_fusion(
		&[vector.as_slice(), lexical.as_slice()],
		query.rrf_k,
		query.limit as usize,
	))
}
