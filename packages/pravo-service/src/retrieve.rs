use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use pravo_config::Retrieval;
use pravo_storage::models::FusedRow;

use crate::{
	DistanceFunction, PravoService, ServiceError, ServiceResult,
	corpus::{CandidateQuery, Fragment},
	fusion, log_preview,
};

/// A retrieval request as received at the boundary. Unset fields take the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveRequest {
	pub query: String,
	#[serde(default)]
	pub k: Option<i64>,
	#[serde(default)]
	pub distance_function: Option<String>,
}
impl RetrieveRequest {
	pub fn new(query: impl Into<String>, k: i64, distance: DistanceFunction) -> Self {
		Self {
			query: query.into(),
			k: Some(k),
			distance_function: Some(distance.as_str().to_string()),
		}
	}

	pub(crate) fn validate(&self, retrieval: &Retrieval) -> ServiceResult<ValidRequest> {
		let query = self.query.trim();

		if query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "query must be a non-empty string.".to_string(),
			});
		}

		let k = self.k.unwrap_or(i64::from(retrieval.default_k));

		if k < 1 || k > i64::from(retrieval.max_k) {
			return Err(ServiceError::InvalidRequest {
				message: format!("k must be between 1 and {}.", retrieval.max_k),
			});
		}

		let distance = self
			.distance_function
			.as_deref()
			.unwrap_or(retrieval.default_distance_function.as_str())
			.parse::<DistanceFunction>()?;

		Ok(ValidRequest { query: query.to_string(), k: k as u32, distance })
	}
}

#[derive(Debug, Clone)]
pub(crate) struct ValidRequest {
	pub(crate) query: String,
	pub(crate) k: u32,
	pub(crate) distance: DistanceFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
	pub file_name: String,
	pub rule_number: Option<i32>,
	pub rule_title: Option<String>,
	pub section_title: Option<String>,
	pub chapter_title: Option<String>,
	/// Offset of the fragment within its rule text.
	pub start_char: i32,
	pub end_char: i32,
	/// Length of the fragment text in characters.
	pub text_length: i32,
	pub rule_id: i64,
	pub chunk_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrieveResult {
	pub text: String,
	pub embedding: Vec<f32>,
	pub metadata: ResultMetadata,
	/// The fused RRF score.
	pub similarity_score: f64,
}
impl RetrieveResult {
	fn assemble(fragment: Fragment, fused_score: f64) -> ServiceResult<Self> {
		let Some(rule) = fragment.rule else {
			return Err(ServiceError::Integrity {
				message: format!(
					"Chunk {} references rule {} which does not exist.",
					fragment.chunk_id, fragment.rule_id
				),
			});
		};
		let Some(embedding) = fragment.embedding else {
			return Err(ServiceError::Integrity {
				message: format!("Chunk {} no longer has an embedding.", fragment.chunk_id),
			});
		};
		let text_length = fragment.text.chars().count() as i32;

		Ok(Self {
			text: fragment.text,
			embedding,
			metadata: ResultMetadata {
				file_name: rule.file,
				rule_number: rule.rule_number,
				rule_title: rule.rule_title,
				section_title: rule.section_title,
				chapter_title: rule.chapter_title,
				start_char: fragment.char_start,
				end_char: fragment.char_end,
				text_length,
				rule_id: fragment.rule_id,
				chunk_id: fragment.chunk_id,
			},
			similarity_score: fused_score,
		})
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResponse {
	pub results: Vec<RetrieveResult>,
	pub total_results: usize,
	pub query: String,
	pub distance_function: String,
}
impl RetrieveResponse {
	pub(crate) fn new(results: Vec<RetrieveResult>, request: &ValidRequest) -> Self {
		Self {
			total_results: results.len(),
			results,
			query: request.query.clone(),
			distance_function: request.distance.fused_label(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedResponse {
	pub text: String,
	pub embedding: Vec<f32>,
	pub dimension: usize,
}

impl PravoService {
	/// Top `k` fragments by reciprocal rank fusion of vector and full-text candidates.
	pub async fn retrieve_chunks(&self, req: RetrieveRequest) -> ServiceResult<RetrieveResponse> {
		let req = req.validate(&self.cfg.retrieval)?;

		tracing::info!(
			query = %log_preview(&req.query),
			k = req.k,
			distance = %req.distance,
			"Retrieving chunks."
		);

		let results = self
			.with_deadline("Chunk retrieval", self.retrieve_fragments(&req.query, req.k, req.distance))
			.await?;

		Ok(RetrieveResponse::new(results, &req))
	}

	pub async fn embed(&self, text: &str) -> ServiceResult<EmbedResponse> {
		let text = text.trim();

		if text.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "text must be a non-empty string.".to_string(),
			});
		}

		let embedding = self.with_deadline("Embedding", self.embed_text(text)).await?;

		Ok(EmbedResponse { text: text.to_string(), dimension: embedding.len(), embedding })
	}

	pub(crate) async fn retrieve_fragments(
		&self,
		query: &str,
		k_final: u32,
		distance: DistanceFunction,
	) -> ServiceResult<Vec<RetrieveResult>> {
		let retrieval = &self.cfg.retrieval;
		let query_vec = self.embed_text(query).await?;
		let candidate_limit = fusion::candidate_limit(
			k_final,
			retrieval.oversample_multiplier,
			retrieval.oversample_floor,
		);
		let fused = self
			.corpus
			.fused_candidates(CandidateQuery {
				query_text: query,
				query_vec: &query_vec,
				distance,
				candidate_limit,
				rrf_k: retrieval.rrf_k,
				limit: k_final,
			})
			.await?;

		tracing::debug!(candidate_limit, fused = fused.len(), "Fused candidate lists.");

		self.assemble(&fused).await
	}

	/// Joins fused ids back to fragments, preserving fusion order.
	async fn assemble(&self, fused: &[FusedRow]) -> ServiceResult<Vec<RetrieveResult>> {
		if fused.is_empty() {
			return Ok(Vec::new());
		}

		let ids = fused.iter().map(|row| row.chunk_id).collect::<Vec<_>>();
		let mut fragments = self
			.corpus
			.fetch_fragments(&ids)
			.await?
			.into_iter()
			.map(|fragment| (fragment.chunk_id, fragment))
			.collect::<HashMap<_, _>>();
		let mut results = Vec::with_capacity(fused.len());

		for row in fused {
			let Some(fragment) = fragments.remove(&row.chunk_id) else {
				return Err(ServiceError::Integrity {
					message: format!("Fused chunk {} no longer resolves.", row.chunk_id),
				});
			};

			results.push(RetrieveResult::assemble(fragment, row.fused_score)?);
		}

		Ok(results)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::corpus::RuleMetadata;

	fn retrieval() -> Retrieval {
		Retrieval::default()
	}

	#[test]
	fn validation_trims_query_and_applies_defaults() {
		let req = RetrieveRequest { query: "  трудовой договор  ".to_string(), ..Default::default() };
		let valid = req.validate(&retrieval()).expect("Request must validate.");

		assert_eq!(valid.query, "трудовой договор");
		assert_eq!(valid.k, 5);
		assert_eq!(valid.distance, DistanceFunction::Cosine);
	}

	#[test]
	fn validation_rejects_blank_query() {
		let req = RetrieveRequest { query: " \t\n".to_string(), ..Default::default() };
		let err = req.validate(&retrieval()).expect_err("Expected blank query error.");

		assert!(matches!(err, ServiceError::InvalidRequest { .. }));
	}

	#[test]
	fn validation_bounds_k() {
		for k in [0, -3, 21] {
			let req = RetrieveRequest::new("q", k, DistanceFunction::L2);
			let err = req.validate(&retrieval()).expect_err("Expected k bounds error.");

			assert!(err.to_string().contains("k must be between 1 and 20."), "Unexpected: {err}");
		}

		assert!(RetrieveRequest::new("q", 20, DistanceFunction::L2).validate(&retrieval()).is_ok());
	}

	#[test]
	fn validation_rejects_unknown_distance_function() {
		let req = RetrieveRequest {
			query: "q".to_string(),
			k: Some(3),
			distance_function: Some("dot".to_string()),
		};

		assert!(req.validate(&retrieval()).is_err());
	}

	fn fragment(rule: Option<RuleMetadata>, embedding: Option<Vec<f32>>) -> Fragment {
		Fragment {
			chunk_id: 9,
			rule_id: 4,
			text: "Статья".to_string(),
			char_start: 100,
			char_end: 106,
			embedding,
			rule,
		}
	}

	fn metadata() -> RuleMetadata {
		RuleMetadata {
			file: "tk_rf.txt".to_string(),
			rule_number: Some(81),
			rule_title: Some("Termination".to_string()),
			section_title: None,
			chapter_title: None,
		}
	}

	#[test]
	fn assembled_result_carries_fragment_offsets_and_char_length() {
		let result = RetrieveResult::assemble(fragment(Some(metadata()), Some(vec![0.5])), 0.03)
			.expect("Fragment must assemble.");

		assert_eq!(result.metadata.file_name, "tk_rf.txt");
		assert_eq!(result.metadata.start_char, 100);
		assert_eq!(result.metadata.end_char, 106);
		assert_eq!(result.metadata.text_length, 6);
		assert_eq!(result.similarity_score, 0.03);
	}

	#[test]
	fn missing_rule_is_an_integrity_error() {
		let err = RetrieveResult::assemble(fragment(None, Some(vec![0.5])), 0.03)
			.expect_err("Expected integrity error.");

		assert!(matches!(err, ServiceError::Integrity { .. }));
	}

	#[test]
	fn missing_embedding_is_an_integrity_error() {
		let err = RetrieveResult::assemble(fragment(Some(metadata()), None), 0.03)
			.expect_err("Expected integrity error.");

		assert!(matches!(err, ServiceError::Integrity { .. }));
	}
}
