//! Rule-level retrieval: fragments regrouped into unique rules.

use std::collections::{HashMap, hash_map::Entry};

use crate::{
	PravoService, RetrieveRequest, RetrieveResponse, RetrieveResult, ServiceResult, log_preview,
};

impl PravoService {
	/// Top `k` unique rules, each represented by its best-scoring fragment.
	///
	/// Fragments are oversampled by `retrieval.rule_oversample_factor`. When fewer unique rules
	/// remain the response is shorter; there is no second query.
	pub async fn retrieve_rules(&self, req: RetrieveRequest) -> ServiceResult<RetrieveResponse> {
		let req = req.validate(&self.cfg.retrieval)?;
		let k_fragments = req.k.saturating_mul(self.cfg.retrieval.rule_oversample_factor);

		tracing::info!(
			query = %log_preview(&req.query),
			k = req.k,
			k_fragments,
			distance = %req.distance,
			"Retrieving rules."
		);

		let fragments = self
			.with_deadline(
				"Rule retrieval",
				self.retrieve_fragments(&req.query, k_fragments, req.distance),
			)
			.await?;
		let fragment_count = fragments.len();
		let results = best_per_rule(fragments, req.k as usize);

		tracing::debug!(fragments = fragment_count, rules = results.len(), "Aggregated rules.");

		Ok(RetrieveResponse::new(results, &req))
	}
}

/// Keeps the highest-scoring fragment of every rule, sorted by score descending.
///
/// The sort is stable, so rules with equal scores keep the fused order of their best fragment.
pub fn best_per_rule(fragments: Vec<RetrieveResult>, k: usize) -> Vec<RetrieveResult> {
	let mut best: Vec<RetrieveResult> = Vec::new();
	let mut slot_by_rule: HashMap<i64, usize> = HashMap::new();

	for fragment in fragments {
		match slot_by_rule.entry(fragment.metadata.rule_id) {
			Entry::Occupied(slot) => {
				let current = &mut best[*slot.get()];

				if fragment.similarity_score > current.similarity_score {
					*current = fragment;
				}
			},
			Entry::Vacant(slot) => {
				slot.insert(best.len());
				best.push(fragment);
			},
		}
	}

	best.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
	best.truncate(k);

	best
}

/// Renders rule results as the numbered context block handed to the chat model.
///
/// Returns an empty string when there is nothing to render.
pub fn format_rules_for_llm(response: &RetrieveResponse) -> String {
	if response.results.is_empty() {
		return String::new();
	}

	let mut parts = vec!["=== RELEVANT LEGAL RULES ===".to_string()];

	for (i, rule) in response.results.iter().enumerate() {
		let n = i + 1;
		let metadata = &rule.metadata;
		let file_name = metadata.file_name.as_str();

		match metadata.rule_title.as_deref().filter(|title| !title.is_empty()) {
			Some(title) => {
				parts.push(format!("\n{n}. {title}"));

				if !file_name.is_empty() {
					parts.push(format!("   Source: {file_name}"));
				}

				parts.push(format!("   Content: {}", rule.text));
			},
			None => {
				parts.push(format!("\n{n}. {}", rule.text));

				if !file_name.is_empty() {
					parts.push(format!("   Source: {file_name}"));
				}
			},
		}
	}

	parts.join("\n")
}
