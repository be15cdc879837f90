//! Reciprocal rank fusion.
//!
//! `score(id) = Σ 1 / (rrf_k + rank)` over every candidate list that contains `id`, with 1-based
//! ranks. The fused list is ordered by score descending, then by ascending chunk id.

use std::{cmp::Ordering, collections::BTreeMap};

use pravo_storage::models::{CandidateRow, FusedRow};

/// Size of each candidate list for a request of `k_final` results.
pub fn candidate_limit(k_final: u32, multiplier: u32, floor: u32) -> u32 {
	k_final.saturating_mul(multiplier).max(floor)
}

/// Fuses candidate lists and keeps the top `limit` entries.
///
/// Truncation happens only after every list has contributed.
pub fn reciprocal_rank_fusion(lists: &[&[CandidateRow]], rrf_k: f64, limit: usize) -> Vec<FusedRow> {
	let mut scores: BTreeMap<i64, f64> = BTreeMap::new();

	for list in lists {
		for candidate in list.iter() {
			*scores.entry(candidate.chunk_id).or_insert(0.0) += 1.0 / (rrf_k + candidate.rank as f64);
		}
	}

	let mut fused = scores
		.into_iter()
		.map(|(chunk_id, fused_score)| FusedRow { chunk_id, fused_score })
		.collect::<Vec<_>>();

	fused.sort_by(compare_fused);
	fused.truncate(limit);

	fused
}

/// Score descending, then chunk id ascending.
pub fn compare_fused(a: &FusedRow, b: &FusedRow) -> Ordering {
	b.fused_score.total_cmp(&a.fused_score).then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Turns an ordered id list into 1-based candidate rows.
pub fn ranked(ids: impl IntoIterator<Item = (i64, f64)>) -> Vec<CandidateRow> {
	ids.into_iter()
		.enumerate()
		.map(|(index, (chunk_id, score))| CandidateRow { chunk_id, rank: index as i64 + 1, score })
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	const A: i64 = 1;
	const B: i64 = 2;
	const C: i64 = 3;

	fn list(ids: &[i64]) -> Vec<CandidateRow> {
		ranked(ids.iter().map(|id| (*id, 0.0)))
	}

	fn ids(fused: &[FusedRow]) -> Vec<i64> {
		fused.iter().map(|row| row.chunk_id).collect()
	}

	#[test]
	fn oversampling_uses_floor_for_small_requests() {
		assert_eq!(candidate_limit(5, 10, 100), 100);
		assert_eq!(candidate_limit(20, 10, 100), 200);
		assert_eq!(candidate_limit(1, 10, 1), 10);
		assert_eq!(candidate_limit(u32::MAX, 10, 100), u32::MAX);
	}

	#[test]
	fn shared_candidates_outrank_single_list_candidates() {
		let vector = list(&[A, B, C]);
		let lexical = list(&[B, C, A]);
		let fused = reciprocal_rank_fusion(&[vector.as_slice(), lexical.as_slice()], 60.0, 10);

		assert_eq!(ids(&fused), vec![B, A, C]);

		let expected_b = 1.0 / 62.0 + 1.0 / 61.0;

		assert!((fused[0].fused_score - expected_b).abs() < 1e-12);
	}

	#[test]
	fn equal_scores_tie_break_by_ascending_id() {
		let x = 42;
		let y = 7;
		let vector = list(&[x]);
		let lexical = list(&[y]);
		let fused = reciprocal_rank_fusion(&[vector.as_slice(), lexical.as_slice()], 60.0, 10);

		assert_eq!(ids(&fused), vec![y, x]);
		assert_eq!(fused[0].fused_score, 1.0 / 61.0);
		assert_eq!(fused[1].fused_score, 1.0 / 61.0);
	}

	#[test]
	fn presence_in_both_lists_dominates_at_equal_rank() {
		let vector = list(&[A, B]);
		let lexical = list(&[A]);
		let fused = reciprocal_rank_fusion(&[vector.as_slice(), lexical.as_slice()], 60.0, 10);

		assert!(fused[0].fused_score > 1.0 / 61.0);
		assert_eq!(fused[0].chunk_id, A);
	}

	#[test]
	fn truncates_after_fusion_without_duplicates() {
		let vector = list(&[A, B, C]);
		let lexical = list(&[C, B, A]);
		let fused = reciprocal_rank_fusion(&[vector.as_slice(), lexical.as_slice()], 60.0, 2);

		assert_eq!(fused.len(), 2);
		assert_ne!(fused[0].chunk_id, fused[1].chunk_id);
		assert!(fused.iter().all(|row| row.fused_score.is_finite() && row.fused_score > 0.0));
	}

	#[test]
	fn empty_lists_fuse_to_nothing() {
		let empty: Vec<CandidateRow> = Vec::new();

		assert!(reciprocal_rank_fusion(&[empty.as_slice(), empty.as_slice()], 60.0, 5).is_empty());
	}
}
