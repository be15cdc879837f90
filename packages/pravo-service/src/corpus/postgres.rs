use pravo_storage::{
	db::Db,
	models::{CandidateRow, FragmentRow, FusedRow},
	queries::{self, FusedQuery},
};

use crate::{
	BoxFuture, DistanceFunction, ServiceResult,
	corpus::{self, CandidateQuery, Corpus, Fragment, LabeledChunk, RuleMetadata, Strategy},
	parse_pg_vector, vector_to_pg,
};

/// A corpus stored in Postgres with pgvector and a generated `tsvector` column.
pub struct PgCorpus {
	pub db: Db,
	pub strategy: Strategy,
	pub text_search_config: String,
}
impl PgCorpus {
	pub fn new(db: Db, strategy: Strategy, text_search_config: impl Into<String>) -> Self {
		Self { db, strategy, text_search_config: text_search_config.into() }
	}

	async fn pushdown(&self, query: CandidateQuery<'_>) -> ServiceResult<Vec<FusedRow>> {
		let query_vec = vector_to_pg(query.query_vec);
		let rows = queries::fused_candidates(
			&self.db.pool,
			FusedQuery {
				query_vec: &query_vec,
				query_text: query.query_text,
				distance_operator: query.distance.operator(),
				text_search_config: &self.text_search_config,
				vector_limit: i64::from(query.candidate_limit),
				lexical_limit: i64::from(query.candidate_limit),
				rrf_k: query.rrf_k,
				limit: i64::from(query.limit),
			},
		)
		.await?;

		tracing::debug!(fused = rows.len(), "Fused candidates in Postgres.");

		Ok(rows)
	}
}

impl Corpus for PgCorpus {
	fn vector_candidates<'a>(
		&'a self,
		query_vec: &'a [f32],
		distance: DistanceFunction,
		limit: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<CandidateRow>>> {
		Box::pin(async move {
			let query_vec = vector_to_pg(query_vec);
			let rows = queries::vector_candidates(
				&self.db.pool,
				&query_vec,
				distance.operator(),
				i64::from(limit),
			)
			.await?;

			Ok(rows)
		})
	}

	fn lexical_candidates<'a>(
		&'a self,
		query_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<CandidateRow>>> {
		Box::pin(async move {
			let rows = queries::lexical_candidates(
				&self.db.pool,
				query_text,
				&self.text_search_config,
				i64::from(limit),
			)
			.await?;

			Ok(rows)
		})
	}

	fn fused_candidates<'a>(
		&'a self,
		query: CandidateQuery<'a>,
	) -> BoxFuture<'a, ServiceResult<Vec<FusedRow>>> {
		match self.strategy {
			Strategy::Pushdown => Box::pin(self.pushdown(query)),
			Strategy::InProcess => Box::pin(corpus::fuse_in_process(self, query)),
		}
	}

	fn fetch_fragments<'a>(
		&'a self,
		chunk_ids: &'a [i64],
	) -> BoxFuture<'a, ServiceResult<Vec<Fragment>>> {
		Box::pin(async move {
			let rows = queries::fragments_by_ids(&self.db.pool, chunk_ids).await?;

			rows.into_iter().map(fragment_from_row).collect()
		})
	}

	fn labeled_chunks<'a>(&'a self) -> BoxFuture<'a, ServiceResult<Vec<LabeledChunk>>> {
		Box::pin(async move {
			let rows = queries::labeled_embeddings(&self.db.pool).await?;

			rows.into_iter()
				.map(|row| {
					Ok(LabeledChunk {
						chunk_id: row.chunk_id,
						embedding: parse_pg_vector(&row.embedding)?,
						file: row.file,
					})
				})
				.collect()
		})
	}

	fn ping<'a>(&'a self) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async move {
			self.db.ping().await?;

			Ok(())
		})
	}
}

fn fragment_from_row(row: FragmentRow) -> ServiceResult<Fragment> {
	let embedding = row.embedding.as_deref().map(parse_pg_vector).transpose()?;
	let rule = match (row.joined_rule_id, row.file) {
		(Some(_), Some(file)) => Some(RuleMetadata {
			file,
			rule_number: row.rule_number,
			rule_title: row.rule_title,
			section_title: row.section_title,
			chapter_title: row.chapter_title,
		}),
		_ => None,
	};

	Ok(Fragment {
		chunk_id: row.chunk_id,
		rule_id: row.rule_id,
		text: row.chunk_text,
		char_start: row.chunk_char_start,
		char_end: row.chunk_char_end,
		embedding,
		rule,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(joined_rule_id: Option<i64>) -> FragmentRow {
		FragmentRow {
			chunk_id: 10,
			rule_id: 3,
			chunk_text: "text".to_string(),
			chunk_char_start: 0,
			chunk_char_end: 4,
			embedding: Some("[1,0]".to_string()),
			joined_rule_id,
			file: joined_rule_id.map(|_| "civil.txt".to_string()),
			rule_number: Some(3),
			rule_title: None,
			section_title: None,
			chapter_title: None,
		}
	}

	#[test]
	fn joined_rows_carry_rule_metadata() {
		let fragment = fragment_from_row(row(Some(3))).expect("Row must convert.");

		assert_eq!(fragment.embedding, Some(vec![1.0, 0.0]));
		assert_eq!(fragment.rule.expect("Rule must be present.").file, "civil.txt");
	}

	#[test]
	fn rows_without_rule_have_no_metadata() {
		let fragment = fragment_from_row(row(None)).expect("Row must convert.");

		assert!(fragment.rule.is_none());
	}
}
