//! Read queries for the retrieval path plus the seeding helpers used by tests.
//!
//! Vectors cross the wire in pgvector text form (`$1::text::vector` in, `embedding::text` out).
//! Every candidate list admits only chunks with a non-null embedding and breaks ties by
//! ascending `chunk_id`.

use sqlx::PgExecutor;

use crate::{
	Error, Result,
	models::{CandidateRow, FragmentRow, FusedRow, LabeledEmbeddingRow, Rule, RuleChunkRow},
};

/// Inputs of the single-statement fused query.
#[derive(Debug, Clone, Copy)]
pub struct FusedQuery<'a> {
	pub query_vec: &'a str,
	pub query_text: &'a str,
	pub distance_operator: &'static str,
	pub text_search_config: &'a str,
	pub vector_limit: i64,
	pub lexical_limit: i64,
	pub rrf_k: f64,
	pub limit: i64,
}

pub async fn vector_candidates<'e, E>(
	executor: E,
	query_vec: &str,
	distance_operator: &'static str,
	limit: i64,
) -> Result<Vec<CandidateRow>>
where
	E: PgExecutor<'e>,
{
	let operator = checked_operator(distance_operator)?;
	let sql = format!(
		"\
SELECT
	chunk_id,
	ROW_NUMBER() OVER (ORDER BY distance ASC, chunk_id ASC) AS rank,
	distance AS score
FROM (
	SELECT chunk_id, (embedding {operator} $1::text::vector)::float8 AS distance
	FROM rule_chunks
	WHERE embedding IS NOT NULL
	ORDER BY distance ASC, chunk_id ASC
	LIMIT $2
) AS nearest
ORDER BY rank"
	);
	let rows = sqlx::query_as(&sql).bind(query_vec).bind(limit).fetch_all(executor).await?;

	Ok(rows)
}

pub async fn lexical_candidates<'e, E>(
	executor: E,
	query_text: &str,
	text_search_config: &str,
	limit: i64,
) -> Result<Vec<CandidateRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT
	chunk_id,
	ROW_NUMBER() OVER (ORDER BY relevance DESC, chunk_id ASC) AS rank,
	relevance AS score
FROM (
	SELECT c.chunk_id, ts_rank_cd(c.search_vector, q.query)::float8 AS relevance
	FROM rule_chunks c, websearch_to_tsquery($2::regconfig, $1) AS q(query)
	WHERE c.embedding IS NOT NULL
		AND c.search_vector @@ q.query
	ORDER BY relevance DESC, c.chunk_id ASC
	LIMIT $3
) AS relevant
ORDER BY rank",
	)
	.bind(query_text)
	.bind(text_search_config)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Runs both candidate generators and the reciprocal rank fusion in one statement.
pub async fn fused_candidates<'e, E>(executor: E, query: FusedQuery<'_>) -> Result<Vec<FusedRow>>
where
	E: PgExecutor<'e>,
{
	let operator = checked_operator(query.distance_operator)?;
	let sql = format!(
		"\
WITH vector_candidates AS (
	SELECT chunk_id, ROW_NUMBER() OVER (ORDER BY distance ASC, chunk_id ASC) AS rank
	FROM (
		SELECT chunk_id, embedding {operator} $1::text::vector AS distance
		FROM rule_chunks
		WHERE embedding IS NOT NULL
		ORDER BY distance ASC, chunk_id ASC
		LIMIT $3
	) AS nearest
),
lexical_candidates AS (
	SELECT chunk_id, ROW_NUMBER() OVER (ORDER BY relevance DESC, chunk_id ASC) AS rank
	FROM (
		SELECT c.chunk_id, ts_rank_cd(c.search_vector, q.query) AS relevance
		FROM rule_chunks c, websearch_to_tsquery($5::regconfig, $2) AS q(query)
		WHERE c.embedding IS NOT NULL
			AND c.search_vector @@ q.query
		ORDER BY relevance DESC, c.chunk_id ASC
		LIMIT $4
	) AS relevant
),
candidates AS (
	SELECT chunk_id, rank FROM vector_candidates
	UNION ALL
	SELECT chunk_id, rank FROM lexical_candidates
)
SELECT chunk_id, SUM(1.0::float8 / ($6::float8 + rank))::float8 AS fused_score
FROM candidates
GROUP BY chunk_id
ORDER BY fused_score DESC, chunk_id ASC
LIMIT $7"
	);
	let rows = sqlx::query_as(&sql)
		.bind(query.query_vec)
		.bind(query.query_text)
		.bind(query.vector_limit)
		.bind(query.lexical_limit)
		.bind(query.text_search_config)
		.bind(query.rrf_k)
		.bind(query.limit)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Loads the given chunks with their rule metadata. Order of the result is unspecified.
pub async fn fragments_by_ids<'e, E>(executor: E, chunk_ids: &[i64]) -> Result<Vec<FragmentRow>>
where
	E: PgExecutor<'e>,
{
	if chunk_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as(
		"\
SELECT
	c.chunk_id,
	c.rule_id,
	c.chunk_text,
	c.chunk_char_start,
	c.chunk_char_end,
	c.embedding::text AS embedding,
	r.rule_id AS joined_rule_id,
	r.file,
	r.rule_number,
	r.rule_title,
	r.section_title,
	r.chapter_title
FROM rule_chunks c
LEFT JOIN rules r ON r.rule_id = c.rule_id
WHERE c.chunk_id = ANY($1)",
	)
	.bind(chunk_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn labeled_embeddings<'e, E>(executor: E) -> Result<Vec<LabeledEmbeddingRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT c.chunk_id, c.embedding::text AS embedding, r.file
FROM rule_chunks c
LEFT JOIN rules r ON r.rule_id = c.rule_id
WHERE c.embedding IS NOT NULL
ORDER BY c.chunk_id ASC",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn all_rules<'e, E>(executor: E) -> Result<Vec<Rule>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT
	rule_id,
	file,
	rule_number,
	rule_title,
	rule_text,
	section_title,
	chapter_title,
	start_char,
	end_char,
	text_length,
	created_at,
	updated_at
FROM rules
ORDER BY rule_id ASC",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn all_chunks<'e, E>(executor: E) -> Result<Vec<RuleChunkRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT
	chunk_id,
	rule_id,
	chunk_number,
	chunk_text,
	chunk_char_start,
	chunk_char_end,
	embedding::text AS embedding,
	created_at,
	updated_at
FROM rule_chunks
ORDER BY chunk_id ASC",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn insert_rule<'e, E>(executor: E, rule: &Rule) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO rules (
	rule_id,
	file,
	rule_number,
	rule_title,
	rule_text,
	section_title,
	chapter_title,
	start_char,
	end_char,
	text_length,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, now()), COALESCE($12, now()))",
	)
	.bind(rule.rule_id)
	.bind(rule.file.as_str())
	.bind(rule.rule_number)
	.bind(rule.rule_title.as_deref())
	.bind(rule.rule_text.as_str())
	.bind(rule.section_title.as_deref())
	.bind(rule.chapter_title.as_deref())
	.bind(rule.start_char)
	.bind(rule.end_char)
	.bind(rule.text_length)
	.bind(rule.created_at)
	.bind(rule.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn insert_chunk<'e, E>(executor: E, chunk: &RuleChunkRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO rule_chunks (
	chunk_id,
	rule_id,
	chunk_number,
	chunk_text,
	chunk_char_start,
	chunk_char_end,
	embedding,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7::text::vector, COALESCE($8, now()), COALESCE($9, now()))",
	)
	.bind(chunk.chunk_id)
	.bind(chunk.rule_id)
	.bind(chunk.chunk_number)
	.bind(chunk.chunk_text.as_str())
	.bind(chunk.chunk_char_start)
	.bind(chunk.chunk_char_end)
	.bind(chunk.embedding.as_deref())
	.bind(chunk.created_at)
	.bind(chunk.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

fn checked_operator(operator: &'static str) -> Result<&'static str> {
	match operator {
		"<->" | "<=>" => Ok(operator),
		other => Err(Error::InvalidArgument(format!("Unsupported vector operator {other:?}."))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_pgvector_distance_operators_are_interpolated() {
		assert_eq!(checked_operator("<->").expect("L2 operator must pass."), "<->");
		assert_eq!(checked_operator("<=>").expect("Cosine operator must pass."), "<=>");
		assert!(checked_operator("<#>").is_err());
		assert!(checked_operator("; DROP TABLE rules").is_err());
	}
}
