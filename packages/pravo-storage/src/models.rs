use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A legal provision (article) as parsed from a source code file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rule {
	pub rule_id: i64,
	pub file: String,
	pub rule_number: Option<i32>,
	pub rule_title: Option<String>,
	pub rule_text: String,
	pub section_title: Option<String>,
	pub chapter_title: Option<String>,
	pub start_char: i32,
	pub end_char: i32,
	pub text_length: i32,
	#[serde(default, with = "crate::time_serde")]
	pub created_at: Option<OffsetDateTime>,
	#[serde(default, with = "crate::time_serde")]
	pub updated_at: Option<OffsetDateTime>,
}

/// A fragment of a rule. The embedding is kept in pgvector text form (`[0.1,0.2]`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RuleChunkRow {
	pub chunk_id: i64,
	pub rule_id: i64,
	pub chunk_number: i32,
	pub chunk_text: String,
	pub chunk_char_start: i32,
	pub chunk_char_end: i32,
	pub embedding: Option<String>,
	pub created_at: Option<OffsetDateTime>,
	pub updated_at: Option<OffsetDateTime>,
}

/// One entry of a ranked candidate list. `rank` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct CandidateRow {
	pub chunk_id: i64,
	pub rank: i64,
	/// Metric distance for vector lists, `ts_rank_cd` relevance for lexical lists.
	pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct FusedRow {
	pub chunk_id: i64,
	pub fused_score: f64,
}

/// A chunk joined to its rule. Rule columns are `None` when the rule row is missing.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FragmentRow {
	pub chunk_id: i64,
	pub rule_id: i64,
	pub chunk_text: String,
	pub chunk_char_start: i32,
	pub chunk_char_end: i32,
	pub embedding: Option<String>,
	pub joined_rule_id: Option<i64>,
	pub file: Option<String>,
	pub rule_number: Option<i32>,
	pub rule_title: Option<String>,
	pub section_title: Option<String>,
	pub chapter_title: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LabeledEmbeddingRow {
	pub chunk_id: i64,
	pub embedding: String,
	pub file: Option<String>,
}
