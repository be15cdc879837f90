//! An in-process corpus: brute-force vector search plus a tantivy RAM index for full text.

use std::{
	collections::{HashMap, HashSet},
	fs,
	path::Path,
	sync::Arc,
};

use serde::{Deserialize, Serialize};
use tantivy::{
	Index, IndexReader, IndexWriter, TantivyDocument,
	collector::TopDocs,
	doc,
	query::QueryParser,
	schema::{
		Field, INDEXED, IndexRecordOption, STORED, Schema, TextFieldIndexing, TextOptions, Value,
	},
	tokenizer::{
		Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter,
		TextAnalyzer,
	},
};

use pravo_storage::{
	models::{CandidateRow, Rule},
	queries,
};

use crate::{
	BoxFuture, DistanceFunction, ServiceError, ServiceResult,
	corpus::{Corpus, Fragment, LabeledChunk, RuleMetadata},
	fusion, parse_pg_vector,
};

const ANALYZER: &str = "legal_text";
const WRITER_MEMORY_BYTES: usize = 20_000_000;

/// A chunk as exported in a corpus snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChunk {
	pub chunk_id: i64,
	pub rule_id: i64,
	pub chunk_number: i32,
	pub chunk_text: String,
	pub chunk_char_start: i32,
	pub chunk_char_end: i32,
	#[serde(default)]
	pub embedding: Option<Vec<f32>>,
}

/// Rules and chunks of a whole corpus, serialisable as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
	pub rules: Vec<Rule>,
	pub chunks: Vec<SnapshotChunk>,
}
impl CorpusSnapshot {
	pub fn from_path(path: &Path) -> ServiceResult<Self> {
		let raw = fs::read_to_string(path).map_err(|err| ServiceError::Storage {
			message: format!("Failed to read corpus snapshot at {path:?}: {err}"),
		})?;

		serde_json::from_str(&raw).map_err(|err| ServiceError::Storage {
			message: format!("Failed to parse corpus snapshot at {path:?}: {err}"),
		})
	}

	/// Reads every rule and chunk from Postgres.
	pub async fn from_db(db: &pravo_storage::db::Db) -> ServiceResult<Self> {
		let rules = queries::all_rules(&db.pool).await?;
		let rows = queries::all_chunks(&db.pool).await?;
		let mut chunks = Vec::with_capacity(rows.len());

		for row in rows {
			chunks.push(SnapshotChunk {
				chunk_id: row.chunk_id,
				rule_id: row.rule_id,
				chunk_number: row.chunk_number,
				chunk_text: row.chunk_text,
				chunk_char_start: row.chunk_char_start,
				chunk_char_end: row.chunk_char_end,
				embedding: row.embedding.as_deref().map(parse_pg_vector).transpose()?,
			});
		}

		Ok(Self { rules, chunks })
	}
}

/// Rankings scan the whole corpus, so they run on the blocking pool where the request deadline
/// can still fire.
pub struct MemoryCorpus {
	inner: Arc<MemoryIndex>,
}

struct MemoryIndex {
	rules: HashMap<i64, Rule>,
	chunks: HashMap<i64, SnapshotChunk>,
	/// Chunk ids with an embedding, ascending.
	eligible: Vec<i64>,
	index: Index,
	reader: IndexReader,
	text_field: Field,
	id_field: Field,
}
impl MemoryCorpus {
	/// Builds the corpus, rejecting orphan chunks, duplicate ids and embeddings of the wrong
	/// dimension. `text_search_config` selects stop words and stemming like its Postgres namesake.
	pub fn build(
		snapshot: CorpusSnapshot,
		dimensions: u32,
		text_search_config: &str,
	) -> ServiceResult<Self> {
		let mut rules = HashMap::with_capacity(snapshot.rules.len());

		for rule in snapshot.rules {
			let rule_id = rule.rule_id;

			if rules.insert(rule_id, rule).is_some() {
				return Err(ServiceError::Integrity {
					message: format!("Duplicate rule_id {rule_id} in corpus snapshot."),
				});
			}
		}

		let mut chunks = HashMap::with_capacity(snapshot.chunks.len());
		let mut eligible = Vec::new();

		for chunk in snapshot.chunks {
			let chunk_id = chunk.chunk_id;

			if !rules.contains_key(&chunk.rule_id) {
				return Err(ServiceError::Integrity {
					message: format!(
						"Chunk {chunk_id} references missing rule_id {}.",
						chunk.rule_id
					),
				});
			}
			if let Some(embedding) = chunk.embedding.as_ref() {
				if embedding.len() != dimensions as usize {
					return Err(ServiceError::Integrity {
						message: format!(
							"Chunk {chunk_id} embedding has dimension {}, expected {dimensions}.",
							embedding.len()
						),
					});
				}

				eligible.push(chunk_id);
			}
			if chunks.insert(chunk_id, chunk).is_some() {
				return Err(ServiceError::Integrity {
					message: format!("Duplicate chunk_id {chunk_id} in corpus snapshot."),
				});
			}
		}

		eligible.sort_unstable();

		let mut schema_builder = Schema::builder();
		let text_options = TextOptions::default().set_indexing_options(
			TextFieldIndexing::default()
				.set_tokenizer(ANALYZER)
				.set_index_option(IndexRecordOption::WithFreqsAndPositions),
		);
		let text_field = schema_builder.add_text_field("chunk_text", text_options);
		let id_field = schema_builder.add_i64_field("chunk_id", INDEXED | STORED);
		let index = Index::create_in_ram(schema_builder.build());

		index.tokenizers().register(ANALYZER, analyzer(text_search_config));

		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;

		for chunk_id in &eligible {
			if let Some(chunk) = chunks.get(chunk_id) {
				writer.add_document(doc!(
					id_field => *chunk_id,
					text_field => chunk.chunk_text.as_str(),
				))?;
			}
		}

		writer.commit()?;

		let reader = index.reader()?;

		tracing::info!(
			rules = rules.len(),
			chunks = chunks.len(),
			eligible = eligible.len(),
			"Built in-memory corpus."
		);

		Ok(Self {
			inner: Arc::new(MemoryIndex {
				rules,
				chunks,
				eligible,
				index,
				reader,
				text_field,
				id_field,
			}),
		})
	}
}

impl MemoryIndex {
	fn rank_by_distance(
		&self,
		query_vec: &[f32],
		distance: DistanceFunction,
		limit: u32,
	) -> Vec<CandidateRow> {
		let mut scored = self
			.eligible
			.iter()
			.filter_map(|chunk_id| {
				let embedding = self.chunks.get(chunk_id)?.embedding.as_ref()?;
				let d = distance.distance(query_vec, embedding);

				// NaN sorts last, as in Postgres.
				Some((*chunk_id, if d.is_nan() { f64::INFINITY } else { d }))
			})
			.collect::<Vec<_>>();

		scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
		scored.truncate(limit as usize);

		fusion::ranked(scored)
	}

	fn rank_by_relevance(&self, query_text: &str, limit: u32) -> ServiceResult<Vec<CandidateRow>> {
		let searcher = self.reader.searcher();
		let total = searcher.num_docs() as usize;

		if total == 0 || limit == 0 {
			return Ok(Vec::new());
		}

		let mut parser = QueryParser::for_index(&self.index, vec![self.text_field]);

		// Every term must match, like `websearch_to_tsquery`.
		parser.set_conjunction_by_default();

		let (query, _errors) = parser.parse_query_lenient(query_text);
		let hits = searcher.search(&query, &TopDocs::with_limit(total))?;
		let mut scored = Vec::with_capacity(hits.len());

		for (score, address) in hits {
			let doc: TantivyDocument = searcher.doc(address)?;
			let Some(chunk_id) = doc.get_first(self.id_field).and_then(|v| v.as_i64()) else {
				return Err(ServiceError::Integrity {
					message: "Full-text hit has no chunk_id.".to_string(),
				});
			};

			scored.push((chunk_id, f64::from(score)));
		}

		scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		scored.truncate(limit as usize);

		Ok(fusion::ranked(scored))
	}
}

impl Corpus for MemoryCorpus {
	fn vector_candidates<'a>(
		&'a self,
		query_vec: &'a [f32],
		distance: DistanceFunction,
		limit: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<CandidateRow>>> {
		let inner = self.inner.clone();
		let query_vec = query_vec.to_vec();

		Box::pin(async move {
			let rows = tokio::task::spawn_blocking(move || {
				inner.rank_by_distance(&query_vec, distance, limit)
			})
			.await?;

			Ok(rows)
		})
	}

	fn lexical_candidates<'a>(
		&'a self,
		query_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, ServiceResult<Vec<CandidateRow>>> {
		let inner = self.inner.clone();
		let query_text = query_text.to_string();

		Box::pin(async move {
			tokio::task::spawn_blocking(move || inner.rank_by_relevance(&query_text, limit)).await?
		})
	}

	fn fetch_fragments<'a>(
		&'a self,
		chunk_ids: &'a [i64],
	) -> BoxFuture<'a, ServiceResult<Vec<Fragment>>> {
		Box::pin(async move {
			let mut seen = HashSet::new();

			Ok(chunk_ids
				.iter()
				.filter(|chunk_id| seen.insert(**chunk_id))
				.filter_map(|chunk_id| self.inner.chunks.get(chunk_id))
				.map(|chunk| Fragment {
					chunk_id: chunk.chunk_id,
					rule_id: chunk.rule_id,
					text: chunk.chunk_text.clone(),
					char_start: chunk.chunk_char_start,
					char_end: chunk.chunk_char_end,
					embedding: chunk.embedding.clone(),
					rule: self.inner.rules.get(&chunk.rule_id).map(|rule| RuleMetadata {
						file: rule.file.clone(),
						rule_number: rule.rule_number,
						rule_title: rule.rule_title.clone(),
						section_title: rule.section_title.clone(),
						chapter_title: rule.chapter_title.clone(),
					}),
				})
				.collect())
		})
	}

	fn labeled_chunks<'a>(&'a self) -> BoxFuture<'a, ServiceResult<Vec<LabeledChunk>>> {
		Box::pin(async move {
			let inner = &self.inner;

			Ok(inner
				.eligible
				.iter()
				.filter_map(|chunk_id| {
					let chunk = inner.chunks.get(chunk_id)?;

					Some(LabeledChunk {
						chunk_id: *chunk_id,
						embedding: chunk.embedding.clone()?,
						file: inner.rules.get(&chunk.rule_id).map(|rule| rule.file.clone()),
					})
				})
				.collect())
		})
	}

	fn ping<'a>(&'a self) -> BoxFuture<'a, ServiceResult<()>> {
		Box::pin(async { Ok(()) })
	}
}

/// Maps a Postgres text search configuration name onto a Snowball language.
fn snowball_language(text_search_config: &str) -> Option<Language> {
	match text_search_config {
		"danish" => Some(Language::Danish),
		"dutch" => Some(Language::Dutch),
		"english" => Some(Language::English),
		"finnish" => Some(Language::Finnish),
		"french" => Some(Language::French),
		"german" => Some(Language::German),
		"hungarian" => Some(Language::Hungarian),
		"italian" => Some(Language::Italian),
		"norwegian" => Some(Language::Norwegian),
		"portuguese" => Some(Language::Portuguese),
		"russian" => Some(Language::Russian),
		"spanish" => Some(Language::Spanish),
		"swedish" => Some(Language::Swedish),
		_ => None,
	}
}

fn analyzer(text_search_config: &str) -> TextAnalyzer {
	let language = snowball_language(text_search_config);

	match language.and_then(|language| StopWordFilter::new(language).map(|stop| (language, stop))) {
		Some((language, stop_words)) => TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(RemoveLongFilter::limit(40))
			.filter(LowerCaser)
			.filter(stop_words)
			.filter(Stemmer::new(language))
			.build(),
		None => TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(RemoveLongFilter::limit(40))
			.filter(LowerCaser)
			.build(),
	}
}
