//! End-to-end retrieval against Postgres with pgvector.

use std::sync::Arc;

use serde_json::Map;

use pravo_config::{
	Config, EmbeddingProviderConfig, Postgres, Providers as ProviderConfigs, Retrieval, Service,
	Storage,
};
use pravo_service::{
	BoxFuture, Corpus, CorpusSnapshot, DistanceFunction, EmbeddingProvider, MemoryCorpus,
	PgCorpus, PravoService, Providers, RetrieveRequest, RetrieveResponse, Strategy,
};
use pravo_storage::{
	db::Db,
	models::{Rule, RuleChunkRow},
	queries,
};
use pravo_testkit::TestDatabase;

const DIM: u32 = 3;

struct FixedEmbedding(Vec<f32>);
impl EmbeddingProvider for FixedEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		let vec = self.0.clone();

		Box::pin(async move { Ok(vec![vec; texts.len()]) })
	}
}

fn test_config(dsn: &str, strategy: &str) -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		storage: Storage {
			backend: "postgres".to_string(),
			postgres: Some(Postgres { dsn: dsn.to_string(), pool_max_conns: 2 }),
			snapshot: None,
		},
		providers: ProviderConfigs {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/embeddings".to_string(),
				model: "test".to_string(),
				dimensions: DIM,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		retrieval: Retrieval {
			strategy: strategy.to_string(),
			text_search_config: "english".to_string(),
			..Retrieval::default()
		},
	}
}

fn rule(rule_id: i64, file: &str) -> Rule {
	Rule {
		rule_id,
		file: file.to_string(),
		rule_number: Some(rule_id as i32),
		rule_title: Some(format!("Article {rule_id}")),
		rule_text: "Full text of the article.".to_string(),
		section_title: Some("General provisions".to_string()),
		chapter_title: None,
		start_char: 0,
		end_char: 25,
		text_length: 25,
		created_at: None,
		updated_at: None,
	}
}

fn chunk(chunk_id: i64, rule_id: i64, text: &str, embedding: Option<&str>) -> RuleChunkRow {
	RuleChunkRow {
		chunk_id,
		rule_id,
		chunk_number: 0,
		chunk_text: text.to_string(),
		chunk_char_start: 0,
		chunk_char_end: text.chars().count() as i32,
		embedding: embedding.map(str::to_string),
		created_at: None,
		updated_at: None,
	}
}

async fn seeded_db(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(DIM, "english").await.expect("Failed to ensure schema.");

	for rule in [rule(1, "civil.txt"), rule(2, "labor.txt"), rule(3, "tax.txt")] {
		queries::insert_rule(&db.pool, &rule).await.expect("Failed to insert rule.");
	}

	let chunks = [
		chunk(1, 1, "contract termination by agreement", Some("[1,0,0]")),
		chunk(2, 1, "contract termination by court order", Some("[0.9,0.1,0]")),
		chunk(3, 2, "employment contract and overtime", Some("[0,1,0]")),
		chunk(4, 3, "tax on property", Some("[0.5,0.5,0]")),
		chunk(5, 3, "contract termination tax", None),
	];

	for chunk in &chunks {
		queries::insert_chunk(&db.pool, chunk).await.expect("Failed to insert chunk.");
	}

	db
}

async fn retrieve(dsn: &str, strategy: &str, request: RetrieveRequest) -> RetrieveResponse {
	let cfg = test_config(dsn, strategy);
	let db = Db::connect(cfg.storage.postgres.as_ref().expect("Postgres config is set."))
		.await
		.expect("Failed to connect to Postgres.");
	let corpus = PgCorpus::new(
		db,
		strategy.parse::<Strategy>().expect("Strategy must parse."),
		cfg.retrieval.text_search_config.clone(),
	);
	let service = PravoService::with_providers(
		cfg,
		Arc::new(corpus),
		Providers::new(Arc::new(FixedEmbedding(vec![1.0, 0.0, 0.0]))),
	);

	service.retrieve_chunks(request).await.expect("Retrieval must succeed.")
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRAVO_PG_DSN to run."]
async fn pushdown_and_in_process_fusion_agree() {
	let Some(base_dsn) = pravo_testkit::env_dsn() else {
		eprintln!("Skipping pushdown_and_in_process_fusion_agree; set PRAVO_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let _db = seeded_db(&test_db).await;
	let request = RetrieveRequest::new("contract termination", 4, DistanceFunction::L2);
	let pushdown = retrieve(test_db.dsn(), "pushdown", request.clone()).await;
	let in_process = retrieve(test_db.dsn(), "in_process", request).await;
	let ids = |response: &RetrieveResponse| {
		response.results.iter().map(|r| r.metadata.chunk_id).collect::<Vec<_>>()
	};

	assert_eq!(ids(&pushdown), vec![1, 2, 4, 3]);
	assert_eq!(ids(&pushdown), ids(&in_process));

	for (a, b) in pushdown.results.iter().zip(&in_process.results) {
		assert!((a.similarity_score - b.similarity_score).abs() < 1e-12);
	}

	assert_eq!(pushdown.results[0].metadata.file_name, "civil.txt");
	assert_eq!(pushdown.results[0].embedding, vec![1.0, 0.0, 0.0]);
	assert_eq!(pushdown.distance_function, "rrf(bm25+l2)");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRAVO_PG_DSN to run."]
async fn vector_candidates_follow_metric_conventions() {
	let Some(base_dsn) = pravo_testkit::env_dsn() else {
		eprintln!("Skipping vector_candidates_follow_metric_conventions; set PRAVO_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = seeded_db(&test_db).await;
	let corpus = PgCorpus::new(db, Strategy::InProcess, "english");
	let query = [0.0, 2.0, 0.0];
	let l2 = corpus
		.vector_candidates(&query, DistanceFunction::L2, 10)
		.await
		.expect("L2 candidates must load.");
	let cosine = corpus
		.vector_candidates(&query, DistanceFunction::Cosine, 10)
		.await
		.expect("Cosine candidates must load.");

	// L2 from [0,2,0]: 3 -> 1.0, 4 -> ~1.58, 2 -> ~2.09, 1 -> ~2.24.
	assert_eq!(l2.iter().map(|row| row.chunk_id).collect::<Vec<_>>(), vec![3, 4, 2, 1]);
	assert!(l2.windows(2).all(|pair| pair[0].score <= pair[1].score));
	// Cosine similarity: 3 -> 1.0, 4 -> ~0.71, 2 -> ~0.11, 1 -> 0.
	assert_eq!(cosine.iter().map(|row| row.chunk_id).collect::<Vec<_>>(), vec![3, 4, 2, 1]);
	assert!(cosine.iter().all(|row| row.chunk_id != 5));
	assert_eq!(cosine.iter().map(|row| row.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRAVO_PG_DSN to run."]
async fn corpus_without_embeddings_returns_nothing() {
	let Some(base_dsn) = pravo_testkit::env_dsn() else {
		eprintln!("Skipping corpus_without_embeddings_returns_nothing; set PRAVO_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(DIM, "english").await.expect("Failed to ensure schema.");
	queries::insert_rule(&db.pool, &rule(1, "civil.txt")).await.expect("Failed to insert rule.");
	queries::insert_chunk(&db.pool, &chunk(1, 1, "contract", None))
		.await
		.expect("Failed to insert chunk.");

	for strategy in ["pushdown", "in_process"] {
		let response = retrieve(
			test_db.dsn(),
			strategy,
			RetrieveRequest::new("contract", 5, DistanceFunction::Cosine),
		)
		.await;

		assert_eq!(response.total_results, 0, "Strategy {strategy} returned results.");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PRAVO_PG_DSN to run."]
async fn snapshot_from_postgres_builds_memory_corpus() {
	let Some(base_dsn) = pravo_testkit::env_dsn() else {
		eprintln!("Skipping snapshot_from_postgres_builds_memory_corpus; set PRAVO_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = seeded_db(&test_db).await;
	let snapshot = CorpusSnapshot::from_db(&db).await.expect("Snapshot must load.");

	assert_eq!(snapshot.rules.len(), 3);
	assert_eq!(snapshot.chunks.len(), 5);
	assert!(snapshot.rules.iter().all(|rule| rule.created_at.is_some()));

	let corpus = MemoryCorpus::build(snapshot, DIM, "english").expect("Corpus must build.");
	let labeled = corpus.labeled_chunks().await.expect("Labels must load.");

	assert_eq!(labeled.len(), 4);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
