use std::sync::Arc;

use color_eyre::eyre;

use pravo_service::{Corpus, CorpusSnapshot, MemoryCorpus, PgCorpus, PravoService, Strategy};
use pravo_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<PravoService>,
}
impl AppState {
	/// Opens the configured corpus backend and wires it to the default query encoder.
	pub async fn new(config: pravo_config::Config) -> color_eyre::Result<Self> {
		let corpus = open_corpus(&config).await?;
		let service = PravoService::new(config, corpus);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: PravoService) -> Self {
		Self { service: Arc::new(service) }
	}
}

async fn open_corpus(config: &pravo_config::Config) -> color_eyre::Result<Arc<dyn Corpus>> {
	let dimensions = config.providers.embedding.dimensions;
	let retrieval = &config.retrieval;

	match config.storage.backend.as_str() {
		"postgres" => {
			let postgres = config
				.storage
				.postgres
				.as_ref()
				.ok_or_else(|| eyre::eyre!("storage.postgres is required."))?;
			let db = Db::connect(postgres).await?;

			db.ensure_schema(dimensions, &retrieval.text_search_config).await?;

			let strategy: Strategy = retrieval.strategy.parse()?;

			tracing::info!(strategy = %retrieval.strategy, "Serving corpus from Postgres.");

			Ok(Arc::new(PgCorpus::new(db, strategy, retrieval.text_search_config.as_str())))
		},
		"snapshot" => {
			let snapshot = config
				.storage
				.snapshot
				.as_ref()
				.ok_or_else(|| eyre::eyre!("storage.snapshot is required."))?;
			let corpus = MemoryCorpus::build(
				CorpusSnapshot::from_path(&snapshot.path)?,
				dimensions,
				&retrieval.text_search_config,
			)?;

			tracing::info!(path = %snapshot.path.display(), "Serving corpus from snapshot.");

			Ok(Arc::new(corpus))
		},
		other => Err(eyre::eyre!("Unknown storage backend {other:?}.")),
	}
}
