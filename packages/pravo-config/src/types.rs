use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	/// Either "postgres" or "snapshot".
	pub backend: String,
	pub postgres: Option<Postgres>,
	pub snapshot: Option<Snapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// A JSON corpus export served from memory instead of Postgres.
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
	pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Fusion and sizing tunables for the retrieval engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	/// "pushdown" fuses inside a single SQL statement; "in_process" fuses in the service.
	#[serde(default = "default_strategy")]
	pub strategy: String,
	/// Postgres text search configuration, also used to pick the in-memory stemmer.
	#[serde(default = "default_text_search_config")]
	pub text_search_config: String,
	/// RRF damping constant `c` in `1 / (c + rank)`.
	#[serde(default = "default_rrf_k")]
	pub rrf_k: f64,
	#[serde(default = "default_oversample_multiplier")]
	pub oversample_multiplier: u32,
	#[serde(default = "default_oversample_floor")]
	pub oversample_floor: u32,
	/// Fragments requested per wanted rule by the rule-level retrieval.
	#[serde(default = "default_rule_oversample_factor")]
	pub rule_oversample_factor: u32,
	#[serde(default = "default_k")]
	pub default_k: u32,
	#[serde(default = "default_max_k")]
	pub max_k: u32,
	#[serde(default = "default_distance_function")]
	pub default_distance_function: String,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			strategy: default_strategy(),
			text_search_config: default_text_search_config(),
			rrf_k: default_rrf_k(),
			oversample_multiplier: default_oversample_multiplier(),
			oversample_floor: default_oversample_floor(),
			rule_oversample_factor: default_rule_oversample_factor(),
			default_k: default_k(),
			max_k: default_max_k(),
			default_distance_function: default_distance_function(),
			timeout_ms: default_timeout_ms(),
		}
	}
}

fn default_strategy() -> String {
	"pushdown".to_string()
}

fn default_text_search_config() -> String {
	"russian".to_string()
}

fn default_rrf_k() -> f64 {
	60.0
}

fn default_oversample_multiplier() -> u32 {
	10
}

fn default_oversample_floor() -> u32 {
	100
}

fn default_rule_oversample_factor() -> u32 {
	2
}

fn default_k() -> u32 {
	5
}

fn default_max_k() -> u32 {
	20
}

fn default_distance_function() -> String {
	"cosine".to_string()
}

fn default_timeout_ms() -> u64 {
	30_000
}
