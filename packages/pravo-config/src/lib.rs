mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Postgres, Providers, Retrieval, Service, Snapshot, Storage,
};

use std::{fs, net::SocketAddr, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.parse::<SocketAddr>().is_err() {
		return Err(Error::Validation {
			message: "service.http_bind must be a socket address.".to_string(),
		});
	}
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	validate_storage(cfg)?;

	let embedding = &cfg.providers.embedding;

	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}

	validate_retrieval(&cfg.retrieval)
}

pub fn validate_retrieval(retrieval: &Retrieval) -> Result<()> {
	if !matches!(retrieval.strategy.as_str(), "pushdown" | "in_process") {
		return Err(Error::Validation {
			message: "retrieval.strategy must be one of pushdown or in_process.".to_string(),
		});
	}
	if retrieval.text_search_config.is_empty()
		|| !retrieval.text_search_config.chars().all(|c| c.is_ascii_lowercase() || c == '_')
	{
		return Err(Error::Validation {
			message: "retrieval.text_search_config must contain only lowercase letters and underscores."
				.to_string(),
		});
	}
	if !retrieval.rrf_k.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.rrf_k must be a finite number.".to_string(),
		});
	}
	if retrieval.rrf_k <= 0.0 {
		return Err(Error::Validation {
			message: "retrieval.rrf_k must be greater than zero.".to_string(),
		});
	}
	if retrieval.oversample_multiplier == 0 {
		return Err(Error::Validation {
			message: "retrieval.oversample_multiplier must be greater than zero.".to_string(),
		});
	}
	if retrieval.oversample_floor == 0 {
		return Err(Error::Validation {
			message: "retrieval.oversample_floor must be greater than zero.".to_string(),
		});
	}
	if retrieval.rule_oversample_factor < 2 {
		return Err(Error::Validation {
			message: "retrieval.rule_oversample_factor must be at least 2.".to_string(),
		});
	}
	if retrieval.max_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_k must be greater than zero.".to_string(),
		});
	}
	if retrieval.default_k == 0 || retrieval.default_k > retrieval.max_k {
		return Err(Error::Validation {
			message: "retrieval.default_k must be between 1 and retrieval.max_k.".to_string(),
		});
	}
	if !matches!(retrieval.default_distance_function.as_str(), "l2" | "cosine") {
		return Err(Error::Validation {
			message: "retrieval.default_distance_function must be one of l2 or cosine."
				.to_string(),
		});
	}
	if retrieval.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "retrieval.timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_storage(cfg: &Config) -> Result<()> {
	match cfg.storage.backend.as_str() {
		"postgres" => {
			let Some(postgres) = cfg.storage.postgres.as_ref() else {
				return Err(Error::Validation {
					message: "storage.postgres is required when storage.backend is postgres."
						.to_string(),
				});
			};

			if postgres.dsn.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.postgres.dsn must be non-empty.".to_string(),
				});
			}
			if postgres.pool_max_conns == 0 {
				return Err(Error::Validation {
					message: "storage.postgres.pool_max_conns must be greater than zero."
						.to_string(),
				});
			}
		},
		"snapshot" =>
			if cfg.storage.snapshot.is_none() {
				return Err(Error::Validation {
					message: "storage.snapshot is required when storage.backend is snapshot."
						.to_string(),
				});
			},
		_ => {
			return Err(Error::Validation {
				message: "storage.backend must be one of postgres or snapshot.".to_string(),
			});
		},
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.retrieval.strategy = cfg.retrieval.strategy.trim().to_ascii_lowercase();
	cfg.retrieval.default_distance_function =
		cfg.retrieval.default_distance_function.trim().to_ascii_lowercase();
	cfg.retrieval.text_search_config = cfg.retrieval.text_search_config.trim().to_string();

	if cfg.providers.embedding.api_base.ends_with('/') && cfg.providers.embedding.path.starts_with('/')
	{
		let trimmed = cfg.providers.embedding.api_base.trim_end_matches('/').to_string();

		cfg.providers.embedding.api_base = trimmed;
	}
}
