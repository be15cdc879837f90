pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = pravo_cli::VERSION,
	rename_all = "kebab",
	styles = pravo_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = pravo_config::load(&args.config)?;
	init_tracing(&config);
	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(config).await?;
	let app = routes::router(state);

	let http_listener = TcpListener::bind(http_addr).await?;
	tracing::info!(%http_addr, "HTTP server listening.");
	axum::serve(http_listener, app).await?;

	Ok(())
}

fn init_tracing(config: &pravo_config::Config) {
	tracing_subscriber::fmt().with_env_filter(env_filter(&config.service.log_level)).init();
}

/// Parses `service.log_level`, falling back to `info` when the directive is invalid.
fn env_filter(log_level: &str) -> EnvFilter {
	EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_log_level_falls_back_to_info() {
		assert_eq!(env_filter("pravo=notalevel").to_string(), EnvFilter::new("info").to_string());
	}

	#[test]
	fn valid_log_level_is_kept() {
		assert!(env_filter("pravo_service=debug").to_string().contains("pravo_service"));
	}
}
