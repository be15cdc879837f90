use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = pravo_api::Args::parse();
	pravo_api::run(args).await
}
