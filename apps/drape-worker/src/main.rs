use clap::Parser;

use drape_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = Args::parse();
	drape_worker::run(args).await
}
