use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = priorart_search::Args::parse();
	priorart_search::run(args).await
}
