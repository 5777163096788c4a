use std::{fs, path::PathBuf};

use clap::{
	Parser,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use priorart_service::{Pipeline, RequestEnvelope, StageName};

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab", styles = styles())]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Plain-text invention disclosure.
	#[arg(long, short = 'd', value_name = "FILE")]
	pub disclosure: PathBuf,
	#[arg(long, value_name = "ID")]
	pub case_id: String,
	/// JSON findings from an earlier eligibility screen of the same disclosure.
	#[arg(long, value_name = "FILE")]
	pub prior_context: Option<PathBuf>,
	/// Write the result JSON here instead of stdout.
	#[arg(long, short = 'o', value_name = "FILE")]
	pub output: Option<PathBuf>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = priorart_config::load(&args.config)?;
	init_tracing(&config)?;

	let disclosure_text = fs::read_to_string(&args.disclosure)?;
	let prior_context = match &args.prior_context {
		Some(path) => Some(serde_json::from_str(&fs::read_to_string(path)?)?),
		None => None,
	};
	let request = RequestEnvelope { case_id: args.case_id, disclosure_text, prior_context };
	let pipeline = Pipeline::from_config(&config)?;
	let cancel = CancellationToken::new();
	let signal_cancel = cancel.clone();

	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::warn!("Interrupt received. Cancelling the run.");
			signal_cancel.cancel();
		}
	});

	let result = pipeline.run_with_progress(request, &cancel, &report_progress).await?;
	let rendered = serde_json::to_string_pretty(&result)?;

	match &args.output {
		Some(path) => {
			fs::write(path, rendered)?;
			tracing::info!(path = %path.display(), "Result written.");
		},
		None => println!("{rendered}"),
	}

	Ok(())
}

fn report_progress(stage: StageName, detail: &str) {
	tracing::info!(%stage, detail, "Stage progress.");
}

fn init_tracing(config: &priorart_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();
	Ok(())
}

fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Red.on_default() | Effects::BOLD)
		.usage(AnsiColor::Red.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}
