use anyhow::Result;
use clap::Parser;
use listening_analytics::{cli, config, AnalysisRunner};
use std::process::ExitCode;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,listening_analytics=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn run(args: cli::Args) -> Result<()> {
    let config = config::AnalyticsConfig::resolve(&args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(AnalysisRunner::new(config).run())?;
    tracing::info!(
        run_id = %summary.manifest.run_id,
        output_root = %summary.output_root.display(),
        enriched_rows = summary.manifest.enriched_rows,
        orphan_events = summary.manifest.orphan_events,
        "all analyses written"
    );
    Ok(())
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = cli::Args::parse();
    if let Err(err) = init_tracing() {
        eprintln!("listening-analytics: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = format!("{err:#}").replace('\n', " ");
            eprintln!("listening-analytics: {message}");
            ExitCode::FAILURE
        }
    }
}
