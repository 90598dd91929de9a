use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ghfetch::cli::Args;
use ghfetch::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG takes precedence over --verbose
    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let pipeline = Pipeline::new(args)?;
    for path in pipeline.run().await? {
        println!("{}", path.display());
    }

    Ok(())
}
