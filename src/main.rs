//! mockd - CLI entry point

use anyhow::Result;
use clap::Parser;
use mockd::{MockServer, MockSpec, PatternResponseGenerator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockd",
    about = "Mock HTTP API server - serves pre-programmed responses from a JSON specification",
    version
)]
struct Args {
    /// Path to the mock specification file
    #[arg(short = 'f', long)]
    spec: PathBuf,

    /// Address and port to listen on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate the specification and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(path = ?args.spec, "loading specification");
    let spec = MockSpec::from_file(&args.spec)?;

    if args.validate {
        println!("Specification is valid ({} rules defined)", spec.rules.len());
        return Ok(());
    }

    let generator = Arc::new(PatternResponseGenerator::from_spec(&spec)?);
    let server = MockServer::bind(&args.endpoint, generator).await?;

    tokio::select! {
        res = server.serve() => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
