//! Watches events and prints those with the lab's reason until the apiserver closes the watch.
use clap::Parser;
use eventlab::{cli::LabArgs, Consumer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // matches go to stdout, keep logs out of the way
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = LabArgs::parse();
    let client = args.client().await?;
    Consumer::from_config(client, &args.config())
        .run(std::io::stdout())
        .await?;
    Ok(())
}
