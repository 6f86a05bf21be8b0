//! Publishes an event against a placeholder ConfigMap every second until interrupted,
//! then removes the events and the ConfigMap again.
use clap::Parser;
use eventlab::{cli::LabArgs, shutdown, Producer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = LabArgs::parse();
    let config = args.config();
    let client = args.client().await?;
    let shutdown = shutdown::on_signal()?;

    info!(api = %config.api, target = %config.target_name, interval = ?config.interval, "starting producer");
    Producer::new(client, config).run(shutdown).await?;
    Ok(())
}
