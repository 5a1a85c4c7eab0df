use anyhow::Result;
use sinkdns::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    if let Err(e) = sinkdns::runner::run(config).await {
        tracing::error!(error = %format!("{e:#}"), "sinkhole exited");
        return Err(e);
    }
    Ok(())
}
