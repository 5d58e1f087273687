use std::path::PathBuf;

use anyhow::Context;

use warden_app::{Bootstrap, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_app::settings::load_dotenv();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref()).context("loading configuration")?;

    warden_observability::init(&settings.log);

    let app = Bootstrap::from_settings(&settings)
        .await
        .context("bootstrapping services")?;
    tracing::info!(?app, "warden ready; waiting for shutdown signal");

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    tracing::info!("shutdown signal received");

    app.shutdown().await;
    Ok(())
}
