use anyhow::Result;
use switchboard::config::Settings;
use switchboard::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.level))?;
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.is_json() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Switchboard");

    let app = Application::new(settings)?;
    app.run().await?;

    Ok(())
}
