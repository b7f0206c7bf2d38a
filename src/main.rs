mod catalog;
mod config;
mod coordinator;
mod fallback;
mod gemini;
mod models;
mod preprocess;
mod prompt;
mod records;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Settings;
use crate::coordinator::GenerationCoordinator;
use crate::fallback::{CopyEngine, PhraseLibrary};
use crate::gemini::{GeminiClient, HttpTransport};
use crate::records::RecordStore;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env()?;
    tracing::info!("Using API key: {}", settings.masked_key());
    tracing::info!(
        image_model = %settings.image_model,
        text_model = %settings.text_model,
        base_url = %settings.base_url,
        "Inference endpoint configured"
    );

    let gemini = Arc::new(GeminiClient::new(settings.invoker_config(), Arc::new(HttpTransport::new())));
    let copy = Arc::new(CopyEngine::new(PhraseLibrary::embedded()));
    let state = AppState {
        coordinator: Arc::new(GenerationCoordinator::new(gemini, copy)),
        records: Arc::new(RecordStore::open(&settings.records_path)),
        assets_dir: Arc::new(settings.assets_dir.clone()),
    };

    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
