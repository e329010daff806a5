use anyhow::{Context, Result};
use axum::http::Method;
use summarizer::{api, config::Config, model::ModelHandle};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = Config::from_env();

    // Model is loaded once, before the listener is bound. Failure leaves it
    // unavailable; the server still starts.
    let model = ModelHandle::initialize(&config.model).await;
    if !model.is_available() {
        tracing::warn!("serving without a summarization model; /summarize will return errors");
    }

    // CORS (dev use: allow any origin)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = api::routes(api::AppState { model })
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Bind
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
