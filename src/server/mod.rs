//! OpenAI-compatible HTTP front end (Actix Web).
//!
//! Exposes:
//! - `POST /v1/chat/completions`
//! - `POST /v1/completions`
//! - `GET /v1/models`
//! - `GET /health`

pub mod config;
pub mod openai;
pub mod routes;

pub use config::ServerConfig;
pub use routes::{configure, ApiError};

use crate::client::PlaygroundClient;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub client: PlaygroundClient,
}

/// Serve until the process is stopped.
pub async fn serve(config: ServerConfig, client: PlaygroundClient) -> Result<()> {
    let addr = config.bind_addr();
    info!(addr = %addr, "playground proxy listening");

    let state = web::Data::new(AppState { client });

    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(&addr)
        .with_context(|| format!("failed to bind {}", addr))?
        .run()
        .await
        .context("server error")?;

    Ok(())
}
