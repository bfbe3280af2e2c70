// SPDX-License-Identifier: EUPL-1.2

//! Onyxia console core: per-project configuration and S3 profiles.
//!
//! Each caller is identified by the OIDC id token in the `Authorization`
//! header and gets a session holding the selected project's configuration
//! and the S3 profiles resolved for them.
//!
//! ## Endpoints
//!
//! - `GET  /health`: Health check
//! - `GET  /projects`: Projects the caller can select
//! - `POST /project`: Select a project
//! - `POST /project/service-password`: Renew the service password
//! - `GET  /project/configs`: Current project configuration
//! - `PUT  /project/configs/{key}`: Replace one configuration value
//! - `/s3-profiles/...`: See [`handlers_s3`]

mod config;
mod db;
mod error;
mod handlers;
mod handlers_s3;
mod identity;
mod models;
mod project;
mod s3;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use db::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/projects", get(handlers::list_projects))
        .route("/project", post(handlers::change_project))
        .route("/project/service-password", post(handlers::renew_service_password))
        .route("/project/configs", get(handlers::get_project_configs))
        .route("/project/configs/:key", put(handlers::update_config_value))
        .route(
            "/s3-profiles",
            get(handlers_s3::list_s3_profiles).post(handlers_s3::create_or_update_s3_profile),
        )
        .route("/s3-profiles/initialize", post(handlers_s3::initialize_s3_profiles))
        .route("/s3-profiles/explorer", get(handlers_s3::get_explorer_profile_and_client))
        .route(
            "/s3-profiles/by-name/:name/client",
            get(handlers_s3::get_s3_client),
        )
        .route(
            "/s3-profiles/:id",
            axum::routing::delete(handlers_s3::delete_s3_profile),
        )
        .route(
            "/s3-profiles/:id/bookmarks",
            post(handlers_s3::create_delete_or_update_bookmark),
        )
        .route("/s3-profiles/:id/default", post(handlers_s3::change_is_default))
        .route("/s3-profiles/:id/test", post(handlers_s3::test_s3_credentials))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "onyxia_console=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = config::Settings::from_env();
    let region = settings.load_region()?;

    let state = Arc::new(AppState::connect(settings.clone(), region).await?);

    if let Some(pool) = &state.pool {
        sqlx::migrate!("./migrations").run(pool).await?;
        tracing::info!("Migrations applied");
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr).await?;
    tracing::info!("Onyxia console listening on http://{}", settings.listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
