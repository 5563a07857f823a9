// SPDX-License-Identifier: MIT

//! Wellcheck API Server
//!
//! Runs the missed-check-in scan on Cloud Scheduler triggers: overdue users
//! get a push on their own devices, then their emergency contacts are
//! alerted under each link's notification policy.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wellcheck::{config::Config, db::FirestoreStore, services::FcmClient, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Wellcheck API");

    // Initialize Firestore database
    let store = FirestoreStore::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize FCM push client
    let push = FcmClient::new(&config.gcp_project_id);
    tracing::info!(
        project = %config.gcp_project_id,
        "FCM client initialized"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store: Arc::new(store),
        push: Arc::new(push),
    });

    // Build router
    let app = wellcheck::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wellcheck=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
