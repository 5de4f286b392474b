//! Shift Rostering - Axum Server
//!
//! Run with: cargo run
//! Then POST a spec to http://localhost:7860/solve

use shift_rostering::api;

use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs from shift_rostering at INFO level unless overridden.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("shift_rostering=info".parse().unwrap()),
        )
        .init();

    // CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = Arc::new(api::AppState::new());
    let app = api::router(state).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], 7860));
    println!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
