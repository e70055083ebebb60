use orch_relay::configuration::get_configuration;
use orch_relay::server::config::{app_router, build_state};
use tracing::info;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = get_configuration().expect("Failed to load configuration");

    let (state, flusher) = build_state(&settings)
        .await
        .expect("Failed to initialize services");
    let app = app_router(state.clone());

    let addr = format!(
        "{}:{}",
        settings.application.host, settings.application.port
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");
    info!("Starting server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Stop the flush loop and let it write any pending transcript.
    let _ = state.flush_shutdown.send(true);
    let _ = flusher.await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
