use std::net::SocketAddr;

use scad_ai::MeshGenerator;
use scad_ai::config::Settings;
use scad_server::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    let generator = MeshGenerator::from_settings(&settings)?;
    let output_dir =
        std::env::var("SCAD_OUTPUT_DIR").unwrap_or_else(|_| "generated".to_string());
    let state = AppState::new(generator, output_dir);

    let address = SocketAddr::from(([127, 0, 0, 1], 8000));
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "scad-server listening");
    axum::serve(listener, scad_server::app(state)).await?;
    Ok(())
}
