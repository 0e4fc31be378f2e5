use embracecloud_provider::{init_logging, serve, EmbraceCloudProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting embracecloud provider");
    serve(EmbraceCloudProvider::new()).await
}
