/**
 * diagramsync Server Entry Point
 *
 * Loads configuration, builds the Axum application and serves it until
 * Ctrl-C, then closes every live subscription.
 */

#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use diagramsync::shared::AppConfig;

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = AppConfig::load()?;
    if config.uses_default_secret() {
        tracing::warn!("[Auth] JWT_SECRET not set; using the development secret");
    }

    let port = config.port;
    let (app, fanout) = diagramsync::backend::server::init::create_app(config).await;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            let closed = fanout.shutdown();
            tracing::info!("Shutting down; closed {} subscriptions", closed);
        })
        .await?;

    Ok(())
}

#[cfg(not(feature = "ssr"))]
fn main() {
    eprintln!("Server requires the 'ssr' feature to be enabled.");
    eprintln!("Run with: cargo run --bin diagramsync-server --features ssr");
    std::process::exit(1);
}
