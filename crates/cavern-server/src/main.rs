use tracing_subscriber::EnvFilter;

use cavern_server::config::ServerConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load();
    config.validate();
    let listen_addr = config.listen_addr.clone();

    let (app, state) = cavern_server::build_app(config);
    cavern_server::spawn_idle_reaper(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {listen_addr}: {e}"));

    tracing::info!("Cavern server listening on {listen_addr}");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
