use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use rusty_whisper::config::ServerConfig;
use rusty_whisper::core::gateway::SessionGateway;
use rusty_whisper::handlers::routes;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, inactivity_limit={:?}, grace_period={:?}, max_frame_bytes={}",
        config.host, config.port, config.inactivity_limit, config.grace_period, config.max_frame_bytes
    );

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let tls = match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) if config.enable_tls => Some((cert.clone(), key.clone())),
        _ => None,
    };

    let gateway = Arc::new(SessionGateway::new(config));
    let routes = routes(gateway);

    match tls {
        Some((cert, key)) => {
            info!("Starting rusty-whisper relay on wss://{}", addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(addr)
                .await;
        }
        None => {
            info!("Starting rusty-whisper relay on ws://{}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}
