use std::sync::Arc;

use server_log_sink::init::{build_logger, init_tracing, LoggerConfig};
use server_log_sink::NoContext;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Example: LOG_SINK_WEBHOOK_URL=http://localhost:8080/logs
    let mut config = LoggerConfig::from_env();
    if config.webhook_url.is_none() {
        config.webhook_url = Some("http://localhost:8080/logs".to_string());
    }

    let logger = Arc::new(build_logger(&config));
    if let Err(e) = init_tracing(Arc::clone(&logger)) {
        eprintln!("{}", e);
    }

    info!("webhook example started");
    error!(target: "app", bucket = "photos", "simulated error sent via tracing");

    let err = std::io::Error::new(std::io::ErrorKind::Other, "simulated error sent via log_if");
    logger.log_if(&NoContext, Some(&err));

    // Give the spawned deliveries a moment to reach the webhook.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
}
