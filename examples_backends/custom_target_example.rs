use std::sync::Arc;

use server_log_sink::console::ConsoleTarget;
use server_log_sink::init::{build_logger, LoggerConfig};
use server_log_sink::{Entry, NoContext, RequestInfo, SendError, Target};

/// Example of integrating a completely custom destination by implementing
/// the `Target` trait directly. Imagine this hands entries to some
/// proprietary collector for which this crate does not provide a target.
struct MyCollectorTarget;

impl Target for MyCollectorTarget {
    fn send(&self, entry: &Entry) -> Result<(), SendError> {
        // Here you would call your own client library.
        // For the sake of example we just print the entry as JSON.
        println!("[my-collector] {}", serde_json::to_string(entry)?);
        Ok(())
    }

    fn name(&self) -> &str {
        "my-collector"
    }
}

fn main() {
    let mut config = LoggerConfig::from_env();
    config.console = false;
    let mut logger = build_logger(&config);
    logger.add_target(Arc::new(MyCollectorTarget));
    logger.add_audit_target(Arc::new(ConsoleTarget::for_logger(&logger)));
    let logger = Arc::new(logger);

    let info = RequestInfo::new("r-1", "10.0.0.5", "curl/8").with_api("PutObject").with_bucket("photos");
    info.set_tags("disk", "/mnt/disk1");
    let err = std::io::Error::new(std::io::ErrorKind::Other, "simulated write failure");
    logger.log_if(&info, Some(&err));
    logger.log_if(&NoContext, Some(&std::io::Error::new(std::io::ErrorKind::Other, "disk not found")));

    let req = http::Request::builder()
        .uri("/photos?prefix=2018")
        .header("user-agent", "curl/8")
        .body(())
        .unwrap_or_default();
    let resp = http::Response::new(());
    logger.audit(&req, &resp, "ListObjectsV2");
}
