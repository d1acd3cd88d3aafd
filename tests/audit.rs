//! Audit pipeline: one entry per exchange, audit registry only.

use http::{Request, Response};
use server_log_sink::audit::{PathVars, DEPLOYMENT_ID_HEADER, REQUEST_ID_HEADER};
use server_log_sink::{Logger, NoContext};
use std::io;
use std::sync::Arc;

mod common;
use common::{Broken, Recorder};

fn exchange() -> (Request<()>, Response<()>) {
    let mut req = Request::builder()
        .uri("/photos?delimiter=a&delimiter=b&max-keys=10")
        .header("x-amz-meta-color", "v1")
        .header("x-amz-meta-color", "v2")
        .header("user-agent", "MinIO (linux; amd64)")
        .header("x-forwarded-for", "203.0.113.9")
        .body(())
        .unwrap();
    req.extensions_mut().insert([("bucket", "photos")].into_iter().collect::<PathVars>());

    let resp = Response::builder()
        .header(DEPLOYMENT_ID_HEADER, "dep-1")
        .header(REQUEST_ID_HEADER, "r-77")
        .body(())
        .unwrap();
    (req, resp)
}

#[test]
fn audit_goes_only_to_audit_targets() {
    let (general, audit) = (Recorder::new(), Recorder::new());
    let mut logger = Logger::default();
    logger.add_target(general.clone());
    logger.add_audit_target(audit.clone());

    let (req, resp) = exchange();
    logger.audit(&req, &resp, "ListObjectsV1");
    logger.log_always_if(&NoContext, Some(&io::Error::new(io::ErrorKind::Other, "boom")));

    assert_eq!(audit.len(), 1);
    assert_eq!(general.len(), 1);
    assert!(audit.entries()[0].as_audit().is_some());
    assert!(general.entries()[0].as_log().is_some());
}

#[test]
fn audit_entry_wire_shape() {
    let audit = Recorder::new();
    let mut logger = Logger::default();
    logger.add_audit_target(audit.clone());

    let (req, resp) = exchange();
    logger.audit(&req, &resp, "ListObjectsV1");

    let value = serde_json::to_value(&audit.entries()[0]).unwrap();
    assert_eq!(value["version"], "1");
    assert_eq!(value["deploymentid"], "dep-1");
    assert_eq!(value["requestID"], "r-77");
    assert_eq!(value["remotehost"], "203.0.113.9");
    assert_eq!(value["userAgent"], "MinIO (linux; amd64)");
    assert_eq!(value["api"], serde_json::json!({ "name": "ListObjectsV1", "bucket": "photos" }));
    assert_eq!(value["requestQuery"]["delimiter"], "a,b");
    assert_eq!(value["requestQuery"]["max-keys"], "10");
    assert_eq!(value["requestHeader"]["X-Amz-Meta-Color"], "v1,v2");
    assert_eq!(value["responseHeader"]["X-Amz-Request-Id"], "r-77");
    assert!(value["time"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn every_audit_target_gets_every_entry_despite_failures() {
    let (first, last) = (Recorder::new(), Recorder::new());
    let mut logger = Logger::default();
    logger.add_audit_target(first.clone());
    logger.add_audit_target(Arc::new(Broken));
    logger.add_audit_target(last.clone());

    let (req, resp) = exchange();
    for _ in 0..3 {
        logger.audit(&req, &resp, "GetObject");
    }

    assert_eq!(first.len(), 3);
    assert_eq!(last.len(), 3);
    assert!(last.entries().iter().all(|e| e.as_audit().map(|a| a.version) == Some("1")));
}

#[test]
fn kill_switch_does_not_affect_audit() {
    let audit = Recorder::new();
    let mut logger = Logger::default();
    logger.add_audit_target(audit.clone());
    logger.set_disabled(true);

    let (req, resp) = exchange();
    logger.audit(&req, &resp, "HeadObject");
    assert_eq!(audit.len(), 1);
}
