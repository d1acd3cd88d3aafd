//! Severity policy and dispatch behaviour of the error entry points.

use serde_json::json;
use server_log_sink::trace::{Frame, TraceCollector, TrimRules, AUTOGENERATED_FILE};
use server_log_sink::{CriticalFault, Level, Logger, NoContext, RequestInfo};
use std::io;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

mod common;
use common::{Broken, FixedWalker, Recorder};

fn put_object_info() -> RequestInfo {
    RequestInfo::new("r-1", "10.0.0.5", "aws-sdk-go")
        .with_api("PutObject")
        .with_bucket("photos")
        .with_object("a.jpg")
}

fn err(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg.to_string())
}

fn logger_with(targets: &[Arc<Recorder>]) -> Logger {
    let mut logger = Logger::default();
    for t in targets {
        logger.add_target(t.clone());
    }
    logger
}

#[test]
fn none_never_dispatches() {
    let rec = Recorder::new();
    let mut logger = logger_with(&[rec.clone()]);
    let exits = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&exits);
    logger.set_exit_handler(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });
    let info = put_object_info();

    logger.log_always_if(&info, None::<&io::Error>);
    logger.log_if(&info, None::<&io::Error>);
    assert_eq!(logger.critical_if(&info, None::<&io::Error>), Ok(()));
    logger.fatal_if(None::<&io::Error>, "unreachable", &[]);

    assert_eq!(rec.len(), 0);
    assert_eq!(exits.load(Ordering::SeqCst), 0);
}

#[test]
fn disk_not_found_is_suppressed_only_on_the_conditional_path() {
    let (a, b) = (Recorder::new(), Recorder::new());
    let logger = logger_with(&[a.clone(), b.clone()]);
    let info = put_object_info();
    let noisy = err("disk not found");

    logger.log_if(&info, Some(&noisy));
    assert_eq!((a.len(), b.len()), (0, 0));

    logger.log_always_if(&info, Some(&noisy));
    assert_eq!((a.len(), b.len()), (1, 1));

    let entry = a.entries()[0].as_log().cloned().unwrap();
    assert_eq!(entry.level, Level::Error);
    assert_eq!(entry.remote_host, "10.0.0.5");
    assert_eq!(entry.request_id, "r-1");
    assert_eq!(entry.trace.as_ref().unwrap().message, "disk not found");
    let api = entry.api.unwrap();
    assert_eq!(api.name, "PutObject");
    assert_eq!(api.args.unwrap().bucket, "photos");
}

#[test]
fn other_errors_are_logged_with_request_tags() {
    let rec = Recorder::new();
    let logger = logger_with(&[rec.clone()]);
    let info = put_object_info();
    info.set_tags("disk", "/mnt/d1").append_tags("set", "2");

    logger.log_if(&info, Some(&err("file not found")));

    let value = serde_json::to_value(&rec.entries()[0]).unwrap();
    assert_eq!(value["level"], "ERROR");
    assert_eq!(value["error"]["message"], "file not found");
    assert_eq!(value["error"]["variables"], json!({ "disk": "/mnt/d1", "set": "2" }));
    assert_eq!(value["api"]["args"], json!({ "bucket": "photos", "object": "a.jpg" }));
}

#[test]
fn missing_request_context_logs_as_system() {
    let rec = Recorder::new();
    let logger = logger_with(&[rec.clone()]);

    logger.log_if(&NoContext, Some(&err("heal failed")));
    logger.log_if(&RequestInfo::default(), Some(&err("heal failed")));

    for entry in rec.entries() {
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["api"], json!({ "name": "SYSTEM" }));
        assert!(value.get("requestID").is_none());
    }
}

#[test]
fn critical_logs_once_then_faults_once() {
    let rec = Recorder::new();
    let logger = logger_with(&[rec.clone()]);

    fn handler(logger: &Logger) -> Result<&'static str, CriticalFault> {
        logger.critical_if(&NoContext, Some(&err("metadata corrupted")))?;
        Ok("unreachable")
    }

    assert_eq!(handler(&logger), Err(CriticalFault));
    assert_eq!(rec.len(), 1);
}

#[test]
fn fatal_logs_with_data_then_exits() {
    let rec = Recorder::new();
    let mut logger = logger_with(&[rec.clone()]);
    let code = Arc::new(AtomicI32::new(-1));
    let c = Arc::clone(&code);
    logger.set_exit_handler(move |status| c.store(status, Ordering::SeqCst));

    logger.fatal_if(
        Some(&err("address in use")),
        "unable to start server",
        &[("port", json!(9000)), ("tls", json!(false))],
    );

    assert_eq!(code.load(Ordering::SeqCst), 1);
    let entry = rec.entries()[0].as_log().cloned().unwrap();
    assert_eq!(entry.level, Level::Fatal);
    assert_eq!(entry.message, "unable to start server port=9000 tls=false");
    let trace = entry.trace.unwrap();
    assert_eq!(trace.message, "address in use");
    assert_eq!(trace.variables["port"], "9000");
}

#[test]
fn ui_renderer_is_used_for_fatal_errors() {
    let mut logger = Logger::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    logger.register_ui_error(move |msg, err, json| {
        c.fetch_add(1, Ordering::SeqCst);
        format!("{msg}: {err} ({json})")
    });
    logger.set_exit_handler(|_| {});

    logger.fatal_if(Some(&err("bad config")), "startup", &[]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    logger.enable_json();
    logger.fatal_if(Some(&err("bad config")), "startup", &[]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn kill_switch_silences_every_path_but_keeps_fault_and_exit() {
    let rec = Recorder::new();
    let mut logger = logger_with(&[rec.clone()]);
    let exited = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&exited);
    logger.set_exit_handler(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });
    logger.set_disabled(true);
    let info = put_object_info();
    let boom = err("boom");

    logger.log_always_if(&info, Some(&boom));
    logger.log_if(&info, Some(&boom));
    assert_eq!(logger.critical_if(&info, Some(&boom)), Err(CriticalFault));
    logger.fatal_if(Some(&boom), "fatal", &[]);

    assert_eq!(rec.len(), 0);
    assert_eq!(exited.load(Ordering::SeqCst), 1);
}

#[test]
fn trace_is_trimmed_filtered_and_cut_at_boundary() {
    let walker = FixedWalker::above_logger(vec![
        Frame::new("/usr/local/go/src/server/object.rs", 10, "server::object::put_object"),
        Frame::new(AUTOGENERATED_FILE, 0, "server::object::shim"),
        Frame::new("/rustc/lib/std/src/panicking.rs", 5, "std::panicking::try"),
        Frame::new("/usr/local/go/src/server/http.rs", 20, "server::http::serve_http"),
        Frame::new("/usr/local/go/src/hyper/dispatch.rs", 30, "hyper::proto::dispatch"),
    ]);
    let collector = TraceCollector::new(TrimRules::from_roots(&["/usr/local/go"], None)).with_walker(walker);
    let rec = Recorder::new();
    let mut logger = Logger::new(collector);
    logger.add_target(rec.clone());

    logger.log_if(&NoContext, Some(&err("io timeout")));

    let entry = rec.entries()[0].as_log().cloned().unwrap();
    assert_eq!(
        entry.trace.unwrap().source,
        vec![
            "server/object.rs:10:server::object::put_object()",
            "server/http.rs:20:server::http::serve_http()",
        ]
    );
}

#[test]
fn failing_target_does_not_stop_delivery() {
    let rec = Recorder::new();
    let mut logger = Logger::default();
    logger.add_target(Arc::new(Broken));
    logger.add_target(rec.clone());

    logger.log_always_if(&NoContext, Some(&err("slow disk")));
    assert_eq!(rec.len(), 1);
}

#[test]
fn no_targets_is_fine() {
    let logger = Logger::default();
    logger.log_always_if(&NoContext, Some(&err("nobody listens")));
    logger.log_if(&NoContext, Some(&err("nobody listens")));
    assert_eq!(logger.critical_if(&NoContext, Some(&err("x"))), Err(CriticalFault));
    logger.audit(&http::Request::new(()), &http::Response::new(()), "ListBuckets");
}

#[test]
fn concurrent_callers_each_reach_every_target() {
    let (a, b) = (Recorder::new(), Recorder::new());
    let logger = Arc::new(logger_with(&[a.clone(), b.clone()]));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let logger = Arc::clone(&logger);
            std::thread::spawn(move || {
                let info = RequestInfo::new(format!("r-{i}"), "", "");
                for _ in 0..25 {
                    logger.log_always_if(&info, Some(&err("contention")));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(a.len(), 200);
    assert_eq!(b.len(), 200);
}
