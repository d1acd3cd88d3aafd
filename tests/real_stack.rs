//! Traces captured from the live call stack through the public entry points.

use server_log_sink::trace::is_runtime_frame;
use server_log_sink::{Logger, NoContext};
use std::io;

mod common;
use common::Recorder;

#[inline(never)]
fn put_object(logger: &Logger) {
    logger.log_if(&NoContext, Some(&io::Error::new(io::ErrorKind::Other, "io timeout")));
}

async fn serve_http(logger: &Logger) {
    put_object(logger);
}

/// Function part of a `"<file>:<line>:<function>()"` trace line.
fn function_of(line: &str) -> &str {
    let mut parts = line.splitn(3, ':');
    parts.nth(2).unwrap_or_default().trim_end_matches("()")
}

fn traced(logger: &Logger, rec: &Recorder) -> Vec<String> {
    let entries = rec.entries();
    assert_eq!(entries.len(), 1);
    let trace = entries[0].as_log().and_then(|l| l.trace.clone()).unwrap();
    assert_eq!(trace.message, "io timeout");
    assert!(!logger.is_disabled());
    trace.source
}

#[test]
fn trace_starts_at_the_caller_and_skips_runtime_frames() {
    let rec = Recorder::new();
    let mut logger = Logger::default();
    logger.add_target(rec.clone());

    put_object(&logger);

    let source = traced(&logger, &rec);
    assert!(function_of(&source[0]).ends_with("::put_object"), "{source:#?}");
    assert!(source.iter().all(|l| !is_runtime_frame(function_of(l))), "{source:#?}");
    assert!(source.iter().all(|l| !l.contains("core::ops::function::") && !l.contains("std::rt::")), "{source:#?}");
}

#[test]
fn async_handler_is_a_boundary() {
    let rec = Recorder::new();
    let mut logger = Logger::default();
    logger.add_target(rec.clone());

    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    rt.block_on(serve_http(&logger));

    let source = traced(&logger, &rec);
    assert!(function_of(&source[0]).ends_with("::put_object"), "{source:#?}");
    let last = source.last().unwrap();
    assert!(function_of(last).contains("::serve_http"), "{source:#?}");
    assert!(logger.collector().is_boundary(function_of(last)));
    assert!(source.iter().all(|l| !l.contains("tokio::") && !l.contains("async_handler_is_a_boundary")), "{source:#?}");
}
