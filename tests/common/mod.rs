//! Shared helpers for the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use server_log_sink::trace::{Frame, Frames, StackWalker};
use server_log_sink::{Entry, SendError, Target};
use std::sync::Arc;

/// Target that keeps every entry it receives.
#[derive(Default)]
pub struct Recorder {
    entries: Mutex<Vec<Entry>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Target for Recorder {
    fn send(&self, entry: &Entry) -> Result<(), SendError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recorder"
    }
}

/// Target that always fails.
pub struct Broken;

impl Target for Broken {
    fn send(&self, _entry: &Entry) -> Result<(), SendError> {
        Err("connection refused".into())
    }
}

/// Walker returning a fixed stack; index 0 stands for the collector itself.
pub struct FixedWalker(pub Vec<Frame>);

impl FixedWalker {
    /// `frames` as seen from the code that called the logger.
    pub fn above_logger(frames: Vec<Frame>) -> Arc<Self> {
        let mut stack = vec![
            Frame::new("src/trace.rs", 1, "server_log_sink::trace::TraceCollector::collect"),
            Frame::new("src/logger.rs", 2, "server_log_sink::logger::Logger::log_entry"),
            Frame::new("src/logger.rs", 3, "server_log_sink::logger::Logger::log_if"),
        ];
        stack.extend(frames);
        Arc::new(FixedWalker(stack))
    }
}

impl StackWalker for FixedWalker {
    fn walk(&self, skip: usize) -> Frames {
        Box::new(self.0.clone().into_iter().skip(skip))
    }
}
