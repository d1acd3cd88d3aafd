//! Error logging entry points and the escalation policy around them.

use crate::entry::{Args, Entry, Level, LogEntry, TraceEntry, SYSTEM_API};
use crate::request_info::RequestContext;
use crate::target::{Target, Targets};
use crate::trace::TraceCollector;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error message that [`Logger::log_if`] drops: a missing disk is reported
/// on every request touching it and would flood the targets.
pub const DISK_NOT_FOUND: &str = "disk not found";

/// Frames above `log_entry` to reach the code that called a public entry
/// point: `log_entry` itself, then the entry point.
const TRACE_SKIP: usize = 2;

/// Returned by [`Logger::critical_if`] after the error was logged.
///
/// A distinct marker so recovery boundaries can tell an intentional stop
/// of the current request apart from ordinary errors.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("critical error")]
pub struct CriticalFault;

/// Renders a fatal error for humans: `(message, error, json_mode)`.
pub type UiErrorFn = Arc<dyn Fn(&str, &dyn fmt::Display, bool) -> String + Send + Sync>;

/// Called with the exit code once a fatal error is logged.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

/// Presentation switches. They never change entry contents.
#[derive(Debug, Default)]
pub struct OutputFlags {
    quiet: AtomicBool,
    json: AtomicBool,
}

impl OutputFlags {
    pub fn enable_quiet(&self) {
        self.quiet.store(true, Ordering::Relaxed);
    }

    /// JSON output also implies quiet.
    pub fn enable_json(&self) {
        self.json.store(true, Ordering::Relaxed);
        self.quiet.store(true, Ordering::Relaxed);
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet.load(Ordering::Relaxed)
    }

    pub fn is_json(&self) -> bool {
        self.json.load(Ordering::Relaxed)
    }
}

/// Process-wide logging subsystem.
///
/// Targets are registered through `&mut self` while the server starts up;
/// afterwards the logger is shared as `Arc<Logger>` and every entry point
/// takes `&self`, so registration can never race with dispatch.
pub struct Logger {
    targets: Targets,
    audit_targets: Targets,
    collector: TraceCollector,
    flags: Arc<OutputFlags>,
    disabled: AtomicBool,
    ui_error: Option<UiErrorFn>,
    exit: ExitFn,
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new(TraceCollector::default())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("targets", &self.targets)
            .field("audit_targets", &self.audit_targets)
            .field("collector", &self.collector)
            .field("flags", &self.flags)
            .field("disabled", &self.is_disabled())
            .finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(collector: TraceCollector) -> Self {
        Logger {
            targets: Targets::new(),
            audit_targets: Targets::new(),
            collector,
            flags: Arc::new(OutputFlags::default()),
            disabled: AtomicBool::new(false),
            ui_error: None,
            exit: Arc::new(|code| std::process::exit(code)),
        }
    }

    /// Register a target for error logs.
    pub fn add_target(&mut self, target: Arc<dyn Target>) {
        self.targets.add(target);
    }

    /// Register a target for audit entries.
    pub fn add_audit_target(&mut self, target: Arc<dyn Target>) {
        self.audit_targets.add(target);
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn audit_targets(&self) -> &Targets {
        &self.audit_targets
    }

    pub fn collector(&self) -> &TraceCollector {
        &self.collector
    }

    /// Install a renderer for fatal errors shown to a human operator.
    pub fn register_ui_error<F>(&mut self, f: F)
    where
        F: Fn(&str, &dyn fmt::Display, bool) -> String + Send + Sync + 'static,
    {
        self.ui_error = Some(Arc::new(f));
    }

    /// Replace process termination on fatal errors.
    pub fn set_exit_handler<F>(&mut self, f: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit = Arc::new(f);
    }

    /// Turn all error logging off, e.g. for test runs. Critical and fatal
    /// errors still fault and exit; they just aren't logged.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    pub fn flags(&self) -> &Arc<OutputFlags> {
        &self.flags
    }

    pub fn enable_quiet(&self) {
        self.flags.enable_quiet();
    }

    pub fn enable_json(&self) {
        self.flags.enable_json();
    }

    pub fn is_quiet(&self) -> bool {
        self.flags.is_quiet()
    }

    pub fn is_json(&self) -> bool {
        self.flags.is_json()
    }

    /// Log `err` unconditionally, unless it is `None`.
    #[inline(never)]
    pub fn log_always_if<E>(&self, ctx: &dyn RequestContext, err: Option<&E>)
    where
        E: fmt::Display + ?Sized,
    {
        if let Some(err) = err {
            self.log_entry(ctx, err);
        }
    }

    /// Log `err` unless it is `None` or a known noisy condition.
    #[inline(never)]
    pub fn log_if<E>(&self, ctx: &dyn RequestContext, err: Option<&E>)
    where
        E: fmt::Display + ?Sized,
    {
        if let Some(err) = err {
            if err.to_string() != DISK_NOT_FOUND {
                self.log_entry(ctx, err);
            }
        }
    }

    /// Log `err` like [`log_if`](Self::log_if) and fail the current request.
    ///
    /// Callers propagate the returned [`CriticalFault`] with `?` up to
    /// their recovery boundary. Other requests are unaffected.
    #[inline(never)]
    pub fn critical_if<E>(&self, ctx: &dyn RequestContext, err: Option<&E>) -> Result<(), CriticalFault>
    where
        E: fmt::Display + ?Sized,
    {
        match err {
            None => Ok(()),
            Some(err) => {
                self.log_if(ctx, Some(err));
                Err(CriticalFault)
            }
        }
    }

    /// Log `err` with `msg` and `data` at FATAL level, then terminate the
    /// process. Does nothing for `None`.
    #[inline(never)]
    pub fn fatal_if<E>(&self, err: Option<&E>, msg: &str, data: &[(&str, serde_json::Value)])
    where
        E: fmt::Display + ?Sized,
    {
        let Some(err) = err else {
            return;
        };
        let message = render_message(msg, data);

        if !self.is_disabled() {
            let variables = data
                .iter()
                .map(|(k, v)| (k.to_string(), render_value(v)))
                .collect::<BTreeMap<_, _>>();
            let source = self.collector.collect(1).collect();
            let entry = LogEntry::new(Level::Fatal, Utc::now())
                .with_api(SYSTEM_API, Args::default())
                .with_message(message.as_str())
                .with_trace(TraceEntry { message: err.to_string(), source, variables });
            self.targets.dispatch(&Entry::Log(entry));

            if let Some(ui) = self.ui_error.as_ref().filter(|_| !self.is_json()) {
                let shown: &dyn fmt::Display = &err;
                eprintln!("{}", ui(message.as_str(), shown, self.is_json()));
            }
        }

        (self.exit)(1);
    }

    /// Common path of the error entry points.
    #[inline(never)]
    fn log_entry<E>(&self, ctx: &dyn RequestContext, err: &E)
    where
        E: fmt::Display + ?Sized,
    {
        if self.is_disabled() {
            return;
        }

        let info = ctx.request_info();
        let mut entry = LogEntry::new(Level::Error, Utc::now());
        let mut variables = BTreeMap::new();
        match info {
            Some(req) => {
                for tag in req.tags() {
                    variables.insert(tag.key, tag.val);
                }
                let args = Args {
                    bucket: req.bucket_name.clone(),
                    object: req.object_name.clone(),
                    ..Args::default()
                };
                entry = entry
                    .with_api(req.api.as_str(), args)
                    .with_request(
                        req.deployment_id.as_str(),
                        req.remote_host.as_str(),
                        req.request_id.as_str(),
                        req.user_agent.as_str(),
                    );
            }
            None => entry = entry.with_api(SYSTEM_API, Args::default()),
        }

        let source = self.collector.collect(TRACE_SKIP).collect();
        let entry = entry.with_trace(TraceEntry { message: err.to_string(), source, variables });

        self.targets.dispatch(&Entry::Log(entry));
    }
}

/// `msg` followed by `key=value` pairs in the given order.
pub fn render_message(msg: &str, data: &[(&str, serde_json::Value)]) -> String {
    let mut out = msg.to_string();
    for (key, value) in data {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(&render_value(value));
    }
    out
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
