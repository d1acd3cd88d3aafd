use crate::entry::{AuditEntry, Entry, LogEntry};
use crate::logger::{Logger, OutputFlags};
use crate::target::{SendError, Target};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

/// Time layout of human-readable console output.
pub const TIME_FORMAT: &str = "%H:%M:%S %Z %m/%d/%Y";

/// Writes entries to a terminal: one JSON object per line in JSON mode,
/// a multi-line human rendering otherwise.
pub struct ConsoleTarget {
    flags: Arc<OutputFlags>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleTarget {
    /// Console target on stdout following the logger's output flags.
    pub fn for_logger(logger: &Logger) -> Self {
        Self::new(Arc::clone(logger.flags()), Box::new(std::io::stdout()))
    }

    pub fn new(flags: Arc<OutputFlags>, out: Box<dyn Write + Send>) -> Self {
        ConsoleTarget { flags, out: Mutex::new(out) }
    }

    fn render(&self, entry: &Entry) -> Result<String, SendError> {
        if self.flags.is_json() {
            return Ok(serde_json::to_string(entry)?);
        }
        Ok(match entry {
            Entry::Log(e) => render_log(e),
            Entry::Audit(e) => render_audit(e),
        })
    }
}

impl Target for ConsoleTarget {
    fn send(&self, entry: &Entry) -> Result<(), SendError> {
        let text = self.render(entry)?;
        let mut out = self.out.lock();
        writeln!(out, "{}", text)?;
        out.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

fn render_log(e: &LogEntry) -> String {
    let mut s = String::new();
    if let Some(api) = &e.api {
        let mut args = Vec::new();
        if let Some(a) = &api.args {
            if !a.bucket.is_empty() {
                args.push(format!("bucket={}", a.bucket));
            }
            if !a.object.is_empty() {
                args.push(format!("object={}", a.object));
            }
        }
        let _ = writeln!(s, "API: {}({})", api.name, args.join(", "));
    }
    let _ = write!(s, "Time: {}", e.time.format(TIME_FORMAT));
    for (label, value) in [
        ("DeploymentID", &e.deployment_id),
        ("RequestID", &e.request_id),
        ("RemoteHost", &e.remote_host),
        ("UserAgent", &e.user_agent),
    ] {
        if !value.is_empty() {
            let _ = write!(s, "\n{}: {}", label, value);
        }
    }
    if !e.message.is_empty() {
        let _ = write!(s, "\n{}: {}", e.level, e.message);
    }
    if let Some(trace) = &e.trace {
        for (k, v) in &trace.variables {
            let _ = write!(s, "\n{}={}", k, v);
        }
        let _ = write!(s, "\nError: {}", trace.message);
        let depth = trace.source.len();
        for (i, frame) in trace.source.iter().enumerate() {
            let _ = write!(s, "\n{:>8}: {}", depth - i, frame);
        }
    }
    s
}

fn render_audit(e: &AuditEntry) -> String {
    let mut path = e.api.bucket.clone();
    if !e.api.object.is_empty() {
        path.push('/');
        path.push_str(&e.api.object);
    }
    format!(
        "AUDIT {} {} /{} remote={} request={}",
        e.time.format(TIME_FORMAT),
        e.api.name,
        path,
        e.remote_host,
        e.request_id
    )
}
