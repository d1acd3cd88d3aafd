use crate::entry::{Args, Entry, Level, LogEntry, TraceEntry, SYSTEM_API};
use crate::logger::Logger;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns `ERROR` events into [`LogEntry`]s
/// and dispatches them to the logger's general targets.
///
/// Lets code that reports failures with `tracing::error!` reach the same
/// targets as [`Logger::log_if`]. Events emitted by this crate itself are
/// ignored, so a failing target cannot feed back into dispatch.
pub struct LoggerLayer {
    logger: Arc<Logger>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events turned into entries and dispatched.
    pub forwarded_events: Arc<AtomicU64>,
}

impl LoggerLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        LoggerLayer {
            logger,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<S> Layer<S> for LoggerLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > tracing::Level::ERROR || meta.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }
        if self.logger.is_disabled() {
            return;
        }

        let mut variables = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor { fields: &mut variables, message: &mut message };
        event.record(&mut visitor);

        let source = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => {
                let function = meta.module_path().unwrap_or_else(|| meta.target());
                vec![self.logger.collector().normalize(file, line, function)]
            }
            _ => Vec::new(),
        };

        let entry = LogEntry::new(Level::Error, Utc::now())
            .with_api(SYSTEM_API, Args::default())
            .with_trace(TraceEntry { message: message.unwrap_or_default(), source, variables });

        self.logger.targets().dispatch(&Entry::Log(entry));
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
    }
}

/// Collects event fields as strings; `message` is kept apart.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, String>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}
