use crate::entry::Entry;
use std::error::Error;
use std::sync::Arc;

/// Failure reported by a [`Target`]. Opaque to the dispatcher.
pub type SendError = Box<dyn Error + Send + Sync>;

/// Destination for [`Entry`] values produced by the logger and the audit
/// pipeline.
///
/// Implementations own their transport (console, HTTP, a queue, ...). The
/// dispatcher calls `send` synchronously on the request path and from many
/// requests at once, so implementations must be cheap and must tolerate
/// concurrent calls; anything slow belongs on a background task.
pub trait Target: Send + Sync {
    /// Deliver a single entry.
    ///
    /// **Returns**
    /// - `Ok(())` if the target accepted the entry.
    /// - `Err(..)` if it could not. The dispatcher records the failure and
    ///   moves on to the next target; the caller that logged never sees it.
    fn send(&self, entry: &Entry) -> Result<(), SendError>;

    /// Short name used in diagnostics.
    fn name(&self) -> &str {
        "target"
    }
}

/// Ordered, append-only set of targets.
#[derive(Clone, Default)]
pub struct Targets {
    targets: Vec<Arc<dyn Target>>,
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `target`. Duplicates are kept; nothing is ever removed.
    pub fn add(&mut self, target: Arc<dyn Target>) {
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Send `entry` to every target in registration order. Failures are
    /// logged and otherwise ignored.
    pub fn dispatch(&self, entry: &Entry) {
        for target in &self.targets {
            if let Err(e) = target.send(entry) {
                tracing::warn!(target: "server_log_sink::dispatch", sink = target.name(), error = %e, "log target send failed");
            }
        }
    }
}

impl std::fmt::Debug for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.targets.iter().map(|t| t.name())).finish()
    }
}
