pub mod entry;
pub mod request_info;
pub mod trace;
pub mod target;
pub mod logger;
pub mod audit;
pub mod console;
pub mod layer;

#[cfg(feature = "http")]
pub mod http_target;

pub mod env;
pub mod init;

pub use entry::{AuditEntry, Entry, Level, LogEntry};
pub use logger::{CriticalFault, Logger};
pub use request_info::{NoContext, RequestContext, RequestInfo};
pub use target::{SendError, Target};
