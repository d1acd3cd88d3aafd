use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Version of the audit entry structure. Audit consumers key on this.
pub const AUDIT_VERSION: &str = "1";

/// API name used when an entry is produced outside of any request.
pub const SYSTEM_API: &str = "SYSTEM";

/// Severity carried by a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Info,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a timestamp in the wire format: UTC, RFC 3339, nine fractional digits.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn serialize_time<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_time(time))
}

fn is_empty<T: IsEmpty>(value: &T) -> bool {
    value.is_empty()
}

trait IsEmpty {
    fn is_empty(&self) -> bool;
}

impl IsEmpty for String {
    fn is_empty(&self) -> bool {
        String::is_empty(self)
    }
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl IsEmpty for BTreeMap<String, String> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

/// Arguments of the API call an error was raised in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Args {
    #[serde(skip_serializing_if = "is_empty")]
    pub bucket: String,
    #[serde(skip_serializing_if = "is_empty")]
    pub object: String,
    #[serde(skip_serializing_if = "is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Args {
    fn is_blank(&self) -> bool {
        self.bucket.is_empty() && self.object.is_empty() && self.metadata.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Api {
    #[serde(skip_serializing_if = "is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,
}

/// Error block of a [`LogEntry`]: the error message, the normalized call
/// stack (innermost first) and the request tags present at the time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraceEntry {
    #[serde(skip_serializing_if = "is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "is_empty")]
    pub source: Vec<String>,
    #[serde(skip_serializing_if = "is_empty")]
    pub variables: BTreeMap<String, String>,
}

/// A single structured log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(rename = "deploymentid", skip_serializing_if = "is_empty")]
    pub deployment_id: String,
    pub level: Level,
    #[serde(serialize_with = "serialize_time")]
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<Api>,
    #[serde(rename = "remotehost", skip_serializing_if = "is_empty")]
    pub remote_host: String,
    #[serde(rename = "requestID", skip_serializing_if = "is_empty")]
    pub request_id: String,
    #[serde(rename = "userAgent", skip_serializing_if = "is_empty")]
    pub user_agent: String,
    #[serde(skip_serializing_if = "is_empty")]
    pub message: String,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceEntry>,
}

impl LogEntry {
    /// Start an entry at `level`, stamped with the given time. All other
    /// fields start out empty and are filled in with the `with_*` setters.
    pub fn new(level: Level, time: DateTime<Utc>) -> Self {
        LogEntry {
            deployment_id: String::new(),
            level,
            time,
            api: None,
            remote_host: String::new(),
            request_id: String::new(),
            user_agent: String::new(),
            message: String::new(),
            trace: None,
        }
    }

    /// Attach the API context. An empty name falls back to [`SYSTEM_API`];
    /// `args` is dropped when it carries nothing.
    pub fn with_api(mut self, name: impl Into<String>, args: Args) -> Self {
        let mut name = name.into();
        if name.is_empty() {
            name = SYSTEM_API.to_string();
        }
        let args = if args.is_blank() { None } else { Some(args) };
        self.api = Some(Api { name, args });
        self
    }

    pub fn with_request(
        mut self,
        deployment_id: impl Into<String>,
        remote_host: impl Into<String>,
        request_id: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        self.deployment_id = deployment_id.into();
        self.remote_host = remote_host.into();
        self.request_id = request_id.into();
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_trace(mut self, trace: TraceEntry) -> Self {
        self.trace = Some(trace);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditApi {
    #[serde(skip_serializing_if = "is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "is_empty")]
    pub bucket: String,
    #[serde(skip_serializing_if = "is_empty")]
    pub object: String,
}

/// One audit record per served request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub version: &'static str,
    #[serde(rename = "deploymentid", skip_serializing_if = "is_empty")]
    pub deployment_id: String,
    #[serde(serialize_with = "serialize_time")]
    pub time: DateTime<Utc>,
    pub api: AuditApi,
    #[serde(rename = "remotehost", skip_serializing_if = "is_empty")]
    pub remote_host: String,
    #[serde(rename = "requestID", skip_serializing_if = "is_empty")]
    pub request_id: String,
    #[serde(rename = "userAgent", skip_serializing_if = "is_empty")]
    pub user_agent: String,
    #[serde(rename = "requestQuery", skip_serializing_if = "is_empty")]
    pub request_query: BTreeMap<String, String>,
    #[serde(rename = "requestHeader", skip_serializing_if = "is_empty")]
    pub request_header: BTreeMap<String, String>,
    #[serde(rename = "responseHeader", skip_serializing_if = "is_empty")]
    pub response_header: BTreeMap<String, String>,
}

impl AuditEntry {
    /// Empty audit entry for `api`, stamped with `time`. The version is fixed.
    pub fn new(api: AuditApi, time: DateTime<Utc>) -> Self {
        AuditEntry {
            version: AUDIT_VERSION,
            deployment_id: String::new(),
            time,
            api,
            remote_host: String::new(),
            request_id: String::new(),
            user_agent: String::new(),
            request_query: BTreeMap::new(),
            request_header: BTreeMap::new(),
            response_header: BTreeMap::new(),
        }
    }
}

/// What a [`Target`](crate::target::Target) receives. Serializes as the bare
/// inner entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    Log(LogEntry),
    Audit(AuditEntry),
}

impl Entry {
    pub fn time(&self) -> &DateTime<Utc> {
        match self {
            Entry::Log(e) => &e.time,
            Entry::Audit(e) => &e.time,
        }
    }

    pub fn as_log(&self) -> Option<&LogEntry> {
        match self {
            Entry::Log(e) => Some(e),
            Entry::Audit(_) => None,
        }
    }

    pub fn as_audit(&self) -> Option<&AuditEntry> {
        match self {
            Entry::Audit(e) => Some(e),
            Entry::Log(_) => None,
        }
    }
}

impl From<LogEntry> for Entry {
    fn from(entry: LogEntry) -> Self {
        Entry::Log(entry)
    }
}

impl From<AuditEntry> for Entry {
    fn from(entry: AuditEntry) -> Self {
        Entry::Audit(entry)
    }
}
