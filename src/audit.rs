//! Per-request audit entries built from the request/response exchange.

use crate::entry::{AuditApi, AuditEntry, Entry};
use crate::logger::Logger;
use chrono::Utc;
use http::header::{HeaderMap, USER_AGENT};
use http::{Request, Response};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Response header carrying the deployment id.
pub const DEPLOYMENT_ID_HEADER: &str = "x-minio-deployment-id";

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-amz-request-id";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";
const FORWARDED: &str = "forwarded";

/// Route variables matched by the router (`bucket`, `object`, ...).
///
/// The router stores this in the request extensions; operations without a
/// bucket or object simply leave those keys out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars(BTreeMap<String, String>);

impl PathVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, val: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), val.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        PathVars(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One entry per header name, multiple values joined with `,` in the order
/// they were received. Names are in canonical form (`X-Amz-Meta-Color`).
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            (canonical_header_name(name.as_str()), joined)
        })
        .collect()
}

/// Upper-case the first letter and every letter after `-`, lower-case the
/// rest.
pub fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
            upper = c == '-';
            out
        })
        .collect()
}

/// Decode a query string the way HTML forms encode it and join repeated
/// keys with `,` in order of appearance.
pub fn flatten_query(query: Option<&str>) -> BTreeMap<String, String> {
    let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
        values.entry(decode_component(key)).or_default().push(decode_component(val));
    }
    values.into_iter().map(|(k, v)| (k, v.join(","))).collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Client address, honouring proxy headers before the socket peer.
pub fn source_ip<B>(req: &Request<B>) -> String {
    let headers = req.headers();
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(first) = header(X_FORWARDED_FOR).and_then(|v| v.split(',').next()) {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    if let Some(real) = header(X_REAL_IP).map(str::trim).filter(|v| !v.is_empty()) {
        return real.to_string();
    }
    if let Some(fwd) = header(FORWARDED).and_then(forwarded_for) {
        return fwd;
    }
    req.extensions()
        .get::<SocketAddr>()
        .map(|addr| addr.to_string())
        .unwrap_or_default()
}

/// `for=` of the first element of an RFC 7239 `Forwarded` header.
fn forwarded_for(value: &str) -> Option<String> {
    let first = value.split(',').next()?;
    first
        .split(';')
        .filter_map(|kv| kv.trim().split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case("for"))
        .map(|(_, v)| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Assemble the audit entry for one exchange, stamped now.
pub fn build_entry<B1, B2>(req: &Request<B1>, resp: &Response<B2>, api: &str) -> AuditEntry {
    let vars = req.extensions().get::<PathVars>();
    let var = |key: &str| vars.and_then(|v| v.get(key)).unwrap_or_default().to_string();

    let api = AuditApi { name: api.to_string(), bucket: var("bucket"), object: var("object") };
    let mut entry = AuditEntry::new(api, Utc::now());
    entry.deployment_id = header_str(resp.headers(), DEPLOYMENT_ID_HEADER);
    entry.request_id = header_str(resp.headers(), REQUEST_ID_HEADER);
    entry.user_agent = header_str(req.headers(), USER_AGENT.as_str());
    entry.remote_host = source_ip(req);
    entry.request_query = flatten_query(req.uri().query());
    entry.request_header = flatten_headers(req.headers());
    entry.response_header = flatten_headers(resp.headers());
    entry
}

impl Logger {
    /// Record one request/response exchange to every audit target.
    ///
    /// Runs once per request from the completion middleware; independent of
    /// error logging and of [`set_disabled`](Logger::set_disabled).
    pub fn audit<B1, B2>(&self, req: &Request<B1>, resp: &Response<B2>, api: &str) {
        if self.audit_targets().is_empty() {
            return;
        }
        let entry = build_entry(req, resp, api);
        self.audit_targets().dispatch(&Entry::Audit(entry));
    }
}
