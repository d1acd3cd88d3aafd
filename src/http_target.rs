use crate::entry::Entry;
use crate::target::{SendError, Target};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::runtime::Handle;

/// Configuration for [`HttpTarget`].
///
/// Every entry is POSTed as a single JSON document to `endpoint`.
#[derive(Clone, Debug)]
pub struct HttpTargetConfig {
    /// Full URL, e.g. "http://127.0.0.1:8080/logs"
    pub endpoint: String,
    /// Optional bearer token sent in `Authorization`.
    pub auth_token: Option<String>,
}

impl HttpTargetConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpTargetConfig { endpoint: endpoint.into(), auth_token: None }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpTargetError {
    #[error("no tokio runtime available to deliver the entry")]
    NoRuntime,
}

/// Webhook implementation of [`Target`].
///
/// `send` serializes the entry on the calling thread and hands the request
/// to a Tokio task, so the request path never waits on the network. There
/// is no retry; a failed delivery is reported through `tracing` and lost.
#[derive(Clone)]
pub struct HttpTarget {
    client: Client,
    config: HttpTargetConfig,
    runtime: Option<Handle>,
}

impl HttpTarget {
    /// Construct a target for the given endpoint.
    ///
    /// Deliveries run on the runtime of whoever calls `send`, unless one is
    /// pinned with [`with_runtime`](Self::with_runtime).
    pub fn new(config: HttpTargetConfig) -> Self {
        HttpTarget { client: Client::new(), config, runtime: None }
    }

    /// Deliver on `handle`, so `send` also works from non-runtime threads.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl Target for HttpTarget {
    fn send(&self, entry: &Entry) -> Result<(), SendError> {
        let handle = match &self.runtime {
            Some(h) => h.clone(),
            None => Handle::try_current().map_err(|_| HttpTargetError::NoRuntime)?,
        };

        let body = serde_json::to_vec(entry)?;
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let endpoint = self.config.endpoint.clone();
        handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                    tracing::warn!(%endpoint, %status, body = %text, "log webhook rejected entry");
                }
                Err(e) => tracing::warn!(%endpoint, error = %e, "log webhook delivery failed"),
            }
        });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.endpoint
    }
}
