use parking_lot::RwLock;

/// A single request tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub val: String,
}

impl KeyVal {
    pub fn new(key: impl Into<String>, val: impl Into<String>) -> Self {
        KeyVal { key: key.into(), val: val.into() }
    }
}

/// Identity and metadata of the request being served.
///
/// Populated by the request-handling layer and stored in the request's
/// extensions; the logging paths only read it. Tags may be added while the
/// request runs, from any task that holds a reference.
#[derive(Debug, Default)]
pub struct RequestInfo {
    pub remote_host: String,
    pub user_agent: String,
    pub deployment_id: String,
    pub request_id: String,
    pub api: String,
    pub bucket_name: String,
    pub object_name: String,
    tags: RwLock<Vec<KeyVal>>,
}

impl RequestInfo {
    pub fn new(request_id: impl Into<String>, remote_host: impl Into<String>, user_agent: impl Into<String>) -> Self {
        RequestInfo {
            request_id: request_id.into(),
            remote_host: remote_host.into(),
            user_agent: user_agent.into(),
            ..RequestInfo::default()
        }
    }

    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket_name = bucket.into();
        self
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object_name = object.into();
        self
    }

    pub fn with_deployment_id(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = deployment_id.into();
        self
    }

    /// Append a tag, keeping any earlier tag with the same key.
    pub fn append_tags(&self, key: impl Into<String>, val: impl Into<String>) -> &Self {
        self.tags.write().push(KeyVal::new(key, val));
        self
    }

    /// Replace the value of `key`, or append it if not present yet.
    pub fn set_tags(&self, key: impl Into<String>, val: impl Into<String>) -> &Self {
        let key = key.into();
        let val = val.into();
        let mut tags = self.tags.write();
        match tags.iter_mut().find(|kv| kv.key == key) {
            Some(kv) => kv.val = val,
            None => tags.push(KeyVal { key, val }),
        }
        self
    }

    /// Snapshot of the tags in insertion order.
    pub fn tags(&self) -> Vec<KeyVal> {
        self.tags.read().clone()
    }
}

/// Lookup of the [`RequestInfo`] attached to whatever the caller holds.
///
/// Must be cheap and never block on I/O: it is called on every logged error.
pub trait RequestContext {
    fn request_info(&self) -> Option<&RequestInfo>;
}

/// Context for code running outside of any request (startup, background
/// jobs). Entries produced with it carry the `SYSTEM` API name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl RequestContext for NoContext {
    fn request_info(&self) -> Option<&RequestInfo> {
        None
    }
}

impl RequestContext for RequestInfo {
    fn request_info(&self) -> Option<&RequestInfo> {
        Some(self)
    }
}

impl RequestContext for Option<&RequestInfo> {
    fn request_info(&self) -> Option<&RequestInfo> {
        *self
    }
}

impl RequestContext for std::sync::Arc<RequestInfo> {
    fn request_info(&self) -> Option<&RequestInfo> {
        Some(self.as_ref())
    }
}

impl RequestContext for http::Extensions {
    fn request_info(&self) -> Option<&RequestInfo> {
        self.get::<std::sync::Arc<RequestInfo>>().map(|info| info.as_ref())
    }
}

impl<B> RequestContext for http::Request<B> {
    fn request_info(&self) -> Option<&RequestInfo> {
        self.extensions().request_info()
    }
}
