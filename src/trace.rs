//! Call-stack capture and normalization for error traces.
//!
//! Raw frames come from a [`StackWalker`]; everything else here (path
//! trimming, runtime filtering, the boundary cut-off) works on plain
//! [`Frame`] values, so tests can feed a fixed stack.

use std::ffi::OsStr;
use std::iter::FusedIterator;
use std::sync::Arc;

/// File name reported for frames without debug location info.
pub const AUTOGENERATED_FILE: &str = "<autogenerated>";

/// Function-name prefixes of the language runtime and the async scheduler.
/// Frames from these are never part of a trace.
pub const RUNTIME_PREFIXES: &[&str] = &[
    "std::rt::",
    "std::sys::",
    "std::sys_common::",
    "std::panicking::",
    "std::panic::",
    "std::thread::",
    "core::ops::function::",
    "core::future::",
    "core::pin::",
    "core::panic::",
    "alloc::boxed::",
    "backtrace::",
    "tokio::",
    "test::",
    "__rust",
];

/// Request entry points. A trace stops after the first frame whose function
/// is one of these (or ends in `::<name>`), so dispatch-layer frames below
/// the handler never leak into logged traces. Closure and generic suffixes
/// are ignored, which makes `async fn` handlers match too.
pub const DEFAULT_BOUNDARY_FUNCS: &[&str] = &[
    "serve_http",
    "server_main",
    "start_gateway",
    "WebApiHandlers::list_buckets",
    "WebApiHandlers::make_bucket",
    "WebApiHandlers::delete_bucket",
    "WebApiHandlers::list_objects",
    "WebApiHandlers::remove_object",
    "WebApiHandlers::login",
    "WebApiHandlers::generate_auth",
    "WebApiHandlers::set_auth",
    "WebApiHandlers::get_auth",
    "WebApiHandlers::create_url_token",
    "WebApiHandlers::upload",
    "WebApiHandlers::download",
    "WebApiHandlers::download_zip",
    "WebApiHandlers::get_bucket_policy",
    "WebApiHandlers::list_all_bucket_policies",
    "WebApiHandlers::set_bucket_policy",
    "WebApiHandlers::presigned_get",
    "WebApiHandlers::server_info",
    "WebApiHandlers::storage_info",
];

/// One raw stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Frame { file: file.into(), line, function: function.into() }
    }
}

/// Frames produced by a [`StackWalker`], innermost first.
pub type Frames = Box<dyn Iterator<Item = Frame>>;

/// Platform capability: produce the current call stack, innermost first.
///
/// `skip == 0` is the function that called `walk`. A walker that cannot
/// reach `skip` yields nothing. Frames may be produced lazily; a trace
/// stops pulling at the boundary.
pub trait StackWalker: Send + Sync {
    fn walk(&self, skip: usize) -> Frames;
}

/// [`StackWalker`] backed by the `backtrace` crate.
///
/// Only instruction pointers are captured up front. Symbols are resolved
/// as frames are pulled, so frames below a boundary are never resolved.
/// Inlined functions appear as their own frames. Under heavy optimization
/// frames can disappear altogether, so skip depths are best effort.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceWalker;

impl StackWalker for BacktraceWalker {
    #[inline(never)]
    fn walk(&self, skip: usize) -> Frames {
        let mut raw = Vec::new();
        backtrace::trace(|frame| {
            raw.push(frame.clone());
            true
        });

        // Everything up to and including this function is unwinder internals.
        let own = raw
            .iter()
            .position(|frame| {
                resolve(frame)
                    .iter()
                    .any(|f| f.function.contains("BacktraceWalker") && f.function.ends_with("::walk"))
            })
            .map(|i| i + 1)
            .unwrap_or(0);

        Box::new(raw.into_iter().skip(own).flat_map(|frame| resolve(&frame)).skip(skip))
    }
}

/// Symbols of one raw frame; more than one when calls were inlined.
fn resolve(frame: &backtrace::Frame) -> Vec<Frame> {
    let mut symbols = Vec::new();
    backtrace::resolve_frame(frame, |symbol| {
        // `{:#}` drops the trailing symbol hash.
        let function = symbol.name().map(|n| format!("{:#}", n)).unwrap_or_default();
        let file = symbol
            .filename()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| AUTOGENERATED_FILE.to_string());
        symbols.push(Frame { file, line: symbol.lineno().unwrap_or(0), function });
    });
    symbols
}

/// Path prefixes stripped from source file names, applied in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimRules {
    prefixes: Vec<String>,
}

impl TrimRules {
    /// Rules from literal prefixes. Empty prefixes are ignored.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = TrimRules::default();
        for p in prefixes {
            rules.push(to_slash(p.as_ref()));
        }
        rules
    }

    /// Build rules from build-environment path lists.
    ///
    /// Each list uses the platform path-list separator (`:` or `;`). Every
    /// root contributes `<root>/src/`. Duplicates keep their first position.
    /// `project_prefix`, when given, is appended last so it also applies to
    /// paths that were already shortened by a root rule.
    pub fn from_roots<L>(path_lists: &[L], project_prefix: Option<&str>) -> Self
    where
        L: AsRef<OsStr>,
    {
        let mut rules = TrimRules::default();
        for list in path_lists {
            for root in std::env::split_paths(list) {
                if root.as_os_str().is_empty() {
                    continue;
                }
                let src = root.join("src");
                rules.push(with_trailing_slash(to_slash(&src.to_string_lossy())));
            }
        }
        if let Some(prefix) = project_prefix.filter(|p| !p.is_empty()) {
            rules.push(with_trailing_slash(to_slash(prefix)));
        }
        rules
    }

    fn push(&mut self, prefix: String) {
        if !prefix.is_empty() && !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Strip known prefixes from `file` and normalize separators to `/`.
    ///
    /// Rules run in order and repeat until nothing changes, so trimming an
    /// already trimmed path is a no-op.
    pub fn trim(&self, file: &str) -> String {
        let mut f = to_slash(file);
        loop {
            let before = f.len();
            for prefix in &self.prefixes {
                if let Some(rest) = f.strip_prefix(prefix.as_str()) {
                    f = rest.to_string();
                }
            }
            if f.len() == before {
                return f;
            }
        }
    }
}

fn to_slash(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn with_trailing_slash(mut path: String) -> String {
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

/// Whether `function` belongs to the runtime or the async scheduler.
///
/// Trait impl frames (`<A as B>::method`) count when either the self type or
/// the trait is a runtime item, e.g.
/// `<F as core::ops::function::FnOnce<()>>::call_once`. Symbols without a
/// module path come from C code (`start_thread`, `__libc_start_main`).
pub fn is_runtime_frame(function: &str) -> bool {
    let runtime = |path: &str| {
        let path = strip_type_qualifiers(path);
        RUNTIME_PREFIXES.iter().any(|p| path.starts_with(p))
    };
    match impl_parts(function) {
        Some((self_ty, Some(trait_path))) => runtime(self_ty) || runtime(trait_path),
        Some((self_ty, None)) => runtime(self_ty),
        None => !function.contains("::") || runtime(function),
    }
}

fn strip_type_qualifiers(mut path: &str) -> &str {
    loop {
        let next = path
            .trim_start_matches(['&', '*'])
            .trim_start_matches("mut ")
            .trim_start_matches("const ")
            .trim_start_matches("dyn ");
        if next.len() == path.len() {
            return path;
        }
        path = next;
    }
}

/// Splits `<Self as Trait>::rest` (or `<Self>::rest`) into its self type and
/// trait. `None` for plain paths.
fn impl_parts(function: &str) -> Option<(&str, Option<&str>)> {
    let inner = function.strip_prefix('<')?;
    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    let mut as_at = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            // `->` in fn pointer types is not a bracket.
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'<' => depth += 1,
            b'>' if depth == 0 => {
                return Some(match as_at {
                    Some(at) => (&inner[..at], Some(&inner[at + 4..i])),
                    None => (&inner[..i], None),
                });
            }
            b'>' => depth -= 1,
            b' ' if depth == 0 && as_at.is_none() && inner[i..].starts_with(" as ") => as_at = Some(i),
            _ => {}
        }
    }
    None
}

/// `function` without trailing closure (`{{closure}}`, `{closure#N}`) and
/// generic argument (`::<T>`) segments.
fn item_path(function: &str) -> &str {
    let mut name = function;
    loop {
        let next = name
            .strip_suffix("::{{closure}}")
            .or_else(|| strip_closure_index(name))
            .or_else(|| strip_generic_args(name));
        match next {
            Some(head) => name = head,
            None => return name,
        }
    }
}

fn strip_closure_index(name: &str) -> Option<&str> {
    let start = name.rfind("::{closure#")?;
    let tail = &name[start + "::{closure#".len()..];
    let digits = tail.strip_suffix('}')?;
    if digits.chars().all(|c| c.is_ascii_digit()) {
        Some(&name[..start])
    } else {
        None
    }
}

fn strip_generic_args(name: &str) -> Option<&str> {
    if !name.ends_with('>') {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in name.char_indices().rev() {
        match c {
            '>' if name[..i].ends_with('-') => {}
            '>' => depth += 1,
            '<' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return name[..i].strip_suffix("::");
                }
            }
            _ => {}
        }
    }
    None
}

/// Produces normalized traces. Built once at startup and shared read-only.
#[derive(Clone)]
pub struct TraceCollector {
    rules: Arc<TrimRules>,
    boundary: Vec<String>,
    walker: Arc<dyn StackWalker>,
}

impl std::fmt::Debug for TraceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceCollector")
            .field("rules", &self.rules)
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

impl Default for TraceCollector {
    fn default() -> Self {
        TraceCollector::new(TrimRules::default())
    }
}

impl TraceCollector {
    /// Collector using the default boundary set and [`BacktraceWalker`].
    pub fn new(rules: TrimRules) -> Self {
        TraceCollector {
            rules: Arc::new(rules),
            boundary: DEFAULT_BOUNDARY_FUNCS.iter().map(|s| s.to_string()).collect(),
            walker: Arc::new(BacktraceWalker),
        }
    }

    pub fn with_walker(mut self, walker: Arc<dyn StackWalker>) -> Self {
        self.walker = walker;
        self
    }

    /// Add entry-point names to the boundary set.
    pub fn with_boundary<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.boundary.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn rules(&self) -> &TrimRules {
        &self.rules
    }

    pub fn is_boundary(&self, function: &str) -> bool {
        let function = item_path(function);
        self.boundary.iter().any(|name| {
            function == name
                || function
                    .strip_suffix(name.as_str())
                    .is_some_and(|head| head.ends_with("::"))
        })
    }

    /// `"<file>:<line>:<function>()"` with the file trimmed.
    pub fn normalize(&self, file: &str, line: u32, function: &str) -> String {
        format!("{}:{}:{}()", self.rules.trim(file), line, function)
    }

    /// Full trace starting `skip` frames above this call (`skip == 0` is the
    /// function calling `collect`). Never fails; an unreachable depth yields
    /// a short or empty trace.
    #[inline(never)]
    pub fn collect(&self, skip: usize) -> Trace<'_> {
        // One extra frame for `collect` itself.
        Trace { frames: self.walker.walk(skip + 1), collector: self, done: false }
    }

    /// Normalize an already captured stack.
    pub fn trace_of<I>(&self, frames: I) -> Trace<'_>
    where
        I: IntoIterator<Item = Frame>,
        I::IntoIter: 'static,
    {
        Trace { frames: Box::new(frames.into_iter()), collector: self, done: false }
    }

    /// Location of a single frame, `skip` frames above the caller of
    /// `source`. Empty when the stack is not that deep.
    #[inline(never)]
    pub fn source(&self, skip: usize) -> String {
        match self.walker.walk(skip + 1).next() {
            Some(frame) => self.normalize(&frame.file, frame.line, &frame.function),
            None => String::new(),
        }
    }
}

/// Lazy normalized trace, innermost frame first. Consumed once.
pub struct Trace<'a> {
    frames: Frames,
    collector: &'a TraceCollector,
    done: bool,
}

impl Iterator for Trace<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        for frame in self.frames.by_ref() {
            let file = self.collector.rules.trim(&frame.file);
            if file.starts_with(AUTOGENERATED_FILE) || is_runtime_frame(&frame.function) {
                continue;
            }
            if self.collector.is_boundary(&frame.function) {
                self.done = true;
            }
            return Some(format!("{}:{}:{}()", file, frame.line, frame.function));
        }
        self.done = true;
        None
    }
}

impl FusedIterator for Trace<'_> {}
