//! Call-site name resolution.
//!
//! Turns raw symbol names into short, stable operation labels and decides
//! whether a frame belongs to first-party code or to a dependency.
//!
//! # Naming
//!
//! ```text
//! my_app::handlers::create_order          -> create_order
//! my_app::orders::Store::insert           -> Store.insert
//! <my_app::Store as core::fmt::Debug>::fmt -> Store.fmt
//! my_app::worker::run::{{closure}}         -> run
//! github.com/acme/pkg.(*Store).Insert      -> pkg.Store.Insert
//! ```
//!
//! # Vendor boundary
//!
//! A frame whose source path contains one of the configured markers is treated
//! as dependency code. The `@` marker matches module caches that store
//! dependencies under `name@version`; the cargo and toolchain markers cover
//! crates.io/git dependencies and the standard library. This is a heuristic:
//! a first-party path containing a marker is misclassified.
//!
//! # Resolvers
//!
//! [`ExplicitNames`] never inspects the stack; call sites name their spans via
//! [`Cursor::click_named`](crate::cursor::Cursor::click_named) or the
//! [`click!`](crate::click) macro. `StackResolver` (feature `backtrace`)
//! symbolicates the live stack and anchors on the caller location recorded by
//! `#[track_caller]`, so inlining cannot shift the operation frame.

use std::fmt;
use std::panic::Location;
use std::path::Path;

/// Operation name used when a frame cannot be resolved.
pub const UNKNOWN_OPERATION: &str = "unknown";

/// Parent name used when the caller is vendor code or unresolved.
pub const NO_PARENT: &str = "-";

/// Maximum number of frames kept by [`capture_filtered_stack`].
pub const MAX_STACK_DEPTH: usize = 32;

/// Default vendor path markers.
pub const DEFAULT_VENDOR_MARKERS: [&str; 4] = ["@", "/.cargo/registry/", "/.cargo/git/", "/rustc/"];

/// One resolved symbol on the call stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    /// Demangled function path, empty if unresolved
    pub function: String,
    /// Source file path, empty if unknown
    pub file: String,
    /// Source line, 0 if unknown
    pub line: u32,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

/// Operation and parent names resolved for one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub operation: String,
    pub parent: String,
}

impl Default for CallSite {
    fn default() -> Self {
        Self {
            operation: UNKNOWN_OPERATION.to_string(),
            parent: NO_PARENT.to_string(),
        }
    }
}

/// Path heuristic separating first-party frames from dependency frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorFilter {
    markers: Vec<String>,
}

impl VendorFilter {
    /// Create a filter from explicit markers. Empty markers are ignored.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Check whether a source path belongs to dependency code.
    pub fn is_vendor(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let path = path.replace('\\', "/");
        self.markers.iter().any(|marker| path.contains(marker.as_str()))
    }
}

impl Default for VendorFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR_MARKERS)
    }
}

// =============================================================================
// Name Normalization
// =============================================================================

/// Normalize a raw function path into a short operation label.
///
/// Returns [`UNKNOWN_OPERATION`] when nothing usable remains.
pub fn normalize_function_name(raw: &str) -> String {
    let raw = strip_hash_suffix(raw.trim());
    if raw.is_empty() {
        return UNKNOWN_OPERATION.to_string();
    }

    if !raw.contains("::") {
        return normalize_slash_path(raw);
    }

    let mut segments = split_top_level(raw);
    while segments
        .last()
        .is_some_and(|s| is_closure_segment(s) || (segments.len() > 1 && s.starts_with('<')))
    {
        segments.pop();
    }

    let Some(function) = segments.pop() else {
        return UNKNOWN_OPERATION.to_string();
    };
    let function = clean_ident(strip_generics(function));
    if function.is_empty() {
        return UNKNOWN_OPERATION.to_string();
    }

    match segments.last().and_then(|s| receiver_of(s)) {
        Some(receiver) => format!("{receiver}.{function}"),
        None => function,
    }
}

/// Slash-qualified names: drop the package path, keep `pkg.(*Type).Method` minus markers.
fn normalize_slash_path(raw: &str) -> String {
    let tail = raw.rsplit('/').next().unwrap_or(raw);
    let cleaned: String = tail
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '*'))
        .collect();
    if cleaned.is_empty() {
        UNKNOWN_OPERATION.to_string()
    } else {
        cleaned
    }
}

/// Legacy mangling leaves `::h0123456789abcdef` when formatted without `{:#}`.
fn strip_hash_suffix(raw: &str) -> &str {
    match raw.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => raw,
    }
}

fn is_closure_segment(segment: &str) -> bool {
    segment.starts_with("{{") || segment.starts_with("{closure") || segment.starts_with("{shim")
}

/// Split on `::` outside of angle brackets.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut prev = '\0';
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            '<' => depth += 1,
            '>' if prev != '-' => depth = depth.saturating_sub(1),
            ':' if depth == 0 && chars.peek().is_some_and(|&(_, next)| next == ':') => {
                segments.push(raw.get(start..idx).unwrap_or_default());
                chars.next();
                start = idx + 2;
                prev = ':';
                continue;
            }
            _ => {}
        }
        prev = c;
    }
    segments.push(raw.get(start..).unwrap_or_default());
    segments.retain(|s| !s.is_empty());
    segments
}

fn strip_generics(segment: &str) -> &str {
    match segment.find('<') {
        Some(0) | None => segment,
        Some(idx) => segment.get(..idx).unwrap_or(segment),
    }
}

fn clean_ident(segment: &str) -> String {
    let segment = segment.trim();
    let segment = segment.strip_prefix("&mut ").unwrap_or(segment);
    let segment = segment.strip_prefix("*mut ").unwrap_or(segment);
    let segment = segment.strip_prefix("*const ").unwrap_or(segment);
    segment
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '*' | '&' | '<' | '>' | ' '))
        .collect()
}

/// Receiver type name for a method, if the segment names a type.
fn receiver_of(segment: &str) -> Option<String> {
    if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        // `<Type as Trait>` or `<Type>`
        let ty = inner.split(" as ").next().unwrap_or(inner).trim();
        let ty = clean_ident_prefix(ty);
        let last = split_top_level(ty).pop().unwrap_or(ty);
        let name = clean_ident(strip_generics(last));
        return (!name.is_empty()).then_some(name);
    }

    let name = strip_generics(segment);
    if name.chars().next().is_some_and(char::is_uppercase) {
        Some(clean_ident(name))
    } else {
        None
    }
}

fn clean_ident_prefix(ty: &str) -> &str {
    let ty = ty.trim_start_matches('&');
    let ty = ty.strip_prefix("mut ").unwrap_or(ty);
    let ty = ty.strip_prefix("*mut ").unwrap_or(ty);
    ty.strip_prefix("*const ").unwrap_or(ty)
}

// =============================================================================
// Frame Resolution
// =============================================================================

/// Name of the frame `skip` entries into `frames`.
pub fn resolve_operation(frames: &[StackFrame], skip: usize) -> String {
    match frames.get(skip) {
        Some(frame) if !frame.function.is_empty() => normalize_function_name(&frame.function),
        _ => UNKNOWN_OPERATION.to_string(),
    }
}

/// Name of the frame one beyond `skip`, or [`NO_PARENT`] for vendor/unresolved frames.
pub fn resolve_parent(frames: &[StackFrame], skip: usize, filter: &VendorFilter) -> String {
    match frames.get(skip + 1) {
        Some(frame) if !frame.function.is_empty() && !filter.is_vendor(&frame.file) => {
            normalize_function_name(&frame.function)
        }
        _ => NO_PARENT.to_string(),
    }
}

/// First-party frames starting at `skip`, stopping before the first vendor frame.
pub fn capture_filtered_stack(
    frames: &[StackFrame],
    skip: usize,
    filter: &VendorFilter,
) -> Vec<StackFrame> {
    frames
        .iter()
        .skip(skip)
        .take(MAX_STACK_DEPTH)
        .take_while(|frame| !filter.is_vendor(&frame.file))
        .cloned()
        .collect()
}

/// Locate the frame executing at `caller`.
///
/// Prefers an exact file and line match; falls back to the first frame in the
/// same file.
pub fn find_caller_frame(frames: &[StackFrame], caller: &Location<'_>) -> Option<usize> {
    let in_caller_file = |frame: &StackFrame| {
        !frame.file.is_empty() && Path::new(&frame.file).ends_with(Path::new(caller.file()))
    };
    frames
        .iter()
        .position(|frame| frame.line == caller.line() && in_caller_file(frame))
        .or_else(|| frames.iter().position(in_caller_file))
}

// =============================================================================
// Resolvers
// =============================================================================

/// Strategy for naming spans from their call site.
pub trait NameResolver: Send + Sync + fmt::Debug {
    /// Resolve operation and parent names for a span started at `caller`.
    fn resolve(&self, caller: &'static Location<'static>) -> CallSite;

    /// Resolve only the parent of the function executing at `caller`.
    fn resolve_parent(&self, caller: &'static Location<'static>) -> String {
        self.resolve(caller).parent
    }

    /// First-party stack starting at the function executing at `caller`.
    fn capture_stack(&self, caller: &'static Location<'static>) -> Vec<StackFrame>;
}

/// Resolver that never inspects the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitNames;

impl NameResolver for ExplicitNames {
    fn resolve(&self, _caller: &'static Location<'static>) -> CallSite {
        CallSite::default()
    }

    fn capture_stack(&self, _caller: &'static Location<'static>) -> Vec<StackFrame> {
        Vec::new()
    }
}

#[cfg(feature = "backtrace")]
pub use stack::StackResolver;

#[cfg(feature = "backtrace")]
mod stack {
    use std::panic::Location;

    use super::{
        CallSite, NameResolver, StackFrame, VendorFilter, capture_filtered_stack,
        find_caller_frame, resolve_operation, resolve_parent,
    };

    /// Upper bound on symbols walked while looking for the caller frame.
    const MAX_WALK: usize = 128;

    /// Resolver that symbolicates the live call stack.
    ///
    /// Requires debug info; without it every call site resolves to
    /// `"unknown"` / `"-"`.
    #[derive(Debug, Clone, Default)]
    pub struct StackResolver {
        filter: VendorFilter,
    }

    impl StackResolver {
        pub fn new(filter: VendorFilter) -> Self {
            Self { filter }
        }

        pub fn filter(&self) -> &VendorFilter {
            &self.filter
        }

        /// Symbolicate the current stack, innermost first, inlined frames expanded.
        pub fn capture(limit: usize) -> Vec<StackFrame> {
            let mut frames = Vec::new();
            backtrace::trace(|frame| {
                backtrace::resolve_frame(frame, |symbol| {
                    frames.push(StackFrame {
                        function: symbol
                            .name()
                            .map(|name| format!("{name:#}"))
                            .unwrap_or_default(),
                        file: symbol
                            .filename()
                            .map(|path| path.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        line: symbol.lineno().unwrap_or(0),
                    });
                });
                frames.len() < limit
            });
            frames
        }
    }

    impl NameResolver for StackResolver {
        fn resolve(&self, caller: &'static Location<'static>) -> CallSite {
            let frames = Self::capture(MAX_WALK);
            match find_caller_frame(&frames, caller) {
                Some(idx) => CallSite {
                    operation: resolve_operation(&frames, idx),
                    parent: resolve_parent(&frames, idx, &self.filter),
                },
                None => CallSite::default(),
            }
        }

        fn capture_stack(&self, caller: &'static Location<'static>) -> Vec<StackFrame> {
            let frames = Self::capture(MAX_WALK);
            match find_caller_frame(&frames, caller) {
                Some(idx) => capture_filtered_stack(&frames, idx, &self.filter),
                None => Vec::new(),
            }
        }
    }
}
