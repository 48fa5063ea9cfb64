//! Call-site performance cursor.
//!
//! A [`Cursor`] is a long-lived factory owned by an instrumented component. Each
//! [`click`](Cursor::click) starts a span ([`Pointer`]) that measures the code
//! up to its [`release`](Pointer::release) and records the result in the
//! `rk_cursor_elapsedNano` summary.
//!
//! ```rust,ignore
//! fn load_order(cursor: &Cursor, id: u64) -> Result<Order, StoreError> {
//!     let mut ptr = rk_cursor::click!(cursor);
//!     let result = ptr.observe(store.get(id));
//!     ptr.release();
//!     result
//! }
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! click() ──► active ──observe_error/print_error──► active ──release()──► consumed
//! ```
//!
//! `release` takes the pointer by value, so a span is recorded at most once.
//! A pointer dropped without `release` records nothing; wrap it with
//! [`Pointer::into_guard`] to release on scope exit instead.

use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Span, error, info_span};

use crate::error::CursorError;
use crate::event::Event;
use crate::frame::StackFrame;
use crate::guard::ReleaseGuard;
use crate::instrumentation::Instrumentation;

/// How the error counter on a structured event is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKeyFormat {
    /// `<operation>.ERROR`
    #[default]
    Dotted,
    /// `<operation>_ERROR`
    Underscore,
}

impl ErrorKeyFormat {
    pub fn counter_name(self, operation: &str) -> String {
        match self {
            ErrorKeyFormat::Dotted => format!("{operation}.ERROR"),
            ErrorKeyFormat::Underscore => format!("{operation}_ERROR"),
        }
    }
}

impl FromStr for ErrorKeyFormat {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dot" | "dotted" | "." => Ok(ErrorKeyFormat::Dotted),
            "underscore" | "_" => Ok(ErrorKeyFormat::Underscore),
            other => Err(CursorError::ConfigError(format!(
                "Unknown error key format '{other}', expected dot or underscore"
            ))),
        }
    }
}

/// Everything a pointer creator receives for one span.
#[derive(Debug)]
pub struct Payload {
    pub start: Instant,
    pub operation: String,
    pub parent: String,
    pub entry_name: Arc<str>,
    pub entry_type: Arc<str>,
    pub event: Option<Arc<dyn Event>>,
    pub logger: Span,
    pub error_key: ErrorKeyFormat,
    /// Location of the `click` call
    pub caller: &'static Location<'static>,
    pub instrumentation: Arc<Instrumentation>,
}

/// One measured span.
pub trait Pointer: Send {
    /// Name of the function that started the span.
    fn operation(&self) -> &str;

    /// Name of the operation's caller, `"-"` for dependency code.
    fn parent(&self) -> &str;

    /// Message of the last observed error, if any.
    fn last_error(&self) -> Option<&str>;

    /// Mark the span as failed and hand the error back unchanged.
    fn observe_error<E: fmt::Display>(&mut self, err: E) -> E;

    /// Observe the error of a result, passing the result through.
    ///
    /// `Ok` leaves the span untouched.
    #[track_caller]
    fn observe<T, E: fmt::Display>(&mut self, result: Result<T, E>) -> Result<T, E>
    where
        Self: Sized,
    {
        match result {
            Ok(value) => Ok(value),
            Err(err) => Err(self.observe_error(err)),
        }
    }

    /// Log an error with the first-party stack at ERROR level.
    fn print_error(&self, err: &dyn fmt::Display);

    /// Record the span. Consumes the pointer.
    fn release(self)
    where
        Self: Sized;

    /// Release automatically when the returned guard goes out of scope.
    fn into_guard(self) -> ReleaseGuard<Self>
    where
        Self: Sized,
    {
        ReleaseGuard::new(self)
    }
}

/// Default pointer.
#[derive(Debug)]
pub struct BasicPointer {
    payload: Payload,
    err: Option<String>,
}

impl BasicPointer {
    pub fn new(payload: Payload) -> Self {
        Self { payload, err: None }
    }

    pub fn entry_name(&self) -> &str {
        &self.payload.entry_name
    }

    pub fn entry_type(&self) -> &str {
        &self.payload.entry_type
    }

    pub fn caller(&self) -> &'static Location<'static> {
        self.payload.caller
    }

    pub fn elapsed(&self) -> Duration {
        self.payload.start.elapsed()
    }

    fn log_error(&self, err: &dyn fmt::Display, stack: &[StackFrame], caller: &Location<'_>) {
        let message = format_error(err, stack);
        self.payload.logger.in_scope(|| {
            error!(
                caller = %format_args!("{}:{}", caller.file(), caller.line()),
                operation = %self.payload.operation,
                "{message}"
            );
        });
    }
}

impl Pointer for BasicPointer {
    fn operation(&self) -> &str {
        &self.payload.operation
    }

    fn parent(&self) -> &str {
        &self.payload.parent
    }

    fn last_error(&self) -> Option<&str> {
        self.err.as_deref()
    }

    fn observe_error<E: fmt::Display>(&mut self, err: E) -> E {
        self.err = Some(err.to_string());
        if let Some(event) = &self.payload.event {
            event.inc_counter(
                &self.payload.error_key.counter_name(&self.payload.operation),
                1,
            );
        }
        err
    }

    #[track_caller]
    fn print_error(&self, err: &dyn fmt::Display) {
        let caller = Location::caller();
        let stack = self
            .payload
            .instrumentation
            .resolver()
            .capture_stack(caller);
        self.log_error(err, &stack, caller);
    }

    fn release(self) {
        let Payload {
            start,
            operation,
            parent,
            entry_name,
            entry_type,
            event,
            instrumentation,
            ..
        } = self.payload;

        let elapsed_nanos = start.elapsed().as_nanos() as f64;
        instrumentation.observe(
            elapsed_nanos,
            &parent,
            &operation,
            &entry_name,
            &entry_type,
            self.err.is_none(),
        );

        if let Some(event) = event {
            event.end_timer(&operation);
        }
    }
}

/// Pointer that keeps the stack of the first observed error.
///
/// [`print_error`](Pointer::print_error) prints that stack instead of the one
/// at the print site.
#[derive(Debug)]
pub struct StackPointer {
    inner: BasicPointer,
    stack: Vec<StackFrame>,
}

impl StackPointer {
    pub fn new(payload: Payload) -> Self {
        Self {
            inner: BasicPointer::new(payload),
            stack: Vec::new(),
        }
    }

    /// Stack captured at the first observed error.
    pub fn stack(&self) -> &[StackFrame] {
        &self.stack
    }
}

impl Pointer for StackPointer {
    fn operation(&self) -> &str {
        self.inner.operation()
    }

    fn parent(&self) -> &str {
        self.inner.parent()
    }

    fn last_error(&self) -> Option<&str> {
        self.inner.last_error()
    }

    #[track_caller]
    fn observe_error<E: fmt::Display>(&mut self, err: E) -> E {
        if self.inner.err.is_none() {
            self.stack = self
                .inner
                .payload
                .instrumentation
                .resolver()
                .capture_stack(Location::caller());
        }
        self.inner.observe_error(err)
    }

    #[track_caller]
    fn print_error(&self, err: &dyn fmt::Display) {
        if self.stack.is_empty() {
            self.inner.print_error(err);
        } else {
            self.inner.log_error(err, &self.stack, Location::caller());
        }
    }

    fn release(self) {
        self.inner.release();
    }
}

/// Format an error followed by one numbered line per frame.
pub fn format_error(err: &dyn fmt::Display, stack: &[StackFrame]) -> String {
    let mut out = err.to_string();
    for (i, frame) in stack.iter().enumerate() {
        out.push_str(&format!(
            "\n{})\t{}\t{}:{}",
            i + 1,
            frame.function,
            frame.file,
            frame.line
        ));
    }
    out
}

type Creator<P> = Arc<dyn Fn(Payload) -> P + Send + Sync>;

/// Factory of spans for one instrumented entry.
pub struct Cursor<P = BasicPointer> {
    entry_name: Arc<str>,
    entry_type: Arc<str>,
    event: Option<Arc<dyn Event>>,
    logger: Span,
    error_key: ErrorKeyFormat,
    instrumentation: Arc<Instrumentation>,
    creator: Creator<P>,
}

impl Cursor<BasicPointer> {
    pub fn builder() -> CursorBuilder<BasicPointer> {
        CursorBuilder::new()
    }
}

impl<P: Pointer> Cursor<P> {
    /// Start a span named by the instrumentation's resolver.
    #[track_caller]
    pub fn click(&self) -> P {
        let start = Instant::now();
        let caller = Location::caller();
        let site = self.instrumentation.resolver().resolve(caller);
        self.create(start, site.operation, site.parent, self.event.clone(), caller)
    }

    /// Start a span with an explicit operation name.
    #[track_caller]
    pub fn click_named(&self, operation: &str) -> P {
        let start = Instant::now();
        let caller = Location::caller();
        let parent = self.instrumentation.resolver().resolve_parent(caller);
        self.create(start, operation.to_string(), parent, self.event.clone(), caller)
    }

    /// Start a span reporting to `event` instead of the cursor's default.
    #[track_caller]
    pub fn click_with_event(&self, event: Arc<dyn Event>) -> P {
        let start = Instant::now();
        let caller = Location::caller();
        let site = self.instrumentation.resolver().resolve(caller);
        self.create(start, site.operation, site.parent, Some(event), caller)
    }

    fn create(
        &self,
        start: Instant,
        operation: String,
        parent: String,
        event: Option<Arc<dyn Event>>,
        caller: &'static Location<'static>,
    ) -> P {
        if let Some(event) = &event {
            event.start_timer(&operation);
        }
        (self.creator)(Payload {
            start,
            operation,
            parent,
            entry_name: Arc::clone(&self.entry_name),
            entry_type: Arc::clone(&self.entry_type),
            event,
            logger: self.logger.clone(),
            error_key: self.error_key,
            caller,
            instrumentation: Arc::clone(&self.instrumentation),
        })
    }
}

impl<P> Cursor<P> {
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    pub fn error_key(&self) -> ErrorKeyFormat {
        self.error_key
    }

    pub fn instrumentation(&self) -> &Arc<Instrumentation> {
        &self.instrumentation
    }
}

impl<P> Clone for Cursor<P> {
    fn clone(&self) -> Self {
        Self {
            entry_name: Arc::clone(&self.entry_name),
            entry_type: Arc::clone(&self.entry_type),
            event: self.event.clone(),
            logger: self.logger.clone(),
            error_key: self.error_key,
            instrumentation: Arc::clone(&self.instrumentation),
            creator: Arc::clone(&self.creator),
        }
    }
}

impl<P> fmt::Debug for Cursor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("entry_name", &self.entry_name)
            .field("entry_type", &self.entry_type)
            .field("has_event", &self.event.is_some())
            .field("error_key", &self.error_key)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Cursor`].
pub struct CursorBuilder<P> {
    entry_name: String,
    entry_type: String,
    event: Option<Arc<dyn Event>>,
    logger: Option<Span>,
    error_key: Option<ErrorKeyFormat>,
    instrumentation: Option<Arc<Instrumentation>>,
    creator: Creator<P>,
}

impl CursorBuilder<BasicPointer> {
    pub fn new() -> Self {
        Self {
            entry_name: String::new(),
            entry_type: String::new(),
            event: None,
            logger: None,
            error_key: None,
            instrumentation: None,
            creator: Arc::new(BasicPointer::new),
        }
    }
}

impl Default for CursorBuilder<BasicPointer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> CursorBuilder<P> {
    /// Entry name label. Empty keeps the registry's value.
    pub fn entry_name(mut self, name: impl Into<String>) -> Self {
        self.entry_name = name.into();
        self
    }

    /// Entry type label. Empty keeps the registry's value.
    pub fn entry_type(mut self, ty: impl Into<String>) -> Self {
        self.entry_type = ty.into();
        self
    }

    /// Default structured event for every span.
    pub fn event(mut self, event: Arc<dyn Event>) -> Self {
        self.event = Some(event);
        self
    }

    /// Span that `print_error` logs within (default: a `cursor` span with the entry labels).
    pub fn logger(mut self, logger: Span) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Error counter format (default: the instrumentation's).
    pub fn error_key(mut self, format: ErrorKeyFormat) -> Self {
        self.error_key = Some(format);
        self
    }

    /// Instrumentation to record into (default: [`Instrumentation::global`]).
    pub fn instrumentation(mut self, instrumentation: Arc<Instrumentation>) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Replace the pointer construction strategy.
    pub fn creator<Q, F>(self, creator: F) -> CursorBuilder<Q>
    where
        F: Fn(Payload) -> Q + Send + Sync + 'static,
    {
        CursorBuilder {
            entry_name: self.entry_name,
            entry_type: self.entry_type,
            event: self.event,
            logger: self.logger,
            error_key: self.error_key,
            instrumentation: self.instrumentation,
            creator: Arc::new(creator),
        }
    }

    pub fn build(self) -> Cursor<P> {
        let logger = self.logger.unwrap_or_else(|| {
            info_span!(
                "cursor",
                entry_name = %self.entry_name,
                entry_type = %self.entry_type
            )
        });
        let instrumentation = self
            .instrumentation
            .unwrap_or_else(Instrumentation::global);
        Cursor {
            entry_name: Arc::from(self.entry_name),
            entry_type: Arc::from(self.entry_type),
            event: self.event,
            logger,
            error_key: self.error_key.unwrap_or_else(|| instrumentation.error_key()),
            instrumentation,
            creator: self.creator,
        }
    }
}

/// Start a span named after the enclosing function.
///
/// Resolves the name at compile time, so it works without debug info.
///
/// ```rust,ignore
/// fn create_order(cursor: &Cursor) {
///     let ptr = rk_cursor::click!(cursor);
///     assert_eq!(ptr.operation(), "create_order");
///     ptr.release();
/// }
/// ```
#[macro_export]
macro_rules! click {
    ($cursor:expr) => {{
        fn __rk_cursor_here() {}
        fn __rk_cursor_type_name<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = __rk_cursor_type_name(__rk_cursor_here);
        let name = name.strip_suffix("::__rk_cursor_here").unwrap_or(name);
        $cursor.click_named(&$crate::frame::normalize_function_name(name))
    }};
}
