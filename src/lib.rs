//! # rk_cursor
//!
//! A call-site performance cursor: measure the latency and outcome of any
//! code span and export it as a low-cardinality Prometheus summary, without
//! threading span names through every call.
//!
//! - **Automatic naming**: operation and parent resolved from the call site
//!   (compile-time via [`click!`], or by walking the stack with the
//!   `backtrace` feature)
//! - **Fixed label schema**: process identity plus parent/operation/status
//! - **Structured events**: optional per-request timers and error counters
//! - **Never in the way**: instrumentation failures only lose telemetry
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Cursor::click()  ──►  Pointer  ──►  Pointer::release()     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  NameResolver (operation, parent)     Event (timers)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Instrumentation: LabelRegistry + MetricSink                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  metrics-exporter-prometheus  (rk_cursor_elapsedNano)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rk_cursor::{Config, Cursor, Pointer, click, metrics};
//!
//! fn handle(cursor: &Cursor) -> Result<(), std::io::Error> {
//!     let mut ptr = click!(cursor);
//!     let result = ptr.observe(std::fs::metadata("/tmp").map(|_| ()));
//!     ptr.release();
//!     result
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     if let Some(addr) = config.metrics_addr() {
//!         metrics::try_init_metrics(addr);
//!     }
//!     let cursor = Cursor::builder().entry_name("orders").entry_type("http").build();
//!     handle(&cursor)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Resolve names from the live stack (needs debug info):
//! ```bash
//! CURSOR_STACK_NAMES=true cargo run
//! ```
//!
//! Export metrics:
//! ```bash
//! METRICS_PORT=9090 cargo run
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod event;
pub mod frame;
pub mod guard;
pub mod identity;
pub mod instrumentation;
pub mod labels;
pub mod logging;
pub mod metrics;

// Re-exports for convenience
pub use config::Config;
pub use cursor::{BasicPointer, Cursor, CursorBuilder, ErrorKeyFormat, Payload, Pointer, StackPointer};
pub use error::{CursorError, CursorResult};
pub use event::{Event, RequestEvent};
pub use guard::ReleaseGuard;
pub use identity::ProcessIdentity;
pub use instrumentation::Instrumentation;
pub use labels::{LabelRegistry, LabelSchema};
pub use crate::metrics::MetricSink;
