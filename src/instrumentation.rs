//! The instrumentation registry shared by cursors.
//!
//! Bundles the label registry, the metric sink and the name resolver into one
//! object with an explicit lifecycle. Cursors hold an `Arc<Instrumentation>`;
//! tests build their own with a local recorder instead of touching
//! process-wide state.
//!
//! A lazily built process-wide instance backs [`Cursor`](crate::cursor::Cursor)s
//! that are not given one explicitly.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use crate::config::Config;
use crate::cursor::ErrorKeyFormat;
use crate::error::{CursorError, CursorResult};
use crate::frame::{ExplicitNames, NameResolver, VendorFilter};
use crate::identity::ProcessIdentity;
use crate::labels::{LabelRegistry, LabelSchema};
use crate::metrics::MetricSink;

static GLOBAL: OnceLock<Arc<Instrumentation>> = OnceLock::new();

/// Label registry, metric sink and name resolver used by cursors.
pub struct Instrumentation {
    labels: LabelRegistry,
    sink: MetricSink,
    resolver: Arc<dyn NameResolver>,
    error_key: ErrorKeyFormat,
}

impl Instrumentation {
    pub fn builder() -> InstrumentationBuilder {
        InstrumentationBuilder::default()
    }

    /// Build from configuration, detecting the process identity.
    ///
    /// Records into the global metrics recorder.
    pub fn from_config(config: &Config) -> Self {
        let identity = ProcessIdentity::detect(&config.app_name, &config.app_version);
        match serde_json::to_string(&identity) {
            Ok(json) => info!(
                identity = %json,
                schema = ?config.label_schema,
                "Cursor instrumentation configured"
            ),
            Err(e) => warn!(error = %e, "Failed to serialize process identity"),
        }
        let filter = VendorFilter::new(config.vendor_markers.iter().cloned());
        Self::builder()
            .identity(identity)
            .schema(config.label_schema)
            .vendor_filter(filter)
            .stack_names(config.stack_names)
            .error_key(config.error_key_format)
            .build()
    }

    /// The process-wide instance.
    ///
    /// Built from the environment on first use; falls back to defaults if the
    /// environment is invalid.
    pub fn global() -> Arc<Instrumentation> {
        Arc::clone(GLOBAL.get_or_init(|| {
            let config = Config::from_env().unwrap_or_else(|e| {
                warn!(error = %e, "Invalid cursor configuration, using defaults");
                Config::default()
            });
            Arc::new(Self::from_config(&config))
        }))
    }

    /// Install the process-wide instance.
    ///
    /// # Errors
    ///
    /// Returns `CursorError::AlreadyInstalled` if [`global`](Self::global) was
    /// already initialized.
    pub fn install_global(instrumentation: Instrumentation) -> CursorResult<Arc<Instrumentation>> {
        let instrumentation = Arc::new(instrumentation);
        GLOBAL
            .set(Arc::clone(&instrumentation))
            .map_err(|_| CursorError::AlreadyInstalled)?;
        info!("Installed global cursor instrumentation");
        Ok(instrumentation)
    }

    /// Override the entry name and type labels for every span without its own.
    pub fn override_entry_name_and_type(&self, entry_name: &str, entry_type: &str) {
        self.labels.override_identity(entry_name, entry_type);
    }

    pub fn labels(&self) -> &LabelRegistry {
        &self.labels
    }

    pub fn sink(&self) -> &MetricSink {
        &self.sink
    }

    pub fn resolver(&self) -> &dyn NameResolver {
        self.resolver.as_ref()
    }

    /// Error counter format for cursors that do not set their own.
    pub fn error_key(&self) -> ErrorKeyFormat {
        self.error_key
    }

    /// Merge labels for one span and record its duration.
    pub(crate) fn observe(
        &self,
        elapsed_nanos: f64,
        parent: &str,
        operation: &str,
        entry_name: &str,
        entry_type: &str,
        success: bool,
    ) {
        let values = self
            .labels
            .merged_values(parent, operation, entry_name, entry_type, success);
        self.sink.record(elapsed_nanos, self.labels.keys(), &values);
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation")
            .field("schema", &self.labels.schema())
            .field("sink", &self.sink)
            .field("resolver", &self.resolver)
            .finish()
    }
}

/// Builder for [`Instrumentation`].
#[derive(Default)]
pub struct InstrumentationBuilder {
    identity: Option<ProcessIdentity>,
    schema: LabelSchema,
    sink: Option<MetricSink>,
    resolver: Option<Arc<dyn NameResolver>>,
    vendor_filter: VendorFilter,
    stack_names: bool,
    error_key: ErrorKeyFormat,
}

impl InstrumentationBuilder {
    /// Process identity for the base labels (default: [`ProcessIdentity::default`]).
    pub fn identity(mut self, identity: ProcessIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn schema(mut self, schema: LabelSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Metric sink (default: the global recorder).
    pub fn sink(mut self, sink: MetricSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Custom name resolver. Takes precedence over [`stack_names`](Self::stack_names).
    pub fn resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Vendor boundary for the stack-walking resolver built by
    /// [`stack_names`](Self::stack_names). A custom [`resolver`](Self::resolver)
    /// brings its own and ignores this.
    pub fn vendor_filter(mut self, filter: VendorFilter) -> Self {
        self.vendor_filter = filter;
        self
    }

    /// Use the stack-walking resolver when the `backtrace` feature is enabled.
    pub fn stack_names(mut self, enabled: bool) -> Self {
        self.stack_names = enabled;
        self
    }

    pub fn error_key(mut self, format: ErrorKeyFormat) -> Self {
        self.error_key = format;
        self
    }

    pub fn build(self) -> Instrumentation {
        let identity = self.identity.unwrap_or_default();
        let resolver = self
            .resolver
            .unwrap_or_else(|| default_resolver(self.stack_names, &self.vendor_filter));
        Instrumentation {
            labels: LabelRegistry::new(self.schema, &identity),
            sink: self.sink.unwrap_or_default(),
            resolver,
            error_key: self.error_key,
        }
    }
}

#[cfg(feature = "backtrace")]
fn default_resolver(stack_names: bool, filter: &VendorFilter) -> Arc<dyn NameResolver> {
    if stack_names {
        Arc::new(crate::frame::StackResolver::new(filter.clone()))
    } else {
        Arc::new(ExplicitNames)
    }
}

#[cfg(not(feature = "backtrace"))]
fn default_resolver(stack_names: bool, _filter: &VendorFilter) -> Arc<dyn NameResolver> {
    if stack_names {
        warn!("Stack-resolved cursor names need the `backtrace` feature, using explicit names");
    }
    Arc::new(ExplicitNames)
}
