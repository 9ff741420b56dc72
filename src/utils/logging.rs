// Injected logging capability for the session layer
use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

/// Target used for every record emitted by the session layer
pub const LOG_TARGET: &str = "easy_session";

/// Logger handed to the coordinator at construction
///
/// Wraps any [`log::Log`] implementation. The default is disabled, so nothing is
/// emitted unless a logger is injected explicitly.
#[derive(Clone)]
pub struct SessionLogger {
    inner: Arc<dyn Log>,
}

impl SessionLogger {
    #[must_use]
    pub fn new(inner: Arc<dyn Log>) -> Self {
        Self { inner }
    }

    /// Logger that drops every record
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NopLogger))
    }

    /// Logger that forwards to the process-wide `log` logger
    #[must_use]
    pub fn global() -> Self {
        Self::new(Arc::new(GlobalLogger))
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Trace, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Warn, args);
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(LOG_TARGET).build();
        if !self.inner.enabled(&metadata) {
            return;
        }
        self.inner.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLogger").finish_non_exhaustive()
    }
}

struct NopLogger;

impl Log for NopLogger {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        false
    }

    fn log(&self, _: &Record<'_>) {}

    fn flush(&self) {}
}

struct GlobalLogger;

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}
