//! Internal logging helpers for structured metadata-writer events.

use std::fmt;

/// Single logging target for the crate.
pub(crate) const LOG_TARGET: &str = "lakemeta";

/// Optional common key/value fields appended to all logs in a scope.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LogContext {
    common_kv: &'static str,
}

impl LogContext {
    /// Build a context that appends the provided key/value pairs.
    pub(crate) const fn new(common_kv: &'static str) -> Self {
        Self { common_kv }
    }

    pub(crate) fn common_kv(&self) -> Option<&'static str> {
        if self.common_kv.is_empty() {
            None
        } else {
            Some(self.common_kv)
        }
    }
}

// Renders as ` <common kv>` so it can follow the event name directly.
impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.common_kv() {
            Some(common_kv) => write!(f, " {common_kv}"),
            None => Ok(()),
        }
    }
}

/// Context shared by the commit path.
pub(crate) const WRITER_LOG_CTX: LogContext = LogContext::new("component=metadata_writer");

/// Context shared by compaction and cleaning.
pub(crate) const MAINTENANCE_LOG_CTX: LogContext =
    LogContext::new("component=metadata_maintenance");

/// Log `event` with the fields of `ctx` followed by the formatted arguments.
macro_rules! lakemeta_log {
    ($level:expr, ctx: $ctx:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        let level: log::Level = $level;
        if log::log_enabled!(target: crate::logging::LOG_TARGET, level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                level,
                "event={}{} {}",
                $event,
                $ctx,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use lakemeta_log;
