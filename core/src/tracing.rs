//! Tracing helpers for statement and transaction observability.
//!
//! Events go through the `tracing` crate; installing a subscriber is up to
//! the application.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// sluice_trace_query!(&sql, bindings.len());
/// ```
#[macro_export]
macro_rules! sluice_trace_query {
    ($sql:expr, $param_count:expr) => {
        $crate::__tracing::debug!(sql = %$sql, params = $param_count, "sluice.query");
    };
}

/// Emit an info-level tracing event for transaction lifecycle (begin, commit,
/// rollback, savepoints).
///
/// ```ignore
/// sluice_trace_tx!("begin", "sqlite.rusqlite");
/// sluice_trace_tx!("savepoint.release", "sqlite.rusqlite");
/// ```
#[macro_export]
macro_rules! sluice_trace_tx {
    ($event:literal, $driver:literal) => {
        $crate::__tracing::info!(event = $event, driver = $driver, "sluice.transaction");
    };
}
