//! Optional trace scope held for the duration of one execution.

use std::sync::Arc;

use super::{SpanRecorder, TRACING_TARGET, TraceOptions, TraceScope, Tracer};
use crate::Result;

/// The trace scope of one execution, or the explicit absence of one.
///
/// [`TraceGuard::finish`] consumes the guard, so an opened scope is flushed
/// at most once.
pub enum TraceGuard {
    /// Tracing is disabled for this execution; no scope was opened.
    Inactive,
    /// A scope is open and must be flushed when the execution ends.
    Active(Box<dyn TraceScope>),
}

impl TraceGuard {
    /// Opens a scope when `enabled`, otherwise returns [`TraceGuard::Inactive`].
    pub fn open(tracer: &dyn Tracer, enabled: bool, options: TraceOptions) -> Result<Self> {
        if !enabled {
            return Ok(Self::Inactive);
        }
        tracer.open(options).map(Self::Active)
    }

    /// Returns whether a scope is open.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Enables automatic instrumentation if a scope is open.
    pub fn autotrack(&mut self) -> Option<Arc<dyn SpanRecorder>> {
        match self {
            Self::Inactive => None,
            Self::Active(scope) => Some(scope.autotrack_pipeline_calls()),
        }
    }

    /// Flushes the scope if one was opened.
    ///
    /// Returns whether a flush happened. Flush failures are logged, never
    /// returned, so they cannot mask the execution outcome.
    pub async fn finish(self) -> bool {
        let Self::Active(mut scope) = self else {
            return false;
        };

        if let Err(error) = scope.flush().await {
            tracing::warn!(
                target: TRACING_TARGET,
                trace_id = %scope.trace_id(),
                error = %error,
                "Failed to send spans"
            );
        }
        true
    }
}

impl std::fmt::Debug for TraceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => f.write_str("TraceGuard::Inactive"),
            Self::Active(scope) => f
                .debug_tuple("TraceGuard::Active")
                .field(&scope.trace_id())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTracer;

    #[tokio::test]
    async fn test_inactive_guard_never_flushes() {
        let tracer = MockTracer::default();
        let guard = TraceGuard::open(&tracer, false, TraceOptions::new("t", "k")).unwrap();

        assert!(!guard.is_active());
        assert!(!guard.finish().await);
        assert_eq!(tracer.opened(), 0);
        assert_eq!(tracer.flushed(), 0);
    }

    #[tokio::test]
    async fn test_active_guard_flushes_once() {
        let tracer = MockTracer::default();
        let mut guard = TraceGuard::open(&tracer, true, TraceOptions::new("t", "k")).unwrap();

        assert!(guard.autotrack().is_some());
        assert!(guard.finish().await);
        assert_eq!(tracer.opened(), 1);
        assert_eq!(tracer.flushed(), 1);
    }

    #[tokio::test]
    async fn test_flush_failure_is_swallowed() {
        let tracer = MockTracer::failing_flush();
        let guard = TraceGuard::open(&tracer, true, TraceOptions::new("t", "k")).unwrap();

        assert!(guard.finish().await);
        assert_eq!(tracer.flushed(), 1);
    }
}
