//! Structured logging helpers.
//!
//! [`OpTimer`] times startup phases and every call the service makes to a
//! Google API, so slow upstreams show up in the logs with the component
//! and operation that was waiting on them.

use std::time::{Duration, Instant};

/// Operation timer for measuring and logging execution duration.
///
/// ```rust,ignore
/// use wayfarer_api::logging::OpTimer;
///
/// let timer = OpTimer::new("gemini", "generate_content");
/// let result = client.generate(parts).await;
/// timer.finish_with_result(&result);
/// ```
#[derive(Debug)]
pub struct OpTimer {
    /// Component being timed (e.g. "firestore", "routes").
    component: &'static str,
    /// Operation being performed (e.g. "run_query").
    operation: String,
    start: Instant,
}

impl OpTimer {
    /// Start timing `operation` on `component`.
    #[must_use]
    pub fn new(component: &'static str, operation: impl Into<String>) -> Self {
        let operation = operation.into();

        tracing::debug!(component, operation = %operation, "Operation started");

        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }

    /// Time spent so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Log the duration at info level.
    pub fn finish(self) {
        tracing::info!(
            component = self.component,
            operation = %self.operation,
            duration_ms = self.start.elapsed().as_millis(),
            "Operation completed"
        );
    }

    /// Log success at debug level or failure at warn level, with the error.
    ///
    /// Upstream failures are logged here at warn; the handler decides
    /// whether the failure is fatal for the request.
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) {
        let duration_ms = self.start.elapsed().as_millis();

        match result {
            Ok(_) => tracing::debug!(
                component = self.component,
                operation = %self.operation,
                duration_ms,
                "Operation completed successfully"
            ),
            Err(e) => tracing::warn!(
                component = self.component,
                operation = %self.operation,
                duration_ms,
                error = %e,
                "Operation failed"
            ),
        }
    }
}

/// Log a numbered startup step.
///
/// ```rust,ignore
/// log_init_step!(3, 9, "Sessions", "Vertex AI (us-central1)");
/// ```
#[macro_export]
macro_rules! log_init_step {
    ($step:expr, $total:expr, $name:expr, $detail:expr) => {
        tracing::info!(
            step = $step,
            total = $total,
            "[{}/{}] {} - {}",
            $step,
            $total,
            $name,
            $detail
        );
    };
}

/// Log a startup degradation (a collaborator fell back or is disabled).
#[macro_export]
macro_rules! log_init_warning {
    ($msg:expr) => {
        tracing::warn!("⚠️  {}", $msg);
    };
    ($msg:expr, $($arg:tt)*) => {
        tracing::warn!("⚠️  {}", format!($msg, $($arg)*));
    };
}

/// Log completion of a major phase.
#[macro_export]
macro_rules! log_success {
    ($msg:expr) => {
        tracing::info!("✅ {}", $msg);
    };
}

/// Log the startup banner.
#[macro_export]
macro_rules! log_banner {
    ($title:expr, $subtitle:expr) => {
        tracing::info!("═══════════════════════════════════════════════════");
        tracing::info!("  {}", $title);
        tracing::info!("  {}", $subtitle);
        tracing::info!("═══════════════════════════════════════════════════");
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_timer_creation() {
        let timer = OpTimer::new("gemini", "generate_content");
        assert_eq!(timer.component, "gemini");
        assert_eq!(timer.operation, "generate_content");
    }

    #[test]
    fn test_op_timer_elapsed_is_monotonic() {
        let timer = OpTimer::new("routes", "compute_routes");
        let first = timer.elapsed();
        let second = timer.elapsed();
        assert!(second >= first);
        timer.finish();
    }

    #[test]
    fn test_op_timer_finish_with_result() {
        let ok: Result<u8, String> = Ok(1);
        OpTimer::new("firestore", "commit").finish_with_result(&ok);

        let err: Result<u8, String> = Err("index required".to_string());
        OpTimer::new("firestore", "run_query").finish_with_result(&err);
    }
}
