//! Liveness reporting for the share manager.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;

use crate::share::ShareController;

/// Name under which the aggregate status is listed.
pub const GRPC_SERVICE: &str = "grpc";

/// Shortest interval between streamed health updates.
pub const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Serving status of the share manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServingStatus {
    /// The controller is available.
    Serving,
    /// No controller is available.
    NotServing,
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serving => write!(f, "SERVING"),
            Self::NotServing => write!(f, "NOT_SERVING"),
        }
    }
}

/// Health query failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthError {
    /// The share controller is not available.
    #[error("share manager gRPC server is not running")]
    NotServing,
}

/// Reports whether a share controller is available.
///
/// Reads only the presence of the controller, never its lock, so health
/// queries answer while a share operation is in flight.
#[derive(Clone)]
pub struct HealthReporter {
    controller: Option<Arc<ShareController>>,
    interval: Duration,
}

impl HealthReporter {
    /// Create a reporter for `controller`, streaming updates every `interval`.
    ///
    /// Intervals below [`MIN_WATCH_INTERVAL`] are raised to it.
    pub fn new(controller: Option<Arc<ShareController>>, interval: Duration) -> Self {
        Self {
            controller,
            interval: interval.max(MIN_WATCH_INTERVAL),
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ServingStatus {
        if self.controller.is_some() {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        }
    }

    /// Point check.
    pub const fn check(&self) -> Result<ServingStatus, HealthError> {
        match self.status() {
            ServingStatus::Serving => Ok(ServingStatus::Serving),
            ServingStatus::NotServing => Err(HealthError::NotServing),
        }
    }

    /// Status of every known service.
    pub fn list(&self) -> Result<HashMap<String, ServingStatus>, HealthError> {
        let status = self.check()?;
        Ok(HashMap::from([(GRPC_SERVICE.to_string(), status)]))
    }

    /// Stream the current status once per interval until the receiver is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self) -> ReceiverStream<ServingStatus> {
        let (tx, rx) = mpsc::channel(1);
        let reporter = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reporter.interval);
            loop {
                ticker.tick().await;
                match tx.try_send(reporter.status()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(status)) => {
                        tracing::error!(%status, "Failed to send health check result");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!("Health watch receiver dropped");
                        break;
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn missing_controller_is_not_serving() {
        let reporter = HealthReporter::new(None, Duration::from_secs(1));

        assert_eq!(reporter.status(), ServingStatus::NotServing);
        assert_eq!(reporter.check(), Err(HealthError::NotServing));
        assert_eq!(reporter.list(), Err(HealthError::NotServing));
    }

    #[test]
    fn status_display() {
        assert_eq!(ServingStatus::Serving.to_string(), "SERVING");
        assert_eq!(ServingStatus::NotServing.to_string(), "NOT_SERVING");
    }

    #[tokio::test(start_paused = true)]
    async fn watch_emits_every_interval() {
        let reporter = HealthReporter::new(None, Duration::from_secs(1));
        let mut stream = reporter.watch();

        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            assert_eq!(stream.next().await, Some(ServingStatus::NotServing));
        }
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_minimum() {
        let reporter = HealthReporter::new(None, Duration::ZERO);
        let mut stream = reporter.watch();

        let start = tokio::time::Instant::now();
        for _ in 0..2 {
            assert_eq!(stream.next().await, Some(ServingStatus::NotServing));
        }
        assert_eq!(start.elapsed(), MIN_WATCH_INTERVAL);
    }
}
