//! Trait definitions with mockall annotations for testing

use async_trait::async_trait;

use crate::error::SupervisorResult;
use crate::services::FailureReport;

/// Where budget-exhaustion reports go
///
/// The default implementation writes a JSON marker file that an external
/// watchdog or operator can pick up.
#[mockall::automock]
#[async_trait]
pub trait FailureReporter: Send + Sync {
    /// Persist one failure report
    ///
    /// # Returns
    /// An error when the report could not be stored; the supervisor treats
    /// that as an internal fault
    async fn report(&self, report: FailureReport) -> SupervisorResult<()>;
}
