//! Seam to the database and its change-notification facility.

use async_trait::async_trait;

use crate::descriptor::QueryDescriptor;
use crate::error::Error;
use crate::row::Row;

/// The database behind the watched query.
///
/// Implementations bridge the engine to a concrete database driver. The
/// in-memory implementation in [`crate::memory`] backs the demo binary and
/// the integration tests.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Whether the change-notification facility is enabled server-side.
    ///
    /// Enabling the facility is an administrative action on the database
    /// instance; this engine only observes the result.
    async fn notifications_enabled(&self) -> Result<bool, Error>;

    /// Execute the descriptor and register a one-shot notification for
    /// `generation`.
    ///
    /// Execution and registration are a single operation: the facility keys
    /// the registration on the literal statement text that was executed, so
    /// the two must not be separated. Returns the result set in statement
    /// order.
    async fn execute(
        &self,
        descriptor: &QueryDescriptor,
        generation: u64,
    ) -> Result<Vec<Row>, Error>;
}
