//! Row and fault delivery to the external collaborator.

use crate::error::Error;
use crate::event::EventKind;
use crate::row::Row;

/// Receives refreshed row batches and asynchronous fault reports.
///
/// Data refreshes and facility faults share this surface but are never
/// conflated: a fault always arrives tagged with its kind.
pub trait RefreshSink: Send + Sync {
    /// Deliver one ordered batch of rows.
    fn rows(&self, rows: &[Row]) -> Result<(), Error>;

    /// Report a terminal non-change event for a generation.
    fn fault(&self, generation: u64, kind: EventKind);

    /// Report a refresh that failed after a change event was consumed.
    ///
    /// When the failure precedes the arm step the watch is left unarmed
    /// and no further notifications will arrive until the collaborator
    /// intervenes.
    fn refresh_error(&self, generation: u64, error: &Error);
}

/// Prints each batch to stdout in the collaborator's line format:
/// a blank separator line, then one formatted line per row.
pub struct ConsoleSink;

impl RefreshSink for ConsoleSink {
    fn rows(&self, rows: &[Row]) -> Result<(), Error> {
        println!();
        for row in rows {
            println!("{row}");
        }
        Ok(())
    }

    fn fault(&self, generation: u64, kind: EventKind) {
        eprintln!("watch fault (generation {generation}): {kind:?}");
    }

    fn refresh_error(&self, generation: u64, error: &Error) {
        eprintln!("refresh failed (generation {generation}): {error}");
    }
}
