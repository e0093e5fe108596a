//! Change events produced by the notification facility.

use serde::{Deserialize, Serialize};

/// Classification of a delivered notification.
///
/// Only [`EventKind::Change`] means the watched result set changed. Every
/// other kind is a terminal fault for its generation and must be reported,
/// never treated as a data change: refreshing on a failure event would
/// either loop forever or silently end the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The watched result set changed.
    Change,
    /// The facility refused the registration.
    SubscribeFailure,
    /// The registered statement failed server-side.
    StatementError,
    /// The facility delivered a kind this engine does not recognize.
    Unknown,
}

impl EventKind {
    /// Whether this kind represents an actual data change.
    pub fn is_change(&self) -> bool {
        matches!(self, EventKind::Change)
    }
}

/// A one-shot notification targeting a single subscription generation.
///
/// Produced by the notification channel's facility side and consumed exactly
/// once by the subscription it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What the facility observed.
    pub kind: EventKind,
    /// The subscription generation this event targets.
    pub generation: u64,
}

impl ChangeEvent {
    /// Create a new event.
    pub fn new(kind: EventKind, generation: u64) -> Self {
        Self { kind, generation }
    }

    /// Shorthand for a data-change event.
    pub fn change(generation: u64) -> Self {
        Self::new(EventKind::Change, generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_change_is_change() {
        assert!(EventKind::Change.is_change());
        assert!(!EventKind::SubscribeFailure.is_change());
        assert!(!EventKind::StatementError.is_change());
        assert!(!EventKind::Unknown.is_change());
    }

    #[test]
    fn test_change_shorthand() {
        let event = ChangeEvent::change(3);
        assert_eq!(event.kind, EventKind::Change);
        assert_eq!(event.generation, 3);
    }
}
