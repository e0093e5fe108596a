//! Engine error types.

use thiserror::Error;

use crate::subscription::SubscriptionState;

/// Errors raised by the watch engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint's change-notification facility is not enabled
    /// server-side. Enabling it is an administrative action outside
    /// this engine; there is no point retrying.
    #[error("change-notification facility unavailable for endpoint {endpoint}")]
    ChannelUnavailable {
        /// The endpoint whose facility is disabled.
        endpoint: String,
    },

    /// The descriptor violates the facility's statement restrictions.
    /// Fatal for that descriptor; retrying with the same text cannot succeed.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// Connection-level fault while executing the watched query.
    #[error("connection error: {0}")]
    Connection(String),

    /// Row delivery to the collaborator sink failed.
    #[error("sink error: {0}")]
    Sink(String),

    /// A subscription was driven through an illegal state transition.
    #[error("invalid subscription transition from {from:?}")]
    InvalidTransition {
        /// The state the subscription was in when the transition was refused.
        from: SubscriptionState,
    },
}
