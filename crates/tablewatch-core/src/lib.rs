//! Change-notification subscription engine.
//!
//! Watches the result set of a fixed, restricted-form query and refreshes
//! it whenever the database's notification facility reports a change. The
//! facility delivers one-shot events: each [`Subscription`] fires at most
//! once, and the [`RefreshHandler`] re-runs the query and arms the next
//! generation to keep watching.

pub mod channel;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod memory;
pub mod refresh;
pub mod row;
pub mod sink;
pub mod source;
pub mod subscription;
pub mod watch;

pub use channel::NotificationChannel;
pub use descriptor::QueryDescriptor;
pub use error::Error;
pub use event::{ChangeEvent, EventKind};
pub use memory::MemorySource;
pub use refresh::RefreshHandler;
pub use row::Row;
pub use sink::{ConsoleSink, RefreshSink};
pub use source::ChangeSource;
pub use subscription::{FireOutcome, Subscription, SubscriptionState};
pub use watch::TableWatcher;
