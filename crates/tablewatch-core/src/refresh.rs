//! Query refresh and re-subscription.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::channel::NotificationChannel;
use crate::descriptor::QueryDescriptor;
use crate::error::Error;
use crate::sink::RefreshSink;
use crate::source::ChangeSource;
use crate::subscription::Subscription;

/// Executes the watched query and arms the next subscription generation.
///
/// Owns the generation counter: successive subscriptions watching the same
/// logical query are distinguished by monotonically increasing generations.
pub struct RefreshHandler {
    descriptor: QueryDescriptor,
    source: Arc<dyn ChangeSource>,
    sink: Arc<dyn RefreshSink>,
    channel: Arc<NotificationChannel>,
    next_generation: AtomicU64,
}

impl RefreshHandler {
    /// Create a handler for one watched descriptor.
    pub fn new(
        descriptor: QueryDescriptor,
        source: Arc<dyn ChangeSource>,
        sink: Arc<dyn RefreshSink>,
        channel: Arc<NotificationChannel>,
    ) -> Self {
        Self {
            descriptor,
            source,
            sink,
            channel,
            next_generation: AtomicU64::new(1),
        }
    }

    /// The descriptor this handler refreshes.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Execute the watched query, arm the next subscription, deliver rows.
    ///
    /// The new subscription is armed before row delivery: a sink failure
    /// must never leave the watch unarmed, because a partially completed
    /// refresh would silently end all future notifications. A sink error
    /// still propagates to the caller, but only after the arm step.
    ///
    /// A query execution error propagates without arming anything; the
    /// facility has no executed statement to bind a registration to.
    pub async fn refresh_and_rewatch(&self) -> Result<u64, Error> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let subscription = Arc::new(Subscription::new(self.descriptor.clone(), generation));

        // The channel learns the generation before the statement runs:
        // the facility may emit the moment the registration exists, and an
        // event for a generation the dispatcher cannot resolve would lose
        // the one shot. Execution and facility registration remain one
        // call; the arm lands as soon as they return.
        self.channel.register(subscription.clone());
        let rows = match self.source.execute(&self.descriptor, generation).await {
            Ok(rows) => rows,
            Err(e) => {
                self.channel.unregister(generation);
                return Err(e);
            }
        };
        if let Err(e) = subscription.arm() {
            self.channel.unregister(generation);
            return Err(e);
        }

        tracing::debug!(
            generation,
            rows = rows.len(),
            "refresh complete, subscription armed"
        );

        if let Err(e) = self.sink.rows(&rows) {
            tracing::warn!(generation, error = %e, "row delivery failed after re-arm");
            return Err(e);
        }
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use parking_lot::Mutex;

    use super::*;
    use crate::event::EventKind;
    use crate::memory::MemorySource;
    use crate::row::Row;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<Row>>>,
        fail_rows: AtomicBool,
    }

    impl RefreshSink for RecordingSink {
        fn rows(&self, rows: &[Row]) -> Result<(), Error> {
            if self.fail_rows.load(Ordering::SeqCst) {
                return Err(Error::Sink("injected".into()));
            }
            self.batches.lock().push(rows.to_vec());
            Ok(())
        }

        fn fault(&self, _generation: u64, _kind: EventKind) {}

        fn refresh_error(&self, _generation: u64, _error: &Error) {}
    }

    fn descriptor() -> QueryDescriptor {
        QueryDescriptor::new(
            "SELECT [ID],[Name],[Age] from dbo.Test_Table where [Age] = 1",
            "dbo.Test_Table",
            ["ID", "Name", "Age"],
        )
        .unwrap()
    }

    fn handler(
        source: Arc<MemorySource>,
        sink: Arc<RecordingSink>,
    ) -> (RefreshHandler, Arc<NotificationChannel>) {
        let channel = Arc::new(NotificationChannel::new("Server=test", source.clone()));
        let handler = RefreshHandler::new(descriptor(), source, sink, channel.clone());
        (handler, channel)
    }

    #[tokio::test]
    async fn test_refresh_delivers_and_arms() {
        let source = Arc::new(MemorySource::with_rows(vec![Row::new(1, "A", 1)]));
        let sink = Arc::new(RecordingSink::default());
        let (handler, channel) = handler(source.clone(), sink.clone());

        let generation = handler.refresh_and_rewatch().await.unwrap();
        assert_eq!(generation, 1);
        assert_eq!(channel.armed_generations(), vec![1]);
        assert_eq!(source.registered_generations(), vec![1]);
        assert_eq!(*sink.batches.lock(), vec![vec![Row::new(1, "A", 1)]]);
    }

    #[tokio::test]
    async fn test_generations_are_monotonic() {
        let source = Arc::new(MemorySource::new());
        let sink = Arc::new(RecordingSink::default());
        let (handler, channel) = handler(source, sink);

        assert_eq!(handler.refresh_and_rewatch().await.unwrap(), 1);
        assert_eq!(handler.refresh_and_rewatch().await.unwrap(), 2);
        assert_eq!(channel.armed_generations(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_sink_error_leaves_subscription_armed() {
        let source = Arc::new(MemorySource::with_rows(vec![Row::new(1, "A", 1)]));
        let sink = Arc::new(RecordingSink::default());
        sink.fail_rows.store(true, Ordering::SeqCst);
        let (handler, channel) = handler(source, sink);

        let err = handler.refresh_and_rewatch().await.unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
        // the arm step is non-skippable: the watch must stay armed
        assert_eq!(channel.armed_generations(), vec![1]);
    }

    #[tokio::test]
    async fn test_execute_error_arms_nothing() {
        let source = Arc::new(MemorySource::new());
        source.fail_next_execute();
        let sink = Arc::new(RecordingSink::default());
        let (handler, channel) = handler(source, sink.clone());

        let err = handler.refresh_and_rewatch().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert!(channel.armed_generations().is_empty());
        // the pending registration is withdrawn with the failed execution
        assert!(channel.get_subscription(1).is_none());
        assert!(sink.batches.lock().is_empty());
    }
}
