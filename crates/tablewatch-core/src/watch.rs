//! Watcher facade: lifecycle, event dispatch, re-subscription loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::channel::NotificationChannel;
use crate::descriptor::QueryDescriptor;
use crate::error::Error;
use crate::event::{ChangeEvent, EventKind};
use crate::refresh::RefreshHandler;
use crate::sink::RefreshSink;
use crate::source::ChangeSource;
use crate::subscription::{FireOutcome, SubscriptionState};

/// Watches one query's result set over a notification channel.
///
/// Owns the channel and the refresh handler; the collaborator drives the
/// lifecycle: [`TableWatcher::start`] at startup, [`TableWatcher::stop`]
/// exactly once at teardown (twice if a refresh was in flight when the
/// first stop landed, see [`NotificationChannel::register`]).
pub struct TableWatcher {
    channel: Arc<NotificationChannel>,
    handler: Arc<RefreshHandler>,
    sink: Arc<dyn RefreshSink>,
}

impl TableWatcher {
    /// Build a watcher over an already validated descriptor.
    pub fn new(
        endpoint: impl Into<String>,
        descriptor: QueryDescriptor,
        source: Arc<dyn ChangeSource>,
        sink: Arc<dyn RefreshSink>,
    ) -> Self {
        let channel = Arc::new(NotificationChannel::new(endpoint, source.clone()));
        let handler = Arc::new(RefreshHandler::new(
            descriptor,
            source,
            sink.clone(),
            channel.clone(),
        ));
        Self {
            channel,
            handler,
            sink,
        }
    }

    /// The channel this watcher listens on.
    pub fn channel(&self) -> Arc<NotificationChannel> {
        self.channel.clone()
    }

    /// Start the channel, begin dispatching, arm the first subscription.
    ///
    /// Fails with [`Error::ChannelUnavailable`] when the facility is
    /// disabled server-side; that is fatal to startup and not retried here.
    pub async fn start(&self) -> Result<(), Error> {
        if let Some(rx) = self.channel.start().await? {
            self.spawn_dispatcher(rx);
        }
        self.handler.refresh_and_rewatch().await?;
        Ok(())
    }

    /// Stop watching. Idempotent; see [`NotificationChannel::stop`].
    pub fn stop(&self) {
        self.channel.stop();
    }

    fn spawn_dispatcher(&self, mut rx: mpsc::Receiver<ChangeEvent>) {
        let channel = self.channel.clone();
        let handler = self.handler.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            debug!("dispatcher started");
            while let Some(event) = rx.recv().await {
                dispatch(event, &channel, &handler, sink.as_ref()).await;
            }
            debug!("dispatcher stopped (channel closed)");
        });
    }
}

/// Route one delivered event to its subscription generation.
///
/// Events run sequentially here, so at most one refresh is ever in flight
/// against the watched statement.
async fn dispatch(
    event: ChangeEvent,
    channel: &NotificationChannel,
    handler: &RefreshHandler,
    sink: &dyn RefreshSink,
) {
    let Some(subscription) = channel.get_subscription(event.generation) else {
        debug!(
            generation = event.generation,
            "event for unknown generation dropped"
        );
        return;
    };

    match subscription.fire(event.kind) {
        FireOutcome::NotArmed(SubscriptionState::Pending) => {
            // The statement for this generation is still executing. The
            // event is the generation's one shot and must not be lost, so
            // it goes back into the pipe until the arm lands.
            debug!(generation = event.generation, "event ahead of arm, requeued");
            channel.deliver(event);
        }
        FireOutcome::NotArmed(state) => {
            debug!(
                generation = event.generation,
                state = ?state,
                "event dropped, subscription not armed"
            );
        }
        FireOutcome::Consumed(EventKind::Change) => {
            channel.unregister(event.generation);
            if let Err(e) = handler.refresh_and_rewatch().await {
                // A sink failure happens after the arm; anything earlier
                // leaves nothing armed, and without an executed statement
                // there is nothing to bind a new registration to. Either
                // way the collaborator hears about it through the sink.
                match &e {
                    Error::Sink(_) => warn!(
                        generation = event.generation,
                        error = %e,
                        "row delivery failed, watch remains armed"
                    ),
                    _ => warn!(
                        generation = event.generation,
                        error = %e,
                        "refresh failed, watch is no longer armed"
                    ),
                }
                sink.refresh_error(event.generation, &e);
            }
        }
        FireOutcome::Consumed(kind) => {
            // Failure kinds are terminal for the watch. Re-arming on them
            // risks an infinite failure loop; report and stop instead.
            channel.unregister(event.generation);
            warn!(generation = event.generation, kind = ?kind, "subscription terminated by facility");
            sink.fault(event.generation, kind);
        }
    }
}
