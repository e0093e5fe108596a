//! Process-wide connection to the change-notification facility.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::event::ChangeEvent;
use crate::source::ChangeSource;
use crate::subscription::{Subscription, SubscriptionState};

/// Capacity of the event pipe between the facility side and the dispatcher.
const EVENT_BUFFER: usize = 64;

/// The listener that receives change notifications for one endpoint.
///
/// Exactly one channel is active per endpoint. The channel is an owned
/// instance with an explicit lifecycle, injected into the refresh handler
/// and the watcher.
pub struct NotificationChannel {
    endpoint: String,
    source: Arc<dyn ChangeSource>,
    inner: Mutex<ChannelInner>,
}

struct ChannelInner {
    running: bool,
    /// Event pipe into the dispatcher. Dropping the sender on stop ends
    /// the dispatcher task.
    events_tx: Option<mpsc::Sender<ChangeEvent>>,
    /// Registered subscriptions keyed by generation. A subscription is
    /// registered while still pending and arms once its execution
    /// completes.
    registered: HashMap<u64, Arc<Subscription>>,
}

impl NotificationChannel {
    /// Create a channel for an endpoint. The channel is idle until
    /// [`NotificationChannel::start`] is called.
    pub fn new(endpoint: impl Into<String>, source: Arc<dyn ChangeSource>) -> Self {
        Self {
            endpoint: endpoint.into(),
            source,
            inner: Mutex::new(ChannelInner {
                running: false,
                events_tx: None,
                registered: HashMap::new(),
            }),
        }
    }

    /// The endpoint this channel listens on.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the listener is established.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Establish the listener.
    ///
    /// Idempotent: the first successful call returns the event receiver for
    /// the dispatcher; later calls return `Ok(None)`. Fails with
    /// [`Error::ChannelUnavailable`] when the endpoint's facility is not
    /// enabled server-side.
    pub async fn start(&self) -> Result<Option<mpsc::Receiver<ChangeEvent>>, Error> {
        {
            let inner = self.inner.lock();
            if inner.running {
                return Ok(None);
            }
        }

        if !self.source.notifications_enabled().await? {
            return Err(Error::ChannelUnavailable {
                endpoint: self.endpoint.clone(),
            });
        }

        let mut inner = self.inner.lock();
        if inner.running {
            return Ok(None);
        }
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        inner.running = true;
        inner.events_tx = Some(tx);
        tracing::info!(endpoint = %self.endpoint, "notification channel started");
        Ok(Some(rx))
    }

    /// Release the listener.
    ///
    /// Every armed subscription becomes `Stopped` and will not fire.
    /// Idempotent and infallible: safe with no subscription outstanding,
    /// safe to call repeatedly, and must not fail even if the underlying
    /// connection was already lost.
    pub fn stop(&self) {
        let (was_running, swept) = {
            let mut inner = self.inner.lock();
            let was_running = inner.running;
            inner.running = false;
            inner.events_tx = None;
            let mut swept = 0usize;
            for subscription in inner.registered.values() {
                if subscription.stop() {
                    swept += 1;
                }
            }
            inner.registered.clear();
            (was_running, swept)
        };
        if was_running {
            tracing::info!(endpoint = %self.endpoint, swept, "notification channel stopped");
        } else {
            tracing::debug!(endpoint = %self.endpoint, "stop on idle channel");
        }
    }

    /// Record a subscription under its generation.
    ///
    /// The subscription may still be pending: registration precedes query
    /// execution so that an event emitted the instant the statement runs
    /// always finds its generation. Registration is also accepted after
    /// `stop`: a refresh already in flight when the channel stopped is
    /// allowed to complete and arm one more subscription, which the
    /// collaborator must then stop again. No event will be delivered to it
    /// while the channel is stopped.
    pub fn register(&self, subscription: Arc<Subscription>) {
        let generation = subscription.generation();
        self.inner.lock().registered.insert(generation, subscription);
        tracing::debug!(generation, "subscription registered");
    }

    /// Look up the subscription registered for a generation.
    pub fn get_subscription(&self, generation: u64) -> Option<Arc<Subscription>> {
        self.inner.lock().registered.get(&generation).cloned()
    }

    /// Remove and return the subscription registered for a generation.
    pub fn unregister(&self, generation: u64) -> Option<Arc<Subscription>> {
        self.inner.lock().registered.remove(&generation)
    }

    /// Generations holding an armed subscription, in ascending order.
    pub fn armed_generations(&self) -> Vec<u64> {
        let inner = self.inner.lock();
        let mut generations: Vec<u64> = inner
            .registered
            .iter()
            .filter(|(_, subscription)| subscription.state() == SubscriptionState::Armed)
            .map(|(&generation, _)| generation)
            .collect();
        generations.sort_unstable();
        generations
    }

    /// Facility-side entry point: route one event toward the dispatcher.
    ///
    /// Runs on an arbitrary caller context, concurrently with any other
    /// engine activity including `stop`. Events arriving after `stop` are
    /// dropped.
    pub fn deliver(&self, event: ChangeEvent) {
        let tx = {
            let inner = self.inner.lock();
            if !inner.running {
                tracing::debug!(
                    generation = event.generation,
                    "event dropped, channel stopped"
                );
                return;
            }
            inner.events_tx.clone()
        };
        if let Some(tx) = tx {
            if let Err(e) = tx.try_send(event) {
                tracing::warn!(error = %e, "event pipe unavailable, dropping event");
            }
        }
    }
}
