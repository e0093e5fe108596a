//! Single-fire subscription state machine.

use parking_lot::Mutex;

use crate::descriptor::QueryDescriptor;
use crate::error::Error;
use crate::event::EventKind;

/// Lifecycle states of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created, not yet bound to an executed query.
    Pending,
    /// Registered with the channel, awaiting exactly one event.
    Armed,
    /// Terminal: the one event this subscription may observe was consumed.
    Fired,
    /// Terminal: the channel stopped before an event arrived.
    Stopped,
}

/// Outcome of offering an event to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// This call performed the `Armed -> Fired` transition and now owns
    /// the event.
    Consumed(EventKind),
    /// The subscription was not armed; the event must be dropped.
    NotArmed(SubscriptionState),
}

/// One registration of a watched query with the notification facility.
///
/// A subscription fires at most once, ever. Continuation of the watch
/// requires a new instance with the next generation, created by the
/// refresh handler. There is no path back to `Armed` for the same
/// instance.
pub struct Subscription {
    descriptor: QueryDescriptor,
    generation: u64,
    state: Mutex<SubscriptionState>,
}

impl Subscription {
    /// Create a pending subscription for a generation.
    pub fn new(descriptor: QueryDescriptor, generation: u64) -> Self {
        Self {
            descriptor,
            generation,
            state: Mutex::new(SubscriptionState::Pending),
        }
    }

    /// The generation this subscription watches.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The descriptor this subscription is bound to.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Current state.
    pub fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }

    /// `Pending -> Armed`.
    ///
    /// Must coincide with query execution: the facility keys the
    /// registration on the literal statement that was executed.
    pub fn arm(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        match *state {
            SubscriptionState::Pending => {
                *state = SubscriptionState::Armed;
                Ok(())
            }
            from => Err(Error::InvalidTransition { from }),
        }
    }

    /// Offer the one event this subscription may ever observe.
    ///
    /// Exactly one caller wins the `Armed -> Fired` transition; every
    /// other call, including a second event for the same generation,
    /// observes [`FireOutcome::NotArmed`].
    pub fn fire(&self, kind: EventKind) -> FireOutcome {
        let mut state = self.state.lock();
        match *state {
            SubscriptionState::Armed => {
                *state = SubscriptionState::Fired;
                FireOutcome::Consumed(kind)
            }
            from => FireOutcome::NotArmed(from),
        }
    }

    /// Channel stop. Returns whether this call moved the subscription
    /// into `Stopped`; terminal states are left untouched.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            SubscriptionState::Pending | SubscriptionState::Armed => {
                *state = SubscriptionState::Stopped;
                true
            }
            SubscriptionState::Fired | SubscriptionState::Stopped => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn descriptor() -> QueryDescriptor {
        QueryDescriptor::new(
            "SELECT [ID],[Name],[Age] from dbo.Test_Table where [Age] = 1",
            "dbo.Test_Table",
            ["ID", "Name", "Age"],
        )
        .unwrap()
    }

    fn armed() -> Subscription {
        let sub = Subscription::new(descriptor(), 1);
        sub.arm().unwrap();
        sub
    }

    #[test]
    fn test_fires_at_most_once() {
        let sub = armed();
        assert_eq!(
            sub.fire(EventKind::Change),
            FireOutcome::Consumed(EventKind::Change)
        );
        assert_eq!(
            sub.fire(EventKind::Change),
            FireOutcome::NotArmed(SubscriptionState::Fired)
        );
        assert_eq!(sub.state(), SubscriptionState::Fired);
    }

    #[test]
    fn test_failure_kind_is_terminal() {
        let sub = armed();
        assert_eq!(
            sub.fire(EventKind::SubscribeFailure),
            FireOutcome::Consumed(EventKind::SubscribeFailure)
        );
        assert_eq!(sub.state(), SubscriptionState::Fired);
    }

    #[test]
    fn test_pending_does_not_fire() {
        let sub = Subscription::new(descriptor(), 1);
        assert_eq!(
            sub.fire(EventKind::Change),
            FireOutcome::NotArmed(SubscriptionState::Pending)
        );
    }

    #[test]
    fn test_arm_is_pending_only() {
        let sub = armed();
        assert!(matches!(
            sub.arm(),
            Err(Error::InvalidTransition {
                from: SubscriptionState::Armed
            })
        ));
    }

    #[test]
    fn test_stop_prevents_firing() {
        let sub = armed();
        assert!(sub.stop());
        assert_eq!(
            sub.fire(EventKind::Change),
            FireOutcome::NotArmed(SubscriptionState::Stopped)
        );
        // a second stop is a no-op
        assert!(!sub.stop());
    }

    #[test]
    fn test_stop_after_fire_keeps_fired() {
        let sub = armed();
        sub.fire(EventKind::Change);
        assert!(!sub.stop());
        assert_eq!(sub.state(), SubscriptionState::Fired);
    }

    #[test]
    fn test_concurrent_fire_has_single_winner() {
        let sub = Arc::new(armed());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sub = sub.clone();
            handles.push(std::thread::spawn(move || {
                matches!(sub.fire(EventKind::Change), FireOutcome::Consumed(_))
            }));
        }
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
