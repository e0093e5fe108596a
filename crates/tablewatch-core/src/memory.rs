//! In-memory change source for the demo binary and tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::channel::NotificationChannel;
use crate::descriptor::QueryDescriptor;
use crate::error::Error;
use crate::event::{ChangeEvent, EventKind};
use crate::row::Row;
use crate::source::ChangeSource;

/// An in-memory table with a simulated notification facility.
///
/// Mutations emit one-shot `Change` events to every registered generation
/// through the attached channel, mirroring the facility's behavior of
/// notifying once per registration and requiring re-registration to keep
/// watching. Failure kinds can be injected with [`MemorySource::emit`].
pub struct MemorySource {
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    broker_enabled: bool,
    rows: Vec<Row>,
    /// Generations with a live one-shot registration.
    registered: Vec<u64>,
    channel: Option<Arc<NotificationChannel>>,
    fail_next_execute: bool,
}

impl MemorySource {
    /// Create an empty source with the facility enabled.
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    /// Create a source seeded with rows.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                broker_enabled: true,
                rows,
                registered: Vec::new(),
                channel: None,
                fail_next_execute: false,
            }),
        }
    }

    /// Enable or disable the simulated facility. Disabled means
    /// [`ChangeSource::notifications_enabled`] reports `false`, the way a
    /// database without its broker enabled would.
    pub fn set_broker_enabled(&self, enabled: bool) {
        self.inner.lock().broker_enabled = enabled;
    }

    /// Attach the channel that receives emitted events.
    pub fn attach_channel(&self, channel: Arc<NotificationChannel>) {
        self.inner.lock().channel = Some(channel);
    }

    /// Make the next `execute` fail with a connection fault.
    pub fn fail_next_execute(&self) {
        self.inner.lock().fail_next_execute = true;
    }

    /// Append a row and notify.
    pub fn insert(&self, row: Row) {
        self.inner.lock().rows.push(row);
        self.emit(EventKind::Change);
    }

    /// Update a row's age column. Notifies only when a row was touched.
    pub fn set_age(&self, id: i64, age: i64) -> bool {
        let changed = {
            let mut inner = self.inner.lock();
            match inner.rows.iter_mut().find(|row| row.id == id) {
                Some(row) => {
                    row.age = age;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.emit(EventKind::Change);
        }
        changed
    }

    /// Delete a row. Notifies only when a row was removed.
    pub fn remove(&self, id: i64) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let before = inner.rows.len();
            inner.rows.retain(|row| row.id != id);
            inner.rows.len() != before
        };
        if removed {
            self.emit(EventKind::Change);
        }
        removed
    }

    /// Emit an event of the given kind to every registered generation.
    ///
    /// Registrations are one-shot: emitting drains them, so the next event
    /// requires a fresh registration via `execute`.
    pub fn emit(&self, kind: EventKind) {
        let (channel, generations) = {
            let mut inner = self.inner.lock();
            (inner.channel.clone(), std::mem::take(&mut inner.registered))
        };
        let Some(channel) = channel else {
            return;
        };
        for generation in generations {
            channel.deliver(ChangeEvent::new(kind, generation));
        }
    }

    /// Generations currently holding a live registration.
    pub fn registered_generations(&self) -> Vec<u64> {
        self.inner.lock().registered.clone()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeSource for MemorySource {
    async fn notifications_enabled(&self) -> Result<bool, Error> {
        Ok(self.inner.lock().broker_enabled)
    }

    async fn execute(
        &self,
        descriptor: &QueryDescriptor,
        generation: u64,
    ) -> Result<Vec<Row>, Error> {
        let mut inner = self.inner.lock();
        if inner.fail_next_execute {
            inner.fail_next_execute = false;
            return Err(Error::Connection("simulated connection fault".into()));
        }
        let rows = match age_filter(descriptor.text()) {
            Some(age) => inner
                .rows
                .iter()
                .filter(|row| row.age == age)
                .cloned()
                .collect(),
            None => inner.rows.clone(),
        };
        inner.registered.push(generation);
        Ok(rows)
    }
}

/// Extract the `[Age] = n` predicate from the statement, if present.
///
/// The in-memory source only understands the single equality filter the
/// demo query uses; any other WHERE clause matches every row.
fn age_filter(text: &str) -> Option<i64> {
    let lowered = text.to_ascii_lowercase();
    let clause = &lowered[lowered.find("where")? + 5..];
    let eq = clause.find('=')?;
    let column = clause[..eq].trim().trim_matches(|c| c == '[' || c == ']');
    if column != "age" {
        return None;
    }
    clause[eq + 1..].trim().parse().ok()
}
