//! Observable last-value slots with liveness.
//!
//! The source this firmware replaces mixed a synchronous one-class-
//! per-event bus with ad hoc observable fields. `InfoView<T>` is the
//! single uniform replacement (Design Note, spec §9): a named slot
//! holding the latest value, when it was published, and whether it
//! counts as "live". It is single-writer, many-reader: the owning
//! producer calls `publish`, any number of consumers call `snapshot`
//! or `subscribe` concurrently.
//!
//! A snapshot is read once per consumer tick and is an atomic,
//! non-torn `(value, updated_at)` pair — readers never see a value
//! paired with the wrong timestamp.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// A value plus the instant it was published.
#[derive(Debug, Clone)]
struct Slot<T> {
    value: Option<T>,
    updated_at: Instant,
}

/// A point-in-time read of an `InfoView`: the value (if any has ever
/// been published), when it was published, and whether it is live.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub value: Option<T>,
    pub updated_at: Instant,
    pub live: bool,
}

impl<T> Snapshot<T> {
    pub fn live_value(&self) -> Option<&T> {
        if self.live {
            self.value.as_ref()
        } else {
            None
        }
    }
}

/// An observable named slot. Cheap to clone (it's a handle over a
/// shared `RwLock`); clones share the same underlying value.
#[derive(Debug, Clone)]
pub struct InfoView<T> {
    name: &'static str,
    stale_window: Duration,
    inner: Arc<RwLock<Slot<T>>>,
}

impl<T: Clone> InfoView<T> {
    /// Create a new, initially-unpublished view. `stale_window` is the
    /// age past which a published value stops counting as live (§3).
    pub fn new(name: &'static str, stale_window: Duration) -> Self {
        InfoView {
            name,
            stale_window,
            inner: Arc::new(RwLock::new(Slot {
                value: None,
                updated_at: Instant::now(),
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Publish a new value, timestamped now. Called only by the
    /// owning producer.
    pub fn publish(&self, value: T) {
        let mut slot = self.inner.write().expect("InfoView lock poisoned");
        slot.value = Some(value);
        slot.updated_at = Instant::now();
    }

    /// Re-timestamp without changing the value, e.g. to record "still
    /// the same fault as last tick" without manufacturing a new one.
    pub fn touch(&self) {
        let mut slot = self.inner.write().expect("InfoView lock poisoned");
        slot.updated_at = Instant::now();
    }

    /// Read the current value, timestamp, and liveness as one atomic
    /// unit.
    pub fn snapshot(&self) -> Snapshot<T> {
        let slot = self.inner.read().expect("InfoView lock poisoned");
        let live = slot.value.is_some() && slot.updated_at.elapsed() < self.stale_window;
        Snapshot {
            value: slot.value.clone(),
            updated_at: slot.updated_at,
            live,
        }
    }

    pub fn is_live(&self) -> bool {
        self.snapshot().live
    }

    /// A read handle a consumer collaborator (logger, MOP publisher,
    /// web page, CSV recorder) can hold onto and poll independently of
    /// the producer (§6: consumers "hold read handles... and are never
    /// constructed by the core"). Since `InfoView` is itself a cheap,
    /// shared handle, subscribing is just cloning it.
    pub fn subscribe(&self) -> InfoView<T> {
        self.clone()
    }
}
