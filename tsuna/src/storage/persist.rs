//! Versioned, write-coalescing persistence of store snapshots.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{ClientStorage, codec::deep_equal};
use crate::error::Result;

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    /// Storage key (relative to the [`ClientStorage`] prefix).
    pub key: String,
    /// Schema version. Payloads written with another version are discarded.
    pub version: u32,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            key: "store".into(),
            version: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    state: Value,
    version: u32,
}

/// Writes JSON snapshots to storage, at most once per scheduler tick.
#[derive(Debug)]
pub struct Persister {
    storage: ClientStorage,
    options: PersistOptions,
    pending: Mutex<Option<Value>>,
    last_written: Mutex<Option<Value>>,
    scheduled: AtomicBool,
}

impl Persister {
    /// Create a persister writing through `storage`.
    #[must_use]
    pub fn new(storage: ClientStorage, options: PersistOptions) -> Self {
        Self {
            storage,
            options,
            pending: Mutex::new(None),
            last_written: Mutex::new(None),
            scheduled: AtomicBool::new(false),
        }
    }

    /// Persistence settings.
    #[must_use]
    pub const fn options(&self) -> &PersistOptions {
        &self.options
    }

    /// Load the persisted snapshot.
    ///
    /// Returns `None` when nothing is stored, when the stored version differs
    /// from the configured one, or when the payload cannot be decoded.
    pub fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let raw: Value = match self.storage.get(&self.options.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.options.key, error = %e, "Discarding unreadable persisted state");
                return None;
            }
        };
        let envelope: Envelope = match serde_json::from_value(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %self.options.key, error = %e, "Discarding corrupt persisted state");
                return None;
            }
        };
        if envelope.version != self.options.version {
            debug!(
                stored = envelope.version,
                expected = self.options.version,
                "Discarding persisted state with a different version"
            );
            return None;
        }
        match serde_json::from_value(envelope.state.clone()) {
            Ok(state) => {
                *self.last_written.lock() = Some(envelope.state);
                Some(state)
            }
            Err(e) => {
                warn!(key = %self.options.key, error = %e, "Discarding corrupt persisted state");
                None
            }
        }
    }

    /// Queue `value` for writing.
    ///
    /// Inside a tokio runtime the write happens once the current task
    /// yields; later calls in the same tick only replace the pending value.
    /// Outside a runtime the value is written immediately.
    pub fn schedule(self: &Arc<Self>, value: Value) {
        *self.pending.lock() = Some(value);
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = Arc::clone(self);
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    this.flush();
                });
            }
            Err(_) => self.flush(),
        }
    }

    /// Write the pending value now, if any.
    pub fn flush(&self) {
        self.scheduled.store(false, Ordering::Release);
        let Some(value) = self.pending.lock().take() else {
            return;
        };
        let mut last = self.last_written.lock();
        if last.as_ref().is_some_and(|prev| deep_equal(prev, &value)) {
            trace!("Persisted state unchanged, skipping write");
            return;
        }
        let envelope = Envelope {
            state: value,
            version: self.options.version,
        };
        match self.storage.set(&self.options.key, &envelope) {
            Ok(()) => *last = Some(envelope.state),
            Err(e) => warn!(key = %self.options.key, error = %e, "Failed to persist state"),
        }
    }

    /// Delete the persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn clear(&self) -> Result<()> {
        self.pending.lock().take();
        self.last_written.lock().take();
        self.storage.remove(&self.options.key)
    }
}
