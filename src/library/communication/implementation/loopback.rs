//! In-process transport which delivers every sent message to the listeners of the same instance
//!
//! Useful for tests and demonstrations where requesting and responding side live in the same process.
//! Delivery happens synchronously on the sending thread. Failures can be injected for the next
//! registration or send to exercise error paths.

use crate::library::communication::message::{Message, Uri};
use crate::library::communication::transport::{ListenHandle, Listener, Transport};
use crate::library::communication::Status;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

struct Registration {
    sink_filter: Uri,
    source_filter: Option<Uri>,
    listener: Listener,
}

impl Registration {
    fn matches(&self, message: &Message) -> bool {
        let attributes = message.attributes();
        let destination = attributes.sink.as_ref().unwrap_or(&attributes.source);

        *destination == self.sink_filter
            && self
                .source_filter
                .as_ref()
                .map_or(true, |source| *source == attributes.source)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<u64, Registration>,
    registration_fault: Option<Status>,
    send_fault: Option<Status>,
}

struct Inner {
    source: Uri,
    registry: Mutex<Registry>,
    sent: Mutex<Vec<Message>>,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`Transport`] implementation that loops messages back to its own listeners
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

impl LoopbackTransport {
    /// Creates a new transport which uses `source` as its default source address
    pub fn new(source: Uri) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                registry: Mutex::new(Registry::default()),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Makes the next call to [`register_listener`](Transport::register_listener) fail with `status`
    pub fn fail_next_registration(&self, status: Status) {
        self.inner.registry().registration_fault = Some(status);
    }

    /// Makes the next call to [`send`](Transport::send) fail with `status`
    pub fn fail_next_send(&self, status: Status) {
        self.inner.registry().send_fault = Some(status);
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.registry().listeners.len()
    }

    /// All messages successfully sent so far
    pub fn sent(&self) -> Vec<Message> {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn unregister(inner: &Weak<Inner>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            // Dropped after the lock is released, the listener may own arbitrary state
            let removed = inner.registry().listeners.remove(&id);
            if removed.is_some() {
                trace!("Unregistered listener {}", id);
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn default_source(&self) -> &Uri {
        &self.inner.source
    }

    fn register_listener(
        &self,
        sink_filter: &Uri,
        listener: Listener,
        source_filter: Option<&Uri>,
    ) -> Result<ListenHandle, Status> {
        let mut registry = self.inner.registry();

        if let Some(status) = registry.registration_fault.take() {
            return Err(status);
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(
            id,
            Registration {
                sink_filter: sink_filter.clone(),
                source_filter: source_filter.cloned(),
                listener,
            },
        );

        trace!("Registered listener {} for {}", id, sink_filter);

        let inner = Arc::downgrade(&self.inner);
        Ok(ListenHandle::new(move || Self::unregister(&inner, id)))
    }

    fn send(&self, message: &Message) -> Result<(), Status> {
        // Handlers run without the registry lock so they may (un-)register themselves
        let listeners: Vec<Listener> = {
            let mut registry = self.inner.registry();

            if let Some(status) = registry.send_fault.take() {
                return Err(status);
            }

            registry
                .listeners
                .values()
                .filter(|registration| registration.matches(message))
                .map(|registration| registration.listener.clone())
                .collect()
        };

        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        trace!(
            "Delivering {} to {} listener(s)",
            message.id(),
            listeners.len()
        );

        for listener in listeners {
            listener(message);
        }

        Ok(())
    }
}
