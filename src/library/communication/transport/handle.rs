use std::fmt;

/// Ownership token of a listener registration
///
/// Dropping the handle (or calling [`release`](ListenHandle::release)) unregisters the listener.
/// Unregistration happens exactly once, no matter how the handle is disposed of.
pub struct ListenHandle {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenHandle {
    /// Creates a handle which runs `unregister` once it is released
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Unregisters the listener right away
    pub fn release(mut self) {
        self.unregister_once();
    }

    fn unregister_once(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        self.unregister_once();
    }
}

impl fmt::Debug for ListenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenHandle")
            .field("registered", &self.unregister.is_some())
            .finish()
    }
}
