//! Contract of the publish/subscribe transport
//!
//! The transport delivers [`Messages`](Message) and invokes registered [`Listeners`](Listener) for
//! incoming ones. Listeners may be called from any thread the transport uses for delivery, including
//! concurrently for different messages. A registration stays alive for as long as the returned
//! [`ListenHandle`] is held.

mod handle;

pub use handle::ListenHandle;

use super::message::{Message, Uri};
use super::Status;
use std::sync::Arc;

/// Callback invoked for every message matching a registration
pub type Listener = Arc<dyn Fn(&Message) + Send + Sync>;

/// Listener based publish/subscribe transport
///
/// Implementations must tolerate a [`ListenHandle`] being dropped from within a listener, including
/// the handle of the very registration that is currently being invoked. Listeners must therefore
/// never be called while holding a lock that unregistration acquires.
pub trait Transport: Send + Sync {
    /// Address used as the source of messages sent by this transport's user
    fn default_source(&self) -> &Uri;

    /// Registers `listener` for messages addressed to `sink_filter`
    ///
    /// When a `source_filter` is given, only messages originating from it are delivered.
    fn register_listener(
        &self,
        sink_filter: &Uri,
        listener: Listener,
        source_filter: Option<&Uri>,
    ) -> Result<ListenHandle, Status>;

    /// Transmits a message
    fn send(&self, message: &Message) -> Result<(), Status>;
}
