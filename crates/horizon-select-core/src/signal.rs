//! Signal/slot system for Horizon Select.
//!
//! Signals are how the choices pipeline pushes results outward: the rendering
//! collaborator connects a slot to the widget's `published` signal and is
//! notified every time a new visible set is computed.
//!
//! Slots are invoked directly on the emitting thread, after the connection
//! lock has been released, so a slot may connect, disconnect or emit again
//! without deadlocking.
//!
//! # Example
//!
//! ```
//! use horizon_select_core::Signal;
//!
//! let published = Signal::<Vec<String>>::new();
//!
//! let id = published.connect(|names| {
//!     println!("{} choices visible", names.len());
//! });
//!
//! published.emit(vec!["Apple".into(), "Apricot".into()]);
//! assert!(published.disconnect(id));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe signal that can have multiple connected slots.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for signals
///   with no arguments, or a tuple for multiple arguments.
pub struct Signal<Args> {
    /// All active connections.
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
    /// Whether signal emission is temporarily blocked.
    blocked: AtomicBool,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Connect a slot that is disconnected when the returned guard is dropped.
    pub fn connect_scoped<F>(&self, slot: F) -> ConnectionGuard<'_, Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard { signal: self, id }
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots in connection order.
    #[tracing::instrument(skip_all, target = "horizon_select_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: "horizon_select_core::signal", "signal blocked, skipping emit");
            return;
        }

        let slots: Vec<Slot<Args>> = self.connections.lock().values().cloned().collect();
        tracing::trace!(target: "horizon_select_core::signal", connection_count = slots.len(), "emitting signal");

        for slot in slots {
            slot(&args);
        }
    }
}

impl<Args> fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.lock().len())
            .field("blocked", &self.blocked.load(Ordering::SeqCst))
            .finish()
    }
}

/// RAII guard that disconnects its slot when dropped.
pub struct ConnectionGuard<'a, Args: 'static> {
    signal: &'a Signal<Args>,
    id: ConnectionId,
}

impl<Args: 'static> ConnectionGuard<'_, Args> {
    /// The ID of the guarded connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: 'static> Drop for ConnectionGuard<'_, Args> {
    fn drop(&mut self) {
        self.signal.disconnect(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI32;

    use super::*;

    #[test]
    fn test_signal_connect_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(AtomicI32::new(0));
        let received_clone = received.clone();

        signal.connect(move |&value| {
            received_clone.store(value, Ordering::SeqCst);
        });

        signal.emit(42);
        assert_eq!(received.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal = Signal::<i32>::new();
        let counter = Arc::new(AtomicI32::new(0));
        let counter_clone = counter.clone();

        let id = signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.emit(1);
        assert!(signal.disconnect(id));
        signal.emit(2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!signal.disconnect(id));
    }

    #[test]
    fn test_signal_blocked() {
        let signal = Signal::<()>::new();
        let counter = Arc::new(AtomicI32::new(0));
        let counter_clone = counter.clone();

        signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set_blocked(true);
        signal.emit(());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        signal.set_blocked(false);
        signal.emit(());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connection_guard() {
        let signal = Signal::<i32>::new();
        {
            let _guard = signal.connect_scoped(|_| {});
            assert_eq!(signal.connection_count(), 1);
        }
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_slot_may_reenter_signal() {
        let signal = Arc::new(Signal::<i32>::new());
        let inner = signal.clone();
        let counter = Arc::new(AtomicI32::new(0));
        let counter_clone = counter.clone();

        signal.connect(move |&depth| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            if depth < 2 {
                inner.emit(depth + 1);
            }
        });

        signal.emit(0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
