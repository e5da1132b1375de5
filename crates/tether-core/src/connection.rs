// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection awareness shared by every live operation.
//!
//! The [`ConnectionMonitor`] owns the process-wide connection state and pushes
//! lifecycle events to registered listeners. Operations never poll it; they
//! only react to [`ConnectionEvent`]s delivered into their mailbox.
//!
//! ```text
//!  NotReady ──ready──► ReadyOffline ──online──► Online
//!                           ▲                      │
//!                           └──────offline─────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Process-wide connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Service layer not initialized yet
    NotReady,
    /// Service layer initialized, no backend connection
    ReadyOffline,
    /// Handshake with the backend complete
    Online,
}

/// Lifecycle signal pushed to operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Service layer initialized; observers may be registered
    Ready,
    /// Handshake complete; connectivity-gated work may proceed
    Online,
    /// Connectivity lost; outstanding requests may never complete
    Offline,
}

/// Receiver of lifecycle events.
pub trait LifecycleListener: Send + Sync {
    /// Deliver an event. Returning `false` means the listener is gone and
    /// should be dropped from the registry.
    fn deliver(&self, event: ConnectionEvent) -> bool;
}

/// Handle returned by [`ConnectionMonitor::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct MonitorInner {
    state: ConnectionState,
    listeners: HashMap<ListenerId, Arc<dyn LifecycleListener>>,
    next_listener: u64,
}

/// Owner of the connection state and fan-out point for lifecycle events.
pub struct ConnectionMonitor {
    inner: Mutex<MonitorInner>,
    connect_wanted: Notify,
    connect_requests: AtomicU64,
}

static GLOBAL_MONITOR: OnceCell<Arc<ConnectionMonitor>> = OnceCell::new();

/// The process-wide monitor shared by all operations that are not given one explicitly.
pub fn global() -> &'static Arc<ConnectionMonitor> {
    GLOBAL_MONITOR.get_or_init(|| Arc::new(ConnectionMonitor::new()))
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MonitorInner {
                state: ConnectionState::NotReady,
                listeners: HashMap::new(),
                next_listener: 1,
            }),
            connect_wanted: Notify::new(),
            connect_requests: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_online(&self) -> bool {
        self.state() == ConnectionState::Online
    }

    /// Register a listener.
    ///
    /// If the service layer is already initialized, `Ready` is delivered
    /// right away so late registrants see the same sequence as early ones.
    pub fn register(&self, listener: Arc<dyn LifecycleListener>) -> ListenerId {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;

        if inner.state != ConnectionState::NotReady && !listener.deliver(ConnectionEvent::Ready) {
            debug!(listener = id.0, "listener dropped before registration completed");
            return id;
        }

        inner.listeners.insert(id, listener);
        debug!(listener = id.0, state = ?inner.state, "lifecycle listener registered");
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.lock().listeners.remove(&id).is_some();
        if removed {
            debug!(listener = id.0, "lifecycle listener unregistered");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Service layer initialized.
    pub fn set_ready(&self) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::NotReady {
            inner.state = ConnectionState::ReadyOffline;
            info!("service layer ready");
            Self::broadcast(&mut inner, ConnectionEvent::Ready);
        }
    }

    /// Handshake with the backend completed.
    pub fn set_online(&self) {
        let mut inner = self.lock();
        match inner.state {
            ConnectionState::Online => {}
            ConnectionState::NotReady => {
                inner.state = ConnectionState::Online;
                info!("service layer ready and online");
                Self::broadcast(&mut inner, ConnectionEvent::Ready);
                Self::broadcast(&mut inner, ConnectionEvent::Online);
            }
            ConnectionState::ReadyOffline => {
                inner.state = ConnectionState::Online;
                info!("connection online");
                Self::broadcast(&mut inner, ConnectionEvent::Online);
            }
        }
    }

    /// Connectivity to the backend dropped.
    pub fn set_offline(&self) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Online {
            inner.state = ConnectionState::ReadyOffline;
            info!("connection offline");
            Self::broadcast(&mut inner, ConnectionEvent::Offline);
        }
    }

    /// Ask the application's connection task to connect. Fire-and-forget.
    pub fn request_connect(&self) {
        let total = self.connect_requests.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(total, "connect requested");
        self.connect_wanted.notify_one();
    }

    /// Resolves once a connect has been requested since the last wake-up.
    pub async fn connect_requested(&self) {
        self.connect_wanted.notified().await;
    }

    /// Number of connect requests made so far.
    pub fn connect_requests(&self) -> u64 {
        self.connect_requests.load(Ordering::Relaxed)
    }

    // Delivery happens under the lock so each listener observes events in
    // the order the state changed.
    fn broadcast(inner: &mut MonitorInner, event: ConnectionEvent) {
        let before = inner.listeners.len();
        inner.listeners.retain(|_, listener| listener.deliver(event));
        let pruned = before - inner.listeners.len();
        debug!(?event, delivered = inner.listeners.len(), pruned, "lifecycle event");
    }

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ConnectionMonitor")
            .field("state", &inner.state)
            .field("listeners", &inner.listeners.len())
            .field("connect_requests", &self.connect_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ConnectionEvent>>,
        closed: std::sync::atomic::AtomicBool,
    }

    impl Recorder {
        fn events(&self) -> Vec<ConnectionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl LifecycleListener for Recorder {
        fn deliver(&self, event: ConnectionEvent) -> bool {
            if self.closed.load(Ordering::Relaxed) {
                return false;
            }
            self.events.lock().unwrap().push(event);
            true
        }
    }

    #[test]
    fn test_transitions_fan_out_in_order() {
        let monitor = ConnectionMonitor::new();
        let recorder = Arc::new(Recorder::default());
        monitor.register(recorder.clone());
        assert!(recorder.events().is_empty());

        monitor.set_ready();
        monitor.set_online();
        monitor.set_offline();
        monitor.set_online();

        assert_eq!(
            recorder.events(),
            vec![
                ConnectionEvent::Ready,
                ConnectionEvent::Online,
                ConnectionEvent::Offline,
                ConnectionEvent::Online,
            ]
        );
        assert!(monitor.is_online());
    }

    #[test]
    fn test_redundant_transitions_are_silent() {
        let monitor = ConnectionMonitor::new();
        let recorder = Arc::new(Recorder::default());
        monitor.register(recorder.clone());

        monitor.set_offline();
        monitor.set_ready();
        monitor.set_ready();
        monitor.set_offline();

        assert_eq!(recorder.events(), vec![ConnectionEvent::Ready]);
        assert_eq!(monitor.state(), ConnectionState::ReadyOffline);
    }

    #[test]
    fn test_online_from_not_ready_passes_through_ready() {
        let monitor = ConnectionMonitor::new();
        let recorder = Arc::new(Recorder::default());
        monitor.register(recorder.clone());

        monitor.set_online();

        assert_eq!(
            recorder.events(),
            vec![ConnectionEvent::Ready, ConnectionEvent::Online]
        );
    }

    #[test]
    fn test_late_registration_replays_ready() {
        let monitor = ConnectionMonitor::new();
        monitor.set_online();

        let recorder = Arc::new(Recorder::default());
        monitor.register(recorder.clone());

        assert_eq!(recorder.events(), vec![ConnectionEvent::Ready]);
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let monitor = ConnectionMonitor::new();
        let recorder = Arc::new(Recorder::default());
        let id = monitor.register(recorder.clone());

        assert!(monitor.unregister(id));
        assert!(!monitor.unregister(id));
        monitor.set_ready();

        assert!(recorder.events().is_empty());
        assert_eq!(monitor.listener_count(), 0);
    }

    #[test]
    fn test_closed_listeners_are_pruned() {
        let monitor = ConnectionMonitor::new();
        let recorder = Arc::new(Recorder::default());
        monitor.register(recorder.clone());
        recorder.closed.store(true, Ordering::Relaxed);

        monitor.set_ready();

        assert_eq!(monitor.listener_count(), 0);
    }

    #[test]
    fn test_request_connect_counts() {
        let monitor = ConnectionMonitor::new();
        monitor.request_connect();
        monitor.request_connect();
        assert_eq!(monitor.connect_requests(), 2);
    }

    #[tokio::test]
    async fn test_connect_requested_wakes_connection_task() {
        let monitor = Arc::new(ConnectionMonitor::new());
        monitor.request_connect();
        // The stored permit resolves immediately
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            monitor.connect_requested(),
        )
        .await
        .unwrap();
    }
}
