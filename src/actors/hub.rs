//! BroadcastHub - Fans payloads out to live subscribers
//!
//! The hub runs a single serialized control loop that is the only owner of
//! the membership set. Everything else talks to it through [`HubHandle`].
//!
//! ## Message Flow
//!
//! ```text
//! register/unregister ──► control intake ──┐  (biased: drained first)
//!                                          ├─► HubActor ──try_send──► mailbox 1..N
//! snapshot/alert ──try_send──► broadcast intake ──┘
//! ```
//!
//! ## Backpressure
//!
//! - A subscriber whose mailbox is full is evicted on the spot. One slow
//!   consumer never stalls the others.
//! - When the broadcast intake itself is full the newest payload is dropped.
//!   The next tick supersedes it anyway.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use crate::config::HubConfig;

use super::messages::{
    Alert, HubCommand, HubStats, Mailbox, Payload, Snapshot, SubscriberId,
};

/// Errors returned when handing a payload to the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// Broadcast intake is full, the payload was dropped
    Saturated,

    /// The hub control loop is no longer running
    Closed,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Saturated => write!(f, "broadcast intake saturated, payload dropped"),
            HubError::Closed => write!(f, "hub is not running"),
        }
    }
}

impl std::error::Error for HubError {}

/// Fan-out seam used by the orchestrator
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, snapshot: Snapshot) -> Result<(), HubError>;

    fn broadcast_alert(&self, alert: Alert) -> Result<(), HubError>;
}

/// Counters readable without going through the control loop
#[derive(Debug, Default)]
struct HubShared {
    active: AtomicUsize,
    dropped_broadcasts: AtomicU64,
}

/// Actor owning the membership set
pub struct HubActor {
    /// Live subscribers; removing an entry closes its mailbox
    members: HashMap<SubscriberId, Mailbox>,

    /// Register/unregister/stats/shutdown intake
    control_rx: mpsc::Receiver<HubCommand>,

    /// Snapshot and alert intake
    broadcast_rx: mpsc::Receiver<Arc<Payload>>,

    shared: Arc<HubShared>,

    broadcasts: u64,
    deliveries: u64,
    evictions: u64,
}

impl HubActor {
    /// Run the control loop until shutdown or until every handle is dropped
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting broadcast hub");

        loop {
            tokio::select! {
                biased;

                cmd = self.control_rx.recv() => {
                    match cmd {
                        Some(HubCommand::Register { id, mailbox }) => self.register(id, mailbox),
                        Some(HubCommand::Unregister { id }) => self.unregister(id),
                        Some(HubCommand::GetStats { respond_to }) => {
                            let _ = respond_to.send(self.stats());
                        }
                        Some(HubCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }
                        None => {
                            warn!("control intake closed, shutting down");
                            break;
                        }
                    }
                }

                Some(payload) = self.broadcast_rx.recv() => {
                    self.fan_out(payload);
                }
            }
        }

        let remaining = self.members.len();
        self.members.clear();
        self.shared.active.store(0, Ordering::SeqCst);

        debug!("broadcast hub stopped, closed {remaining} mailboxes");
    }

    fn register(&mut self, id: SubscriberId, mailbox: Mailbox) {
        if self.members.insert(id, mailbox).is_some() {
            // re-registering replaces (and closes) the previous mailbox
            debug!("subscriber {id} re-registered");
        }
        self.sync_active();
        debug!("subscriber {id} registered ({} active)", self.members.len());
    }

    fn unregister(&mut self, id: SubscriberId) {
        if self.members.remove(&id).is_some() {
            self.sync_active();
            debug!("subscriber {id} unregistered ({} active)", self.members.len());
        } else {
            trace!("unregister for unknown subscriber {id} ignored");
        }
    }

    fn fan_out(&mut self, payload: Arc<Payload>) {
        self.broadcasts += 1;

        let mut evicted = Vec::new();

        for (id, mailbox) in &self.members {
            match mailbox.try_send(Arc::clone(&payload)) {
                Ok(()) => {
                    self.deliveries += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("subscriber {id} too slow, evicting");
                    self.evictions += 1;
                    evicted.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("subscriber {id} went away, removing");
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            self.members.remove(&id);
        }
        self.sync_active();

        trace!(
            "fanned out {} payload to {} subscribers",
            payload.kind(),
            self.members.len()
        );
    }

    fn sync_active(&self) {
        self.shared
            .active
            .store(self.members.len(), Ordering::SeqCst);
    }

    fn stats(&self) -> HubStats {
        HubStats {
            active: self.members.len(),
            broadcasts: self.broadcasts,
            deliveries: self.deliveries,
            evictions: self.evictions,
            dropped_broadcasts: self.shared.dropped_broadcasts.load(Ordering::SeqCst),
        }
    }
}

/// Mailbox handed to a freshly registered subscriber
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub mailbox: mpsc::Receiver<Arc<Payload>>,
}

/// Handle for talking to the hub
///
/// Cheap to clone; every clone feeds the same control loop.
#[derive(Clone)]
pub struct HubHandle {
    control_tx: mpsc::Sender<HubCommand>,
    broadcast_tx: mpsc::Sender<Arc<Payload>>,
    shared: Arc<HubShared>,
    mailbox_capacity: usize,
}

impl HubHandle {
    /// Create the handle and its actor without starting the loop
    pub fn new(config: &HubConfig) -> (Self, HubActor) {
        let (control_tx, control_rx) = mpsc::channel(config.control_capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_capacity);
        let shared = Arc::new(HubShared::default());

        let actor = HubActor {
            members: HashMap::new(),
            control_rx,
            broadcast_rx,
            shared: Arc::clone(&shared),
            broadcasts: 0,
            deliveries: 0,
            evictions: 0,
        };

        let handle = Self {
            control_tx,
            broadcast_tx,
            shared,
            mailbox_capacity: config.mailbox_capacity,
        };

        (handle, actor)
    }

    /// Spawn a new hub on the current runtime
    pub fn spawn(config: &HubConfig) -> Self {
        let (handle, actor) = Self::new(config);
        tokio::spawn(actor.run());
        handle
    }

    /// Create a mailbox of the configured capacity and register it
    pub async fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        self.register(id, tx).await;

        Subscription { id, mailbox: rx }
    }

    /// Register an already authorized subscriber
    ///
    /// If the hub has stopped this is a no-op and the mailbox is dropped,
    /// which the subscriber observes as a closed mailbox.
    pub async fn register(&self, id: SubscriberId, mailbox: Mailbox) {
        if self
            .control_tx
            .send(HubCommand::Register { id, mailbox })
            .await
            .is_err()
        {
            debug!("hub stopped, ignoring register for {id}");
        }
    }

    /// Remove a subscriber; unknown ids are ignored
    pub async fn unregister(&self, id: SubscriberId) {
        if self
            .control_tx
            .send(HubCommand::Unregister { id })
            .await
            .is_err()
        {
            trace!("hub stopped, ignoring unregister for {id}");
        }
    }

    /// Point-in-time number of registered subscribers
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Get fan-out statistics
    pub async fn stats(&self) -> Option<HubStats> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(HubCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Stop the hub and close every mailbox
    pub async fn shutdown(&self) {
        let _ = self.control_tx.send(HubCommand::Shutdown).await;
    }

    fn enqueue(&self, payload: Payload) -> Result<(), HubError> {
        match self.broadcast_tx.try_send(Arc::new(payload)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(payload)) => {
                self.shared.dropped_broadcasts.fetch_add(1, Ordering::SeqCst);
                warn!(
                    "broadcast intake saturated, dropping newest {} payload",
                    payload.kind()
                );
                Err(HubError::Saturated)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HubError::Closed),
        }
    }
}

impl Broadcaster for HubHandle {
    fn broadcast(&self, snapshot: Snapshot) -> Result<(), HubError> {
        self.enqueue(Payload::Snapshot(snapshot))
    }

    fn broadcast_alert(&self, alert: Alert) -> Result<(), HubError> {
        self.enqueue(Payload::Alert(alert))
    }
}
