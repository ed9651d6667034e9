//! Actor-based pipeline
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels and is driven through a cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌──────────────────┐   save_batch   ┌─────────────┐
//!   │   Orchestrator   │ ─────────────► │   Storage   │
//!   └────────┬─────────┘                └─────────────┘
//!            │ Snapshot, Alert (try_send)
//!   ┌────────▼─────────┐
//!   │  BroadcastHub    │ ◄── register / unregister (Connections)
//!   └────────┬─────────┘
//!            │ Arc<Payload> per mailbox
//!     ┌──────┼──────┐
//!     ▼      ▼      ▼
//!   conn   conn   conn
//! ```
//!
//! ## Actor Types
//!
//! - **OrchestratorActor**: Runs collection ticks at the configured interval
//! - **HubActor**: Owns the subscriber membership set and fans payloads out
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Mailboxes**: Bounded per-subscriber queues, filled only by the hub
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod hub;
pub mod messages;
pub mod orchestrator;

pub use hub::{Broadcaster, HubError, HubHandle, Subscription};
pub use messages::{Alert, HubStats, Payload, Snapshot, SubscriberId, TickReport};
pub use orchestrator::{Orchestrator, OrchestratorHandle, TickError};
