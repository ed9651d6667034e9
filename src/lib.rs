//! pulsewire: real-time host metrics pipeline
//!
//! Collects CPU, memory, disk and network usage on a fixed cadence,
//! validates and persists every tick, and fans each tick out to live
//! WebSocket subscribers through a single broadcast hub.

pub mod actors;
pub mod api;
pub mod collectors;
pub mod config;
pub mod connection;
pub mod metrics;
pub mod publish;
pub mod storage;
pub mod util;
