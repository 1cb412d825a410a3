//! Offline synchronization and conflict resolution
//!
//! Local mutations are appended to the durable queue as a write-ahead log and
//! drained against the remote store by the [`engine::SyncEngine`] — on
//! reconnect, on demand, or opportunistically after an enqueue. Remote change
//! notifications flow through the [`listener::ChangeListener`], which filters
//! this device's own echoes and hands real divergence to the
//! [`conflict::ConflictDetector`]; the [`resolver`] applies a chosen strategy
//! and writes the outcome back.

pub mod conflict;
pub mod engine;
pub mod listener;
pub mod marker;
pub mod network;
mod operation;
pub mod resolver;

pub use conflict::{Conflict, ConflictDetector, ConflictKind};
pub use engine::{SyncEngine, SyncEvent, SyncReport, DEFAULT_MAX_RETRIES};
pub use listener::ChangeListener;
pub use marker::LocalChangeTracker;
pub use network::{ConnectivityProbe, NetworkMonitor, NetworkStatus};
pub use operation::{OperationId, OperationKind, OperationPayload, SyncOperation};
pub use resolver::{resolve, ConflictResolver, Resolution, ResolutionStrategy};
