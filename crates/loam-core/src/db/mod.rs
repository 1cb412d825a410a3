//! Local persistence layer

mod conflict_log;
mod connection;
mod migrations;
mod queue;

pub use conflict_log::{ConflictLog, ConflictRecord, LibSqlConflictLog};
pub use connection::Database;
pub use queue::{LibSqlQueueRepository, QueueRepository};
