//! loam-core - Core library for loam
//!
//! This crate contains the shared models, the durable sync queue, and the
//! offline synchronization / conflict resolution logic used by all loam
//! interfaces.

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Conversation, EntityKind, KnowledgeItem, RemoteEntity};
