//! # shelfsync
//!
//! Synchronization engine for two-tier knowledge libraries: a shared
//! "base" tree maintained upstream and a "personal" tree of user
//! overrides layered on top of it.
//!
//! The engine tracks both trees against a common ancestor, classifies
//! changes three-way, resolves conflicts (automatically where safe),
//! snapshots the personal tree before every apply, and commits results
//! with per-file atomic writes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

/// Content fingerprinting
pub mod hash;

/// Line-oriented diff generation
pub mod diff;

/// Tree scanning and version tracking
pub mod tracker;

/// Three-way change classification
pub mod conflict;

/// Conflict resolution policies and the auto-merge
pub mod resolution;

/// Personal-tree snapshots and restore
pub mod backup;

/// Sync orchestration state machine
pub mod sync;

/// Debounced filesystem watching
pub mod watcher;

/// Configuration loading and validation
pub mod config;
