//! txreplica - applies consensus-ordered transactions to a durable store
//!
//! Transactions arrive as opaque payloads with a monotonically increasing
//! consensus index. The state machine drops redeliveries, fences stale lock
//! sessions, and hands admitted transactions to a batching commit pipeline
//! that appends them to the segmented transaction log before applying them.

pub mod cli;
pub mod command;
pub mod commit;
pub mod config;
pub mod crash_point;
pub mod health;
pub mod locking;
pub mod observability;
pub mod recovery;
pub mod state_machine;
pub mod transaction;
pub mod txlog;
