//! Commit pipeline: batching and durable commit of admitted transactions

mod batch_queue;
mod errors;
mod process;

pub use batch_queue::{CommitBatchQueue, CommittedTransaction, CompletionHook};
pub use errors::{CommitError, CommitResult};
pub use process::{
    LogCommitProcess, TransactionApplier, TransactionCommitProcess, TransactionToApply,
};
