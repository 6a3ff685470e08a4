//! Replicated transaction state machine
//!
//! Uninstalled -> Installed -> Panicked (terminal)

mod errors;
mod outcome;
mod replicated;

pub use errors::StateMachineError;
pub use outcome::{callback_channel, ResultCallback, TxFailure, TxOutcome, TxResult};
pub use replicated::{
    ApplySettings, DuplicateDeliveryPolicy, ReplicatedTransactionStateMachine, StateMachineStatus,
};
