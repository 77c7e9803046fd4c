// Database models - Re-exports all domain-specific models
//
// - meeting.rs: Meetings in the local replica
// - transaction.rs: Purchase transaction validation records

mod meeting;
mod transaction;

pub use meeting::Meeting;
pub use transaction::{
    CompletedTransaction, Environment, FailedTransaction, TransactionValidation,
};
