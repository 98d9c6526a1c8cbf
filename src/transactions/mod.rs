//! Chain writes from the node's signing account.
//!
//! Every send goes through one lock per signing key, so the nonce is picked
//! by exactly one in-flight transaction at a time. Retries re-acquire the
//! lock and rebuild the transaction, which fetches a fresh nonce.

mod submitter;

pub use submitter::{RetryPolicy, SubmissionPolicy, TransactionSubmitter};
