//! Chain interface consumed by the pipeline.
//!
//! Everything the node needs from the chain goes through [`ChainInterface`]:
//! height queries, historical and live `Requested` logs, the pending-list
//! view calls and the two signed writes.

mod contract;
#[cfg(test)]
pub(crate) mod mock;

use alloy::primitives::TxHash;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::rpc::RpcError;
use crate::types::request::{RequestDescriptor, RequestId};

pub use contract::CoreContractClient;

/// Live `Requested` descriptors. An `Err` item or the end of the stream both
/// mean the subscription is gone.
pub type RequestStream = BoxStream<'static, Result<RequestDescriptor, ChainError>>;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Connection-level failure; the request may never have reached a node.
    #[error("chain transport error: {0}")]
    Transport(String),

    /// The node answered and refused the call or transaction.
    #[error("chain rejected call: {0}")]
    Rejected(String),

    #[error("failed to decode chain data: {0}")]
    Decode(String),
}

impl ChainError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, ChainError::Rejected(_))
    }
}

impl From<RpcError> for ChainError {
    fn from(e: RpcError) -> Self {
        ChainError::Transport(e.to_string())
    }
}

/// A state-changing call on the core contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCall {
    SubmitResult { request_id: RequestId, result: String },
    FulfillRequest { request_id: RequestId },
}

impl CoreCall {
    pub fn request_id(&self) -> RequestId {
        match self {
            CoreCall::SubmitResult { request_id, .. } => *request_id,
            CoreCall::FulfillRequest { request_id } => *request_id,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            CoreCall::SubmitResult { .. } => "submitResult",
            CoreCall::FulfillRequest { .. } => "fulfillRequest",
        }
    }
}

#[async_trait]
pub trait ChainInterface: Send + Sync + 'static {
    /// Current chain height.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// `Requested` events emitted in `[from_block, to_block]`, inclusive.
    async fn requested_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RequestDescriptor>, ChainError>;

    /// Subscribe to newly emitted `Requested` events.
    async fn watch_requested(&self) -> Result<RequestStream, ChainError>;

    /// Ids of requests the core contract still considers outstanding.
    async fn pending_request_ids(&self) -> Result<Vec<RequestId>, ChainError>;

    /// Read a single request record through a view call.
    async fn request(&self, request_id: RequestId) -> Result<RequestDescriptor, ChainError>;

    /// Sign and broadcast `call` from the node's account. Callers serialize
    /// sends per signing key; implementations pick the nonce at send time.
    async fn send_transaction(&self, call: CoreCall) -> Result<TxHash, ChainError>;
}
