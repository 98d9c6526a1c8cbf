use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolEvent};
use alloy::transports::{RpcError as TransportRpcError, TransportErrorKind};
use async_trait::async_trait;
use futures::stream;
use tokio::sync::broadcast::error::RecvError;
use url::Url;

use super::{ChainError, ChainInterface, CoreCall, RequestStream};
use crate::rpc::{RpcClient, RpcClientConfig, RpcError};
use crate::types::config::chain::{ChainConfig, ContractVersion};
use crate::types::contract::{IOrakuruCore, IOrakuruCoreV1};
use crate::types::request::{RequestDescriptor, RequestId};

/// Turns raw `Requested` logs into descriptors for the configured contract
/// version.
#[derive(Debug, Clone, Copy)]
pub struct RequestedDecoder {
    pub version: ContractVersion,
    pub settlement_offset_secs: u64,
}

impl RequestedDecoder {
    pub fn topic0(&self) -> alloy::primitives::B256 {
        match self.version {
            ContractVersion::V1 => IOrakuruCoreV1::Requested::SIGNATURE_HASH,
            ContractVersion::V2 => IOrakuruCore::Requested::SIGNATURE_HASH,
        }
    }

    pub fn decode(&self, log: &Log) -> Result<RequestDescriptor, ChainError> {
        let block_number = log.block_number;
        match self.version {
            ContractVersion::V1 => {
                let event = IOrakuruCoreV1::Requested::decode_log_data(&log.inner.data)
                    .map_err(|e| ChainError::Decode(e.to_string()))?;
                let execution = event.executionTimestamp.saturating_to::<u64>();
                let published = event.fulfillmentTimestamp.saturating_to::<u64>();
                Ok(RequestDescriptor {
                    request_id: event.requestId,
                    data_source: event.dataSource,
                    selector: event.selector,
                    execution_timestamp: execution,
                    fulfillment_timestamp: self.version.fulfillment_timestamp(
                        execution,
                        Some(published),
                        self.settlement_offset_secs,
                    ),
                    callback_address: event.callbackAddr,
                    aggregation_type: event.aggrType,
                    precision: event.precision,
                    block_number,
                })
            }
            ContractVersion::V2 => {
                let event = IOrakuruCore::Requested::decode_log_data(&log.inner.data)
                    .map_err(|e| ChainError::Decode(e.to_string()))?;
                let execution = event.executionTimestamp.saturating_to::<u64>();
                Ok(RequestDescriptor {
                    request_id: event.requestId,
                    data_source: event.dataSource,
                    selector: event.selector,
                    execution_timestamp: execution,
                    fulfillment_timestamp: self.version.fulfillment_timestamp(
                        execution,
                        None,
                        self.settlement_offset_secs,
                    ),
                    callback_address: event.callbackAddr,
                    aggregation_type: event.aggrType,
                    precision: event.precision,
                    block_number,
                })
            }
        }
    }
}

/// [`ChainInterface`] backed by JSON-RPC: HTTP for reads and writes,
/// WebSocket for the live subscription.
pub struct CoreContractClient {
    rpc: RpcClient,
    sender: DynProvider,
    ws_url: String,
    core_address: Address,
    signer_address: Address,
    decoder: RequestedDecoder,
}

impl CoreContractClient {
    pub fn new(
        config: &ChainConfig,
        rpc_url: &str,
        ws_url: &str,
        signer: PrivateKeySigner,
    ) -> Result<Self, ChainError> {
        let url = Url::parse(rpc_url).map_err(|e| RpcError::InvalidUrl(e.to_string()))?;

        let mut rpc_config = RpcClientConfig::new(url.clone());
        if let Some(rps) = config.requests_per_second.and_then(std::num::NonZeroU32::new) {
            rpc_config = rpc_config.with_rate_limit(crate::rpc::RateLimitConfig::per_second(rps));
        }
        let rpc = RpcClient::new(rpc_config)?;

        let signer_address = signer.address();
        // The default fillers look up the pending nonce on every send, so a
        // rebuilt transaction never reuses a stale one.
        let sender = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        Ok(Self {
            rpc,
            sender,
            ws_url: ws_url.to_string(),
            core_address: config.core_address,
            signer_address,
            decoder: RequestedDecoder {
                version: config.contract_version,
                settlement_offset_secs: config.settlement_offset_secs,
            },
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.rpc.get_chain_id().await?)
    }

    fn requested_filter(&self) -> Filter {
        Filter::new()
            .address(self.core_address)
            .event_signature(self.decoder.topic0())
    }

    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, ChainError> {
        let tx = TransactionRequest::default()
            .with_to(self.core_address)
            .with_input(Bytes::from(call.abi_encode()));
        let output = self.rpc.call(&tx, None).await?;
        C::abi_decode_returns(&output).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

/// Map one broadcast receive to a stream item. A closed channel ends the
/// stream; a lagged receiver has lost events and is reported as a transport
/// failure.
fn live_item(
    received: Result<Log, RecvError>,
    decoder: &RequestedDecoder,
) -> Option<Result<RequestDescriptor, ChainError>> {
    match received {
        Ok(log) => Some(decoder.decode(&log)),
        Err(RecvError::Lagged(missed)) => Some(Err(ChainError::Transport(format!(
            "live subscription lagged, {} events dropped",
            missed
        )))),
        Err(RecvError::Closed) => None,
    }
}

fn classify_send_error(e: TransportRpcError<TransportErrorKind>) -> ChainError {
    match e.as_error_resp() {
        Some(payload) => ChainError::Rejected(payload.to_string()),
        None => ChainError::Transport(e.to_string()),
    }
}

#[async_trait]
impl ChainInterface for CoreContractClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.rpc.get_block_number().await?)
    }

    async fn requested_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RequestDescriptor>, ChainError> {
        let filter = self
            .requested_filter()
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.rpc.get_logs(&filter).await?;

        let mut descriptors = Vec::with_capacity(logs.len());
        for log in &logs {
            match self.decoder.decode(log) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => tracing::warn!(
                    "Skipping undecodable Requested log in block {:?}: {}",
                    log.block_number,
                    e
                ),
            }
        }
        Ok(descriptors)
    }

    async fn watch_requested(&self) -> Result<RequestStream, ChainError> {
        // No transparent reconnects: a dropped socket must end the stream so
        // ingestion replays whatever was emitted while it was down.
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(self.ws_url.clone()).with_max_retries(0))
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .erased();

        let subscription = provider
            .subscribe_logs(&self.requested_filter())
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let decoder = self.decoder;
        // The stream owns the connection; dropping it closes the socket.
        let stream = stream::unfold(
            Some((subscription, provider)),
            move |state| async move {
                let (mut subscription, provider) = state?;
                match live_item(subscription.recv().await, &decoder)? {
                    Ok(descriptor) => Some((Ok(descriptor), Some((subscription, provider)))),
                    Err(e) => Some((Err(e), None)),
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn pending_request_ids(&self) -> Result<Vec<RequestId>, ChainError> {
        self.view(IOrakuruCore::getPendingRequestsCall {}).await
    }

    async fn request(&self, request_id: RequestId) -> Result<RequestDescriptor, ChainError> {
        let record = self.view(IOrakuruCore::requestsCall { id: request_id }).await?;
        let execution = record.executionTimestamp.saturating_to::<u64>();
        Ok(RequestDescriptor {
            request_id,
            data_source: record.dataSource,
            selector: record.selector,
            execution_timestamp: execution,
            fulfillment_timestamp: self.decoder.version.fulfillment_timestamp(
                execution,
                None,
                self.decoder.settlement_offset_secs,
            ),
            callback_address: record.callbackAddr,
            aggregation_type: record.aggrType,
            precision: record.precision,
            block_number: None,
        })
    }

    async fn send_transaction(&self, call: CoreCall) -> Result<TxHash, ChainError> {
        let input = match &call {
            CoreCall::SubmitResult { request_id, result } => IOrakuruCore::submitResultCall {
                _requestId: *request_id,
                _result: result.clone(),
            }
            .abi_encode(),
            CoreCall::FulfillRequest { request_id } => IOrakuruCore::fulfillRequestCall {
                _requestId: *request_id,
            }
            .abi_encode(),
        };

        let tx = TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(self.core_address)
            .with_input(Bytes::from(input));

        let pending = self
            .sender
            .send_transaction(tx)
            .await
            .map_err(classify_send_error)?;
        Ok(*pending.tx_hash())
    }
}
