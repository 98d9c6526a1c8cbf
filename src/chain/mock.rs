//! In-process [`ChainInterface`] double that records every call.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{TxHash, B256};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};

use super::{ChainError, ChainInterface, CoreCall, RequestStream};
use crate::types::request::{RequestDescriptor, RequestId};

#[derive(Default)]
struct MockState {
    height: u64,
    /// Heights returned by upcoming `block_number` queries, before `height`.
    height_script: VecDeque<u64>,
    events: Vec<RequestDescriptor>,
    log_queries: Vec<(u64, u64)>,
    log_delay: Duration,
    pending: Vec<RequestDescriptor>,
    pending_queries: usize,
    sent: Vec<CoreCall>,
    send_failures: VecDeque<ChainError>,
    send_delay: Duration,
    in_flight_sends: usize,
    max_in_flight_sends: usize,
    live: Vec<UnboundedSender<Result<RequestDescriptor, ChainError>>>,
    fail_next_subscribe: usize,
    subscriptions: usize,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    /// Make the next `block_number` queries return `heights` in order. The
    /// last value then sticks.
    pub fn script_heights(&self, heights: &[u64]) {
        self.state.lock().unwrap().height_script = heights.iter().copied().collect();
    }

    pub fn add_event(&self, descriptor: RequestDescriptor) {
        self.state.lock().unwrap().events.push(descriptor);
    }

    pub fn add_pending(&self, descriptor: RequestDescriptor) {
        self.state.lock().unwrap().pending.push(descriptor);
    }

    pub fn fail_next_send(&self, error: ChainError) {
        self.state.lock().unwrap().send_failures.push_back(error);
    }

    pub fn fail_next_subscribe(&self) {
        self.state.lock().unwrap().fail_next_subscribe += 1;
    }

    pub fn set_log_delay(&self, delay: Duration) {
        self.state.lock().unwrap().log_delay = delay;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = delay;
    }

    /// Push a live event to every open subscription.
    pub fn emit_live(&self, descriptor: RequestDescriptor) {
        let state = self.state.lock().unwrap();
        for tx in &state.live {
            let _ = tx.unbounded_send(Ok(descriptor.clone()));
        }
    }

    /// Break every open subscription with a transport error.
    pub fn break_subscriptions(&self) {
        let mut state = self.state.lock().unwrap();
        for tx in state.live.drain(..) {
            let _ = tx.unbounded_send(Err(ChainError::Transport("socket closed".into())));
        }
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_queries.clone()
    }

    pub fn pending_queries(&self) -> usize {
        self.state.lock().unwrap().pending_queries
    }

    pub fn sent(&self) -> Vec<CoreCall> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|c| c.method() == method)
            .count()
    }

    pub fn max_in_flight_sends(&self) -> usize {
        self.state.lock().unwrap().max_in_flight_sends
    }

    pub fn subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscriptions
    }
}

#[async_trait]
impl ChainInterface for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        if let Some(next) = state.height_script.pop_front() {
            state.height = next;
        }
        Ok(state.height)
    }

    async fn requested_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RequestDescriptor>, ChainError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.log_queries.push((from_block, to_block));
            state.log_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .iter()
            .filter(|e| {
                e.block_number
                    .is_some_and(|b| b >= from_block && b <= to_block)
            })
            .cloned()
            .collect())
    }

    async fn watch_requested(&self) -> Result<RequestStream, ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_subscribe > 0 {
            state.fail_next_subscribe -= 1;
            return Err(ChainError::Transport("connection refused".into()));
        }
        let (tx, rx) = unbounded();
        state.live.push(tx);
        state.subscriptions += 1;
        Ok(Box::pin(rx))
    }

    async fn pending_request_ids(&self) -> Result<Vec<RequestId>, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.pending_queries += 1;
        Ok(state.pending.iter().map(|d| d.request_id).collect())
    }

    async fn request(&self, request_id: RequestId) -> Result<RequestDescriptor, ChainError> {
        let state = self.state.lock().unwrap();
        state
            .pending
            .iter()
            .find(|d| d.request_id == request_id)
            .cloned()
            .ok_or_else(|| ChainError::Rejected("unknown request".into()))
    }

    async fn send_transaction(&self, call: CoreCall) -> Result<TxHash, ChainError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.in_flight_sends += 1;
            state.max_in_flight_sends = state.max_in_flight_sends.max(state.in_flight_sends);
            state.send_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.in_flight_sends -= 1;
        if let Some(error) = state.send_failures.pop_front() {
            return Err(error);
        }
        state.sent.push(call);
        Ok(B256::with_last_byte(state.sent.len() as u8))
    }
}
