use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256};

/// 32-byte on-chain request identifier.
pub type RequestId = B256;

/// A `Requested` event (or pending-list record) as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub request_id: RequestId,
    pub data_source: String,
    pub selector: String,
    /// Unix seconds.
    pub execution_timestamp: u64,
    /// Unix seconds. Either supplied by the contract or derived from the
    /// execution timestamp plus the settlement offset.
    pub fulfillment_timestamp: u64,
    pub callback_address: Address,
    pub aggregation_type: u8,
    pub precision: u8,
    /// Block the event was emitted in. `None` for records read through view
    /// calls, which carry no block context.
    pub block_number: Option<u64>,
}

impl RequestDescriptor {
    pub fn into_request(self) -> Request {
        Request {
            id: self.request_id,
            data_source: self.data_source,
            selector: self.selector,
            execution_timestamp: self.execution_timestamp,
            fulfillment_timestamp: self.fulfillment_timestamp,
            submitted: false,
        }
    }
}

/// Where a descriptor entered the pipeline from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverySource {
    Backfill,
    PendingList,
    Live,
}

impl fmt::Display for DeliverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backfill => write!(f, "backfill"),
            Self::PendingList => write!(f, "pending_list"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Message carried by the bounded ingestion queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub source: DeliverySource,
    pub descriptor: RequestDescriptor,
    /// Whether handling this delivery may move the cursor to its block.
    /// Live events seen while a replay is still scanning older blocks must
    /// not, or an interrupted replay would resume past blocks it never read.
    pub advances_cursor: bool,
}

impl Delivery {
    pub fn replayed(source: DeliverySource, descriptor: RequestDescriptor) -> Self {
        Self {
            source,
            descriptor,
            advances_cursor: true,
        }
    }

    pub fn live(descriptor: RequestDescriptor, replay_done: bool) -> Self {
        Self {
            source: DeliverySource::Live,
            descriptor,
            advances_cursor: replay_done,
        }
    }

    /// Block the cursor may advance to once this delivery is handled.
    pub fn cursor_block(&self) -> Option<u64> {
        self.descriptor.block_number.filter(|_| self.advances_cursor)
    }
}

/// A request owned by exactly one processing task. Also the durable
/// projection kept by the pending request store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: RequestId,
    pub data_source: String,
    pub selector: String,
    pub execution_timestamp: u64,
    pub fulfillment_timestamp: u64,
    /// Flips to true once the result submission transaction was accepted.
    pub submitted: bool,
}

/// Stored form of a [`Request`].
pub type PendingEntry = Request;

impl Request {
    /// True once the fulfillment deadline is at or before `now` (unix seconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.fulfillment_timestamp <= now
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Hex rendering used in every log line that names a request.
pub fn short_id(id: &RequestId) -> String {
    format!("{:#x}", id)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_inclusive_of_deadline() {
        let request = fixtures::request(1, 100, 200);
        assert!(!request.is_expired_at(199));
        assert!(request.is_expired_at(200));
        assert!(request.is_expired_at(201));
    }

    #[test]
    fn test_live_delivery_during_replay_keeps_cursor() {
        let mut descriptor = fixtures::descriptor(1, 10, 20);
        descriptor.block_number = Some(9_000);

        assert_eq!(Delivery::live(descriptor.clone(), false).cursor_block(), None);
        assert_eq!(Delivery::live(descriptor.clone(), true).cursor_block(), Some(9_000));
        assert_eq!(
            Delivery::replayed(DeliverySource::Backfill, descriptor).cursor_block(),
            Some(9_000)
        );

        let unblocked = fixtures::descriptor(2, 10, 20);
        assert_eq!(Delivery::replayed(DeliverySource::PendingList, unblocked).cursor_block(), None);
    }

    #[test]
    fn test_descriptor_into_request_is_unsubmitted() {
        let request = fixtures::descriptor(7, 10, 20).into_request();
        assert_eq!(request.id, B256::repeat_byte(7));
        assert_eq!(request.execution_timestamp, 10);
        assert_eq!(request.fulfillment_timestamp, 20);
        assert!(!request.submitted);
    }
}
