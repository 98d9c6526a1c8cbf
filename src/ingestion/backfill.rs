use tokio::sync::mpsc::Sender;

use super::IngestionError;
use crate::chain::ChainInterface;
use crate::types::request::{Delivery, DeliverySource};

/// Replay `Requested` events from `from_block` up to the chain head in
/// inclusive chunks of `chunk_size` blocks. The head is re-read after every
/// chunk, so blocks produced during the scan are covered too.
///
/// Returns the number of descriptors delivered.
pub async fn backfill(
    chain: &dyn ChainInterface,
    from_block: u64,
    chunk_size: u64,
    tx: &Sender<Delivery>,
) -> Result<usize, IngestionError> {
    let chunk_size = chunk_size.max(1);
    let mut height = chain.block_number().await?;
    let mut start = from_block;
    let mut delivered = 0;

    tracing::info!(
        "Backfilling Requested events from block {} (head {})",
        from_block,
        height
    );

    while start <= height {
        let end = start.saturating_add(chunk_size - 1).min(height);

        let events = chain.requested_events(start, end).await?;
        tracing::debug!("Backfill range {}-{}: {} events", start, end, events.len());

        for descriptor in events {
            tx.send(Delivery::replayed(DeliverySource::Backfill, descriptor))
                .await
                .map_err(|_| IngestionError::QueueClosed)?;
            delivered += 1;
        }

        if end == u64::MAX {
            break;
        }
        start = end + 1;
        height = chain.block_number().await?;
    }

    tracing::info!(
        "Backfill complete at block {}: {} requests delivered",
        start.saturating_sub(1),
        delivered
    );
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::types::request::fixtures;
    use tokio::sync::mpsc;

    fn event_at(byte: u8, block: u64) -> crate::types::request::RequestDescriptor {
        let mut descriptor = fixtures::descriptor(byte, 100, 200);
        descriptor.block_number = Some(block);
        descriptor
    }

    #[tokio::test]
    async fn test_chunks_cover_range_without_gaps_or_overlap() {
        let chain = MockChain::new();
        chain.set_height(25);
        // Events on both sides of every chunk boundary.
        for (i, block) in [10u64, 13, 14, 19, 20, 24, 25].iter().enumerate() {
            chain.add_event(event_at(i as u8 + 1, *block));
        }
        chain.add_event(event_at(99, 9));

        let (tx, mut rx) = mpsc::channel(100);
        let delivered = backfill(&chain, 10, 5, &tx).await.unwrap();
        drop(tx);

        assert_eq!(
            chain.log_queries(),
            vec![(10, 14), (15, 19), (20, 24), (25, 25)]
        );

        let mut blocks = Vec::new();
        while let Some(delivery) = rx.recv().await {
            assert_eq!(delivery.source, DeliverySource::Backfill);
            blocks.push(delivery.descriptor.block_number.unwrap());
        }
        assert_eq!(delivered, 7);
        assert_eq!(blocks, vec![10, 13, 14, 19, 20, 24, 25]);
    }

    #[tokio::test]
    async fn test_follows_advancing_head() {
        let chain = MockChain::new();
        chain.script_heights(&[10, 14, 18]);

        let (tx, _rx) = mpsc::channel(100);
        backfill(&chain, 0, 8, &tx).await.unwrap();

        let queries = chain.log_queries();
        assert_eq!(queries, vec![(0, 7), (8, 14), (15, 18)]);
        for pair in queries.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
    }

    #[tokio::test]
    async fn test_cursor_at_head_scans_single_block() {
        let chain = MockChain::new();
        chain.set_height(50);

        let (tx, _rx) = mpsc::channel(1);
        backfill(&chain, 50, 4000, &tx).await.unwrap();
        assert_eq!(chain.log_queries(), vec![(50, 50)]);
    }

    #[tokio::test]
    async fn test_closed_queue_stops_backfill() {
        let chain = MockChain::new();
        chain.set_height(5);
        chain.add_event(event_at(1, 3));

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = backfill(&chain, 0, 10, &tx).await;
        assert!(matches!(result, Err(IngestionError::QueueClosed)));
    }
}
