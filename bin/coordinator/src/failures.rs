//! Background loops feeding and sweeping the dead letter queue.

use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use switchyard_dlq::nats::decode_failure;
use switchyard_dlq::{DeadLetterQueue, DeadLetterStore, TaskBroker};
use tracing::{debug, error, info, warn};

/// How a delivered failure signal was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Recorded; never deliver again.
    Ack,
    /// Not recorded; deliver again later.
    Retry,
    /// Undecodable; never deliver again.
    Reject,
}

/// A failure signal delivered by the message bus.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn payload(&self) -> &[u8];

    /// Reports the outcome back to the bus.
    async fn settle(&self, settlement: Settlement) -> Result<(), async_nats::Error>;
}

#[async_trait]
impl Delivery for jetstream::Message {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn settle(&self, settlement: Settlement) -> Result<(), async_nats::Error> {
        let kind = match settlement {
            Settlement::Ack => AckKind::Ack,
            Settlement::Retry => AckKind::Nak(None),
            Settlement::Reject => AckKind::Term,
        };
        self.ack_with(kind).await
    }
}

/// Records every failure signal from `deliveries` in `queue` until the
/// stream ends, settling each one. Returns the number recorded.
pub async fn consume_failures<D, Q, B, S>(deliveries: Q, queue: Arc<DeadLetterQueue<B, S>>) -> usize
where
    D: Delivery,
    Q: Stream<Item = D>,
    B: TaskBroker,
    S: DeadLetterStore,
{
    let mut deliveries = std::pin::pin!(deliveries);
    let mut recorded = 0;

    while let Some(delivery) = deliveries.next().await {
        let settlement = match decode_failure(delivery.payload()) {
            Ok(failure) => match queue.record_failure(failure).await {
                Ok(_) => {
                    recorded += 1;
                    Settlement::Ack
                }
                Err(e) => {
                    error!(error = %e, "failed to record failure signal, requesting redelivery");
                    Settlement::Retry
                }
            },
            Err(e) => {
                warn!(error = %e, "dropping undecodable failure signal");
                Settlement::Reject
            }
        };
        if let Err(e) = delivery.settle(settlement).await {
            warn!(error = %e, ?settlement, "failed to settle failure signal");
        }
    }

    info!(recorded, "failure signal stream ended");
    recorded
}

/// Runs `cleanup_expired` on `queue` every `period`, forever.
pub async fn sweep_expired<B: TaskBroker, S: DeadLetterStore>(
    queue: Arc<DeadLetterQueue<B, S>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let removed = queue.cleanup_expired().await;
        if removed > 0 {
            debug!(removed, "periodic dead letter sweep");
        }
    }
}
