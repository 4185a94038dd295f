use crate::domain::ReadingSource;
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, RawReading};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Adapter for an external feed that pushes readings into a channel.
///
/// Each poll drains whatever is queued, up to `max_batch`, without waiting.
/// An empty queue yields an empty batch; a closed and drained channel is a
/// source failure.
pub struct ChannelReadingSource {
    receiver: mpsc::Receiver<RawReading>,
    max_batch: usize,
}

impl ChannelReadingSource {
    pub fn new(receiver: mpsc::Receiver<RawReading>, max_batch: usize) -> Self {
        Self {
            receiver,
            max_batch: max_batch.max(1),
        }
    }

    /// Bounded channel plus the source reading from it.
    pub fn channel(capacity: usize, max_batch: usize) -> (mpsc::Sender<RawReading>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx, max_batch))
    }
}

#[async_trait]
impl ReadingSource for ChannelReadingSource {
    async fn next_batch(&mut self) -> DomainResult<Vec<RawReading>> {
        let mut batch = Vec::new();
        while batch.len() < self.max_batch {
            match self.receiver.try_recv() {
                Ok(reading) => batch.push(reading),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if batch.is_empty() {
                        return Err(DomainError::SourceFailure(
                            "reading feed closed".to_string(),
                        ));
                    }
                    break;
                }
            }
        }
        Ok(batch)
    }
}
