//! Source fed by a producer thread over `std::sync::mpsc`

use log::debug;
use std::sync::mpsc::{Receiver, RecvError};

use crate::core::MeasurementBatch;
use crate::source::{MeasurementSource, SourceError, SourceResult};

/// Blocks on the receiver until a batch arrives or every sender is dropped
pub struct ChannelSource {
    receiver: Receiver<MeasurementBatch>,
    /// Batch count the producer promised; hanging up early is an error
    expected: Option<u64>,
    received: u64,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<MeasurementBatch>) -> Self {
        Self {
            receiver,
            expected: None,
            received: 0,
        }
    }

    pub fn with_expected(mut self, batches: u64) -> Self {
        self.expected = Some(batches);
        self
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

impl MeasurementSource for ChannelSource {
    fn next_batch(&mut self) -> SourceResult<Option<MeasurementBatch>> {
        if self.expected.map_or(false, |n| self.received >= n) {
            return Ok(None);
        }
        match self.receiver.recv() {
            Ok(batch) => {
                self.received += 1;
                Ok(Some(batch))
            }
            Err(RecvError) => match self.expected {
                Some(expected) => Err(SourceError::Disconnected {
                    reason: format!("producer hung up after {} of {} batches", self.received, expected),
                }),
                None => {
                    debug!("Producer closed the channel after {} batches", self.received);
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Measurement;
    use std::sync::mpsc;
    use std::thread;

    fn batch(value: f64) -> MeasurementBatch {
        MeasurementBatch::new((1..=4).map(|id| Measurement::new(id, value)).collect())
    }

    #[test]
    fn test_stream_from_producer_thread() {
        let (sender, receiver) = mpsc::channel();
        let producer = thread::spawn(move || {
            for i in 0..3 {
                sender.send(batch(i as f64)).unwrap();
            }
        });

        let mut source = ChannelSource::new(receiver);
        let mut seen = Vec::new();
        while let Some(b) = source.next_batch().unwrap() {
            seen.push(b.time_for(1).unwrap());
        }
        producer.join().unwrap();

        assert_eq!(seen, vec![0.0, 1.0, 2.0]);
        assert_eq!(source.received(), 3);
    }

    #[test]
    fn test_early_hangup_with_expected_count() {
        let (sender, receiver) = mpsc::channel();
        sender.send(batch(1.0)).unwrap();
        drop(sender);

        let mut source = ChannelSource::new(receiver).with_expected(2);
        assert!(source.next_batch().unwrap().is_some());
        assert!(matches!(source.next_batch(), Err(SourceError::Disconnected { .. })));
    }

    #[test]
    fn test_expected_count_ends_stream() {
        let (sender, receiver) = mpsc::channel();
        sender.send(batch(1.0)).unwrap();
        sender.send(batch(2.0)).unwrap();

        let mut source = ChannelSource::new(receiver).with_expected(1);
        assert!(source.next_batch().unwrap().is_some());
        assert!(source.next_batch().unwrap().is_none());
    }
}
