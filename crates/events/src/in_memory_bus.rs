//! In-memory event bus for tests/dev.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    Poisoned,
}

/// In-memory fan-out bus backed by std channels.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        // Dropped receivers are pruned on publish.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

/// Bus that discards everything; used when nobody listens.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventBus;

impl<M: Send + 'static> EventBus<M> for NullEventBus {
    type Error = core::convert::Infallible;

    fn publish(&self, _message: M) -> Result<(), Self::Error> {
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (_tx, rx) = mpsc::channel();
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7).unwrap();

        assert_eq!(a.drain(), vec![7]);
        assert_eq!(b.drain(), vec![7]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::<u32>::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(1).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.drain(), vec![1]);
    }
}
