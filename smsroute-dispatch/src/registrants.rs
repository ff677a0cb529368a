//! Ordered observer list with explicit unsubscribe.
//!
//! New subscribers immediately receive the most recent value, if any, before
//! any later notification.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The receiving end handed to a subscriber.
#[derive(Debug)]
pub struct Subscription<T> {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<T>,
}

#[derive(Debug)]
pub struct Registrants<T> {
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<T>)>,
    last: Option<T>,
    next_id: u64,
}

impl<T> Default for Registrants<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            last: None,
            next_id: 0,
        }
    }
}

impl<T: Clone> Registrants<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber, replaying the last notified value to it.
    pub fn subscribe(&mut self) -> Subscription<T> {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        if let Some(last) = &self.last {
            // The receiver is alive, it was created above.
            let _ = sender.send(last.clone());
        }

        self.subscribers.push((id, sender));
        Subscription { id, receiver }
    }

    /// Returns `true` if the subscriber was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Notify every subscriber in subscription order. Subscribers whose
    /// receiver has been dropped are removed.
    pub fn notify(&mut self, value: T) {
        self.subscribers
            .retain(|(_, sender)| sender.send(value.clone()).is_ok());
        self.last = Some(value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    #[must_use]
    pub const fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }
}
