//! Multi-subscriber notification channel.

use std::fmt;

/// Token returned by [`Signal::subscribe`] and consumed by [`Signal::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Publishes events of a single kind to every registered subscriber.
///
/// Subscribers are invoked in subscription order. The signal owns its
/// callbacks, so dropping the signal drops every subscription with it.
pub struct Signal<E> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Box<dyn FnMut(&E)>)>,
}

impl<E> Signal<E> {
    /// Creates a signal without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    /// Registers a callback invoked for every emitted event.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&E) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscription. Returns `false` when the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(candidate, _)| *candidate != id);
        self.subscribers.len() != before
    }

    /// Delivers the event to every subscriber.
    pub fn emit(&mut self, event: &E) {
        for (_, callback) in &mut self.subscribers {
            callback(event);
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drops every subscription.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Signal;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn every_subscriber_receives_events_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::new();

        let first = Rc::clone(&log);
        let _ = signal.subscribe(move |value: &u32| first.borrow_mut().push(("a", *value)));
        let second = Rc::clone(&log);
        let _ = signal.subscribe(move |value: &u32| second.borrow_mut().push(("b", *value)));

        signal.emit(&5);

        assert_eq!(*log.borrow(), vec![("a", 5), ("b", 5)]);
    }

    #[test]
    fn unsubscribed_callbacks_stop_receiving() {
        let hits = Rc::new(RefCell::new(0));
        let mut signal = Signal::new();
        let counter = Rc::clone(&hits);
        let id = signal.subscribe(move |_: &()| *counter.borrow_mut() += 1);

        signal.emit(&());
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id), "second unsubscribe is a no-op");
        signal.emit(&());

        assert_eq!(*hits.borrow(), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn dropping_signal_releases_captured_state() {
        let shared = Rc::new(());
        let mut signal = Signal::new();
        let captured = Rc::clone(&shared);
        let _ = signal.subscribe(move |_: &u8| {
            let _ = &captured;
        });
        assert_eq!(Rc::strong_count(&shared), 2);

        drop(signal);

        assert_eq!(Rc::strong_count(&shared), 1);
    }
}
