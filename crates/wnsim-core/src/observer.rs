//! Typed notifications between components.
//!
//! Components expose [`Observers`] for the notifications they produce (e.g. a device reporting dropped
//! frames), and interested parties such as statistics collectors subscribe to them during setup.

/// Handle returned on subscription, used to unsubscribe.
pub type SubscriptionId = u64;

/// A list of subscribers to notifications of type `T`.
///
/// Subscribers are invoked synchronously in the order of subscription.
pub struct Observers<T> {
    next_id: SubscriptionId,
    subscribers: Vec<(SubscriptionId, Box<dyn FnMut(&T)>)>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observers<T> {
    /// Creates an empty subscriber list.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    /// Registers a subscriber and returns its handle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use wnsim_core::Observers;
    ///
    /// let drops = Rc::new(Cell::new(0));
    /// let mut observers = Observers::<u32>::new();
    /// let drops_clone = drops.clone();
    /// let id = observers.subscribe(move |_| drops_clone.set(drops_clone.get() + 1));
    /// observers.notify(&7);
    /// assert!(observers.unsubscribe(id));
    /// observers.notify(&8);
    /// assert_eq!(drops.get(), 1);
    /// ```
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes the subscriber. Returns `false` if there is no subscriber with such handle.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let len = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != len
    }

    /// Delivers the notification to all subscribers.
    pub fn notify(&mut self, value: &T) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(value);
        }
    }

    /// Returns the number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns true if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
