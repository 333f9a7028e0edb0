// source/events.rs
use log::trace;
use crate::types::FeatureRef;

/// Handle returned by `on_change`, used to unregister the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

/// Emitted synchronously whenever a source's feature set changes.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub revision: u64,
    pub features: Vec<FeatureRef>,
}

pub type ChangeListener = Box<dyn FnMut(&ChangeEvent)>;

/// Listener registry. Owners take the listeners out, run them with
/// `dispatch_to` while holding no borrow of themselves, then restore them.
#[derive(Default)]
pub struct Observable {
    listeners: Vec<(ListenerKey, ChangeListener)>,
    // Keys currently taken out for dispatch
    dispatching: Vec<ListenerKey>,
    // Unregistered while taken out; dropped on restore
    removed: Vec<ListenerKey>,
    next_key: u64,
    revision: u64,
}

impl Observable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, listener: ChangeListener) -> ListenerKey {
        let key = ListenerKey(self.next_key);
        self.next_key += 1;
        self.listeners.push((key, listener));
        key
    }

    pub fn un(&mut self, key: ListenerKey) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(k, _)| *k != key);
        if before != self.listeners.len() {
            return true;
        }
        match self.dispatching.iter().position(|k| *k == key) {
            Some(pos) => {
                self.dispatching.swap_remove(pos);
                self.removed.push(key);
                true
            },
            None => false,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len() + self.dispatching.len()
    }

    /// Bumps the revision and builds the event to hand to listeners.
    pub fn changed(&mut self, features: &[FeatureRef]) -> ChangeEvent {
        self.revision += 1;
        ChangeEvent {
            revision: self.revision,
            features: features.to_vec(),
        }
    }

    pub fn take_listeners(&mut self) -> Vec<(ListenerKey, ChangeListener)> {
        let taken = std::mem::take(&mut self.listeners);
        self.dispatching.extend(taken.iter().map(|(k, _)| *k));
        taken
    }

    /// Puts listeners back after dispatch, ahead of any registered meanwhile.
    /// Listeners unregistered during dispatch are dropped here.
    pub fn restore_listeners(&mut self, mut listeners: Vec<(ListenerKey, ChangeListener)>) {
        let removed = &mut self.removed;
        listeners.retain(|(key, _)| match removed.iter().position(|k| k == key) {
            Some(pos) => {
                removed.swap_remove(pos);
                false
            },
            None => true,
        });
        self.dispatching.retain(|k| !listeners.iter().any(|(key, _)| key == k));
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }
}

/// Runs listeners taken out of their registry.
pub fn dispatch_to(listeners: &mut [(ListenerKey, ChangeListener)], event: &ChangeEvent) {
    trace!("Dispatching change event rev {} to {} listeners", event.revision, listeners.len());
    for (_, listener) in listeners.iter_mut() {
        listener(event);
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("listeners", &self.listener_count())
            .field("revision", &self.revision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn emit(observable: &mut Observable) {
        let event = observable.changed(&[]);
        let mut listeners = observable.take_listeners();
        dispatch_to(&mut listeners, &event);
        observable.restore_listeners(listeners);
    }

    #[test]
    fn listeners_receive_events_until_removed() {
        let mut observable = Observable::new();
        let seen = Rc::new(Cell::new(0u64));
        let seen_in_listener = Rc::clone(&seen);
        let key = observable.on(Box::new(move |event| seen_in_listener.set(event.revision)));

        emit(&mut observable);
        assert_eq!(seen.get(), 1);

        assert!(observable.un(key));
        assert!(!observable.un(key));
        emit(&mut observable);
        assert_eq!(seen.get(), 1);
        assert_eq!(observable.revision(), 2);
    }

    #[test]
    fn restored_listeners_keep_order() {
        let mut observable = Observable::new();
        let first = observable.on(Box::new(|_| {}));
        let taken = observable.take_listeners();
        let late = observable.on(Box::new(|_| {}));
        assert_eq!(observable.listener_count(), 2);
        observable.restore_listeners(taken);
        assert_eq!(observable.listener_count(), 2);
        assert!(observable.un(first));
        assert!(observable.un(late));
        assert_eq!(observable.listener_count(), 0);
    }

    #[test]
    fn removal_during_dispatch_sticks() {
        let mut observable = Observable::new();
        let key = observable.on(Box::new(|_| {}));
        let taken = observable.take_listeners();
        assert!(observable.un(key));
        assert!(!observable.un(key));
        observable.restore_listeners(taken);
        assert_eq!(observable.listener_count(), 0);
    }
}
