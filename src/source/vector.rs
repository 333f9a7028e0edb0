// source/vector.rs
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use log::{debug, trace};

use crate::error::Result;
use crate::proj::Projection;
use crate::types::{Extent, Feature, FeatureRef};
use super::events;
use super::{ChangeListener, FeatureSource, ListenerKey, Observable};

/// Fetches features the first time a source is asked to load.
pub type FeatureLoader = Box<dyn FnMut(&Extent, f64, Projection) -> Result<Vec<Feature>>>;

/// In-memory feature collection that notifies listeners on every mutation.
///
/// Mutators take `&self`; no internal borrow is held while listeners run.
pub struct VectorSource {
    features: RefCell<Vec<FeatureRef>>,
    observable: RefCell<Observable>,
    loader: RefCell<Option<FeatureLoader>>,
    loaded: Cell<bool>,
}

impl VectorSource {
    pub fn new() -> Self {
        Self {
            features: RefCell::new(Vec::new()),
            observable: RefCell::new(Observable::new()),
            loader: RefCell::new(None),
            loaded: Cell::new(false),
        }
    }

    pub fn with_features(features: Vec<Feature>) -> Self {
        let source = Self::new();
        source.features.replace(features.into_iter().map(Rc::new).collect());
        source
    }

    pub fn with_loader(self, loader: FeatureLoader) -> Self {
        self.loader.replace(Some(loader));
        self
    }

    pub fn len(&self) -> usize {
        self.features.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.borrow().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.observable.borrow().listener_count()
    }

    pub fn contains(&self, feature: &FeatureRef) -> bool {
        self.features.borrow().iter().any(|f| Rc::ptr_eq(f, feature))
    }

    pub fn add_feature(&self, feature: Feature) -> FeatureRef {
        let feature = Rc::new(feature);
        self.features.borrow_mut().push(Rc::clone(&feature));
        self.changed();
        feature
    }

    /// Adds all features with a single change event.
    pub fn add_features(&self, features: Vec<Feature>) -> Vec<FeatureRef> {
        let added: Vec<FeatureRef> = features.into_iter().map(Rc::new).collect();
        if added.is_empty() {
            return added;
        }
        self.features.borrow_mut().extend(added.iter().cloned());
        self.changed();
        added
    }

    pub fn remove_feature(&self, feature: &FeatureRef) -> bool {
        let removed = {
            let mut features = self.features.borrow_mut();
            let before = features.len();
            features.retain(|f| !Rc::ptr_eq(f, feature));
            features.len() != before
        };
        if removed {
            self.changed();
        }
        removed
    }

    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.features.borrow_mut().clear();
        self.changed();
    }

    /// Notifies listeners without modifying the collection.
    pub fn changed(&self) {
        let (mut listeners, event) = {
            let features = self.features.borrow();
            let mut observable = self.observable.borrow_mut();
            let event = observable.changed(&features);
            (observable.take_listeners(), event)
        };
        trace!("VectorSource rev {} with {} features", event.revision, event.features.len());
        events::dispatch_to(&mut listeners, &event);
        self.observable.borrow_mut().restore_listeners(listeners);
    }
}

impl Default for VectorSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSource for VectorSource {
    fn load_features(&self, extent: &Extent, resolution: f64, projection: Projection) -> Result<()> {
        if self.loaded.get() {
            return Ok(());
        }
        let loaded = {
            let mut loader = self.loader.borrow_mut();
            match loader.as_mut() {
                Some(loader) => loader(extent, resolution, projection)?,
                None => return Ok(()),
            }
        };
        debug!("Loader returned {} features for {:?}", loaded.len(), extent);
        self.loaded.set(true);
        self.add_features(loaded);
        Ok(())
    }

    fn features(&self) -> Vec<FeatureRef> {
        self.features.borrow().clone()
    }

    fn on_change(&self, listener: ChangeListener) -> ListenerKey {
        self.observable.borrow_mut().on(listener)
    }

    fn un_change(&self, key: ListenerKey) -> bool {
        self.observable.borrow_mut().un(key)
    }

    fn revision(&self) -> u64 {
        self.observable.borrow().revision()
    }
}

impl std::fmt::Debug for VectorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorSource")
            .field("features", &self.len())
            .field("observable", &*self.observable.borrow())
            .field("loaded", &self.loaded.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn mutations_fire_change_events() {
        let source = VectorSource::new();
        let events = Rc::new(Cell::new(0));
        let counter = Rc::clone(&events);
        source.on_change(Box::new(move |_| counter.set(counter.get() + 1)));

        let a = source.add_feature(Feature::point([0.0, 0.0]));
        source.add_features(vec![Feature::point([1.0, 1.0]), Feature::point([2.0, 2.0])]);
        assert_eq!(events.get(), 2);
        assert_eq!(source.len(), 3);
        assert!(source.contains(&a));

        assert!(source.remove_feature(&a));
        assert!(!source.remove_feature(&a));
        assert_eq!(events.get(), 3);

        source.clear();
        source.clear();
        assert_eq!(events.get(), 4);
        assert_eq!(source.revision(), 4);
    }

    #[test]
    fn event_carries_feature_snapshot() {
        let source = VectorSource::new();
        let seen = Rc::new(Cell::new(0usize));
        let seen_in_listener = Rc::clone(&seen);
        source.on_change(Box::new(move |event| seen_in_listener.set(event.features.len())));
        source.add_feature(Feature::point([0.0, 0.0]));
        source.add_feature(Feature::point([0.0, 1.0]));
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn listeners_may_reenter_the_source() {
        let source = Rc::new(VectorSource::new());
        let seen = Rc::new(Cell::new(0usize));
        let (seen_in_listener, weak) = (Rc::clone(&seen), Rc::downgrade(&source));
        source.on_change(Box::new(move |_| {
            let Some(source) = weak.upgrade() else {
                return;
            };
            seen_in_listener.set(source.len());
            // Trim back to two features from inside the notification
            if source.len() > 2 {
                if let Some(first) = source.features().first() {
                    source.remove_feature(first);
                }
            }
        }));

        source.add_feature(Feature::point([0.0, 0.0]));
        source.add_feature(Feature::point([1.0, 0.0]));
        assert_eq!(seen.get(), 2);
        source.add_feature(Feature::point([2.0, 0.0]));
        assert_eq!(source.len(), 2);
        assert_eq!(source.listener_count(), 1);
        assert_eq!(source.revision(), 4);
    }

    #[test]
    fn loader_runs_once() {
        let calls = Rc::new(Cell::new(0));
        let calls_in_loader = Rc::clone(&calls);
        let source = VectorSource::new().with_loader(Box::new(move |_, _, _| {
            calls_in_loader.set(calls_in_loader.get() + 1);
            Ok(vec![Feature::point([3.0, 4.0])])
        }));
        let extent = Projection::WebMercator.extent();
        source.load_features(&extent, 1.0, Projection::WebMercator).unwrap();
        source.load_features(&extent, 1.0, Projection::WebMercator).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn loader_errors_propagate_and_allow_retry() {
        let attempts = Rc::new(Cell::new(0));
        let attempts_in_loader = Rc::clone(&attempts);
        let source = VectorSource::new().with_loader(Box::new(move |_, _, _| {
            attempts_in_loader.set(attempts_in_loader.get() + 1);
            Err(Error::source_err("offline"))
        }));
        let extent = Projection::WebMercator.extent();
        assert!(matches!(
            source.load_features(&extent, 1.0, Projection::WebMercator),
            Err(Error::Source(_))
        ));
        assert!(source.load_features(&extent, 1.0, Projection::WebMercator).is_err());
        assert_eq!(attempts.get(), 2);
    }
}
