// source/mod.rs

pub mod events;
pub mod vector;

use std::rc::Rc;

use crate::error::Result;
use crate::proj::Projection;
use crate::types::{Extent, FeatureRef};

pub use self::events::{ChangeEvent, ChangeListener, ListenerKey, Observable};
pub use self::vector::{FeatureLoader, VectorSource};

/// Sources are shared between the map, the application and any wrapping
/// cluster source.
pub type SharedSource<S> = Rc<S>;

/// The contract a rendering layer consumes: features for an extent, plus
/// change notification.
///
/// Implementations mutate through interior mutability and hold no borrow
/// while listeners run, so a listener may read the source that notified it.
pub trait FeatureSource {
    /// Makes sure features covering `extent` are available.
    fn load_features(&self, extent: &Extent, resolution: f64, projection: Projection) -> Result<()>;

    /// Snapshot of the current features.
    fn features(&self) -> Vec<FeatureRef>;

    fn on_change(&self, listener: ChangeListener) -> ListenerKey;

    fn un_change(&self, key: ListenerKey) -> bool;

    /// Incremented on every change event.
    fn revision(&self) -> u64;
}

pub fn shared<S: FeatureSource>(source: S) -> SharedSource<S> {
    Rc::new(source)
}
