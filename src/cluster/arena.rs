// cluster/arena.rs
use crate::types::FeatureRef;

/// Position of a feature in the snapshot a clustering engine was built from.
///
/// Only a `FeatureArena` hands these out, and an index resolves only against
/// the arena generation that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureIndex {
    slot: usize,
    generation: u64,
}

impl FeatureIndex {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Owned snapshot of a source's features, replaced wholesale on every rebuild.
#[derive(Debug, Default)]
pub struct FeatureArena {
    features: Vec<FeatureRef>,
    generation: u64,
}

impl FeatureArena {
    pub fn new(features: Vec<FeatureRef>, generation: u64) -> Self {
        Self { features, generation }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureIndex, &FeatureRef)> + '_ {
        let generation = self.generation;
        self.features.iter().enumerate()
            .map(move |(slot, feature)| (FeatureIndex { slot, generation }, feature))
    }

    pub fn resolve(&self, index: FeatureIndex) -> Option<&FeatureRef> {
        if index.generation != self.generation {
            return None;
        }
        self.features.get(index.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Feature;
    use std::rc::Rc;

    #[test]
    fn indices_resolve_only_in_their_generation() {
        let a = Rc::new(Feature::point([0.0, 0.0]));
        let b = Rc::new(Feature::point([1.0, 1.0]));
        let old = FeatureArena::new(vec![Rc::clone(&a), Rc::clone(&b)], 1);
        let indices: Vec<FeatureIndex> = old.iter().map(|(i, _)| i).collect();
        assert_eq!(indices[1].slot(), 1);
        assert!(Rc::ptr_eq(old.resolve(indices[1]).unwrap(), &b));

        let new = FeatureArena::new(vec![Rc::clone(&b)], 2);
        assert!(new.resolve(indices[0]).is_none());
        assert!(new.resolve(indices[1]).is_none());
    }
}
