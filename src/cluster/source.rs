// cluster/source.rs
//! A feature source that clusters the point features of another source.
//!
//! The wrapped source stays the owner of the data. Whenever it changes, the
//! clustering index is rebuilt from a snapshot of its features; whenever a
//! consumer asks for a different extent, resolution or projection, the
//! output features are recomputed from the existing index.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use geo_types::{Coord, Point};
use log::{debug, error, trace, warn};
use serde_json::{Map, Value};

use crate::engine::{
    abbreviate_count, ClusterResult, GeoPoint, Supercluster, SuperclusterOptions, MAX_SUPPORTED_ZOOM,
};
use crate::error::{Error, Result};
use crate::proj::{self, Projection};
use crate::source::events::{self, ChangeEvent, ChangeListener, ListenerKey, Observable};
use crate::source::{FeatureSource, SharedSource};
use crate::types::{bbox, ClusterInfo, Extent, Feature, FeatureRef, Geometry};
use crate::view::View;
use super::arena::{FeatureArena, FeatureIndex};
use super::extract::{default_extractor, PointExtractor};

pub const DEFAULT_RADIUS: f64 = 60.0;

/// Payload stored with every point in the clustering index
#[derive(Debug, Clone)]
pub struct PointTag {
    pub index: FeatureIndex,
    pub properties: Map<String, Value>,
}

pub struct ClusterSourceOptions<S, V> {
    pub source: SharedSource<S>,
    pub view: Rc<V>,
    /// Clustering distance in pixels
    pub radius: f64,
    /// Resolve cluster members lazily and pass singletons through untouched
    pub on_demand: bool,
    pub extractor: Option<PointExtractor>,
    pub attributions: Vec<String>,
    pub wrap_x: bool,
    pub min_points: usize,
    /// Tile extent the radius is measured against
    pub tile_extent: f64,
}

impl<S, V> ClusterSourceOptions<S, V> {
    pub fn new(source: SharedSource<S>, view: Rc<V>) -> Self {
        let engine_defaults = SuperclusterOptions::default();
        Self {
            source,
            view,
            radius: DEFAULT_RADIUS,
            on_demand: false,
            extractor: None,
            attributions: Vec::new(),
            wrap_x: true,
            min_points: engine_defaults.min_points,
            tile_extent: engine_defaults.extent,
        }
    }

    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn on_demand(mut self, on_demand: bool) -> Self {
        self.on_demand = on_demand;
        self
    }

    pub fn extractor(mut self, extractor: PointExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn attributions(mut self, attributions: Vec<String>) -> Self {
        self.attributions = attributions;
        self
    }

    pub fn wrap_x(mut self, wrap_x: bool) -> Self {
        self.wrap_x = wrap_x;
        self
    }

    pub fn min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }

    pub fn tile_extent(mut self, tile_extent: f64) -> Self {
        self.tile_extent = tile_extent;
        self
    }
}

/// Everything the wrapped source's change listener needs to reach.
struct ClusterState<V> {
    view: Rc<V>,
    radius: f64,
    on_demand: bool,
    extractor: PointExtractor,
    min_points: usize,
    tile_extent: f64,
    // Cache key of the last load
    extent: Option<Extent>,
    resolution: Option<f64>,
    projection: Option<Projection>,
    features: Vec<FeatureRef>,
    engine: Option<Supercluster<PointTag>>,
    arena: FeatureArena,
    generation: u64,
    observable: Observable,
}

impl<V: View> ClusterState<V> {
    fn engine_options(&self) -> SuperclusterOptions {
        let max_supported = MAX_SUPPORTED_ZOOM as f64;
        let max_zoom = self.view.max_zoom().round().clamp(0.0, max_supported);
        if self.view.max_zoom().round() > max_supported {
            warn!("View max zoom {} exceeds clustering limit, using {}", self.view.max_zoom(), max_zoom);
        }
        let min_zoom = self.view.min_zoom().round().clamp(0.0, max_zoom);
        SuperclusterOptions {
            min_zoom: min_zoom as u32,
            max_zoom: max_zoom as u32,
            min_points: self.min_points,
            radius: self.radius,
            extent: self.tile_extent,
        }
    }

    /// Replaces engine and arena from a fresh snapshot of the wrapped source.
    fn rebuild(&mut self, snapshot: Vec<FeatureRef>, projection: Projection) -> Result<()> {
        self.generation += 1;
        let arena = FeatureArena::new(snapshot, self.generation);

        let mut points = Vec::with_capacity(arena.len());
        for (index, feature) in arena.iter() {
            for point in (self.extractor)(&**feature, projection)? {
                let mut properties = point.properties;
                properties.insert("index".to_string(), Value::from(index.slot()));
                points.push(GeoPoint::new(point.lon_lat.into(), PointTag { index, properties }));
            }
        }

        let mut engine = Supercluster::new(self.engine_options())?;
        debug!(
            "Rebuilding cluster index gen {}: {} features, {} points, radius {}",
            self.generation, arena.len(), points.len(), self.radius
        );
        engine.load(points);

        self.engine = Some(engine);
        self.arena = arena;
        Ok(())
    }

    /// Recomputes the output features for the recorded extent/resolution/projection.
    fn process_cluster<F>(&mut self, force: bool, snapshot: F) -> Result<()>
    where
        F: FnOnce() -> Vec<FeatureRef>,
    {
        let (Some(extent), Some(resolution), Some(projection)) =
            (self.extent, self.resolution, self.projection)
        else {
            trace!("No resolution recorded yet, skipping clustering");
            return Ok(());
        };

        if force || self.engine.is_none() {
            self.rebuild(snapshot(), projection)?;
        }
        let Some(engine) = self.engine.as_ref() else {
            return Ok(());
        };

        let query = bbox(&proj::transform_extent(&extent, projection, Projection::Geographic));
        let zoom = self.view.zoom_for_resolution(resolution).round();

        let results = engine.get_clusters(query, zoom);
        let mut features = Vec::with_capacity(results.len());
        for result in &results {
            features.push(self.materialize(engine, result, projection)?);
        }
        debug!("z{}: {} cluster features for {:?}", zoom, features.len(), query);

        self.features = features;
        Ok(())
    }

    fn materialize(
        &self,
        engine: &Supercluster<PointTag>,
        result: &ClusterResult<'_, PointTag>,
        projection: Projection,
    ) -> Result<FeatureRef> {
        let point = Point::from(proj::from_lon_lat(Coord::from(result.lon_lat()), projection));

        match result {
            ClusterResult::Cluster { id, point_count, .. } => {
                let mut properties = Map::new();
                properties.insert("cluster".to_string(), Value::Bool(true));
                properties.insert("cluster_id".to_string(), Value::from(*id));
                properties.insert("point_count".to_string(), Value::from(*point_count));
                properties.insert("point_count_abbreviated".to_string(), abbreviate_count(*point_count));

                let members = if self.on_demand {
                    None
                } else {
                    Some(self.leaves(engine, *id)?)
                };

                Ok(Rc::new(Feature {
                    id: None,
                    geometry: Some(Geometry::Point(point)),
                    properties,
                    cluster: Some(ClusterInfo {
                        is_cluster: true,
                        cluster_id: Some(*id),
                        point_count: *point_count,
                        features: members,
                    }),
                }))
            },
            ClusterResult::Point(leaf) => {
                let original = self.arena.resolve(leaf.data.index);

                if self.on_demand {
                    // Keep identity for singletons
                    if let Some(original) = original {
                        return Ok(Rc::clone(original));
                    }
                }

                let mut properties = leaf.data.properties.clone();
                properties.insert("cluster".to_string(), Value::Bool(false));

                Ok(Rc::new(Feature {
                    id: None,
                    geometry: Some(Geometry::Point(point)),
                    properties,
                    cluster: Some(ClusterInfo {
                        is_cluster: false,
                        cluster_id: None,
                        point_count: 1,
                        features: if self.on_demand {
                            None
                        } else {
                            Some(original.into_iter().cloned().collect())
                        },
                    }),
                }))
            },
        }
    }

    /// Original features under a cluster, each once, in first-seen order.
    fn leaves(&self, engine: &Supercluster<PointTag>, cluster_id: u64) -> Result<Vec<FeatureRef>> {
        let mut seen = AHashSet::new();
        let mut features = Vec::new();
        for leaf in engine.get_leaves(cluster_id, None, 0)? {
            if !seen.insert(leaf.data.index) {
                continue;
            }
            match self.arena.resolve(leaf.data.index) {
                Some(feature) => features.push(Rc::clone(feature)),
                None => warn!("Leaf index {} not in current snapshot", leaf.data.index.slot()),
            }
        }
        Ok(features)
    }
}

/// Notifies the cluster source's own listeners without holding the state borrow.
fn publish<V>(state: &RefCell<ClusterState<V>>) {
    let (mut listeners, event) = {
        let mut guard = state.borrow_mut();
        let inner = &mut *guard;
        let event = inner.observable.changed(&inner.features);
        (inner.observable.take_listeners(), event)
    };
    events::dispatch_to(&mut listeners, &event);
    state.borrow_mut().observable.restore_listeners(listeners);
}

fn refresh_state<V: View>(state: &RefCell<ClusterState<V>>, snapshot: Vec<FeatureRef>) -> Result<()> {
    state.borrow_mut().process_cluster(true, move || snapshot)?;
    publish(state);
    Ok(())
}

pub struct ClusterSource<S: FeatureSource + 'static, V: View + 'static> {
    source: SharedSource<S>,
    state: Rc<RefCell<ClusterState<V>>>,
    listener_key: Cell<Option<ListenerKey>>,
    attributions: Vec<String>,
    wrap_x: bool,
}

impl<S: FeatureSource + 'static, V: View + 'static> ClusterSource<S, V> {
    pub fn new(options: ClusterSourceOptions<S, V>) -> Result<Self> {
        validate_radius(options.radius)?;

        let state = Rc::new(RefCell::new(ClusterState {
            view: options.view,
            radius: options.radius,
            on_demand: options.on_demand,
            extractor: options.extractor.unwrap_or_else(default_extractor),
            min_points: options.min_points,
            tile_extent: options.tile_extent,
            extent: None,
            resolution: None,
            projection: None,
            features: Vec::new(),
            engine: None,
            arena: FeatureArena::default(),
            generation: 0,
            observable: Observable::new(),
        }));
        // Fail on bad engine settings now rather than on first load
        state.borrow().engine_options().validate()?;

        let weak: Weak<RefCell<ClusterState<V>>> = Rc::downgrade(&state);
        let listener_key = options.source.on_change(Box::new(move |event: &ChangeEvent| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            if let Err(e) = refresh_state(&state, event.features.clone()) {
                error!("Cluster refresh after source change rev {} failed: {}", event.revision, e);
            }
        }));

        Ok(Self {
            source: options.source,
            state,
            listener_key: Cell::new(Some(listener_key)),
            attributions: options.attributions,
            wrap_x: options.wrap_x,
        })
    }

    pub fn source(&self) -> &SharedSource<S> {
        &self.source
    }

    pub fn view(&self) -> Rc<V> {
        Rc::clone(&self.state.borrow().view)
    }

    pub fn radius(&self) -> f64 {
        self.state.borrow().radius
    }

    /// Changes the clustering distance and rebuilds the index.
    pub fn set_radius(&self, radius: f64) -> Result<()> {
        validate_radius(radius)?;
        self.state.borrow_mut().radius = radius;
        self.refresh()?;
        Ok(())
    }

    pub fn on_demand(&self) -> bool {
        self.state.borrow().on_demand
    }

    pub fn attributions(&self) -> &[String] {
        &self.attributions
    }

    pub fn wrap_x(&self) -> bool {
        self.wrap_x
    }

    /// Rebuilds the index from the wrapped source and republishes.
    /// Always acknowledges with `true`.
    pub fn refresh(&self) -> Result<bool> {
        let snapshot = self.source.features();
        refresh_state(&self.state, snapshot)?;
        Ok(true)
    }

    /// Members of a cluster feature; any other feature is its own only member.
    pub fn get_features_for_cluster(&self, feature: &FeatureRef) -> Result<Vec<FeatureRef>> {
        let state = self.state.borrow();
        match (feature.is_cluster(), feature.cluster_id(), state.engine.as_ref()) {
            (true, Some(cluster_id), Some(engine)) => state.leaves(engine, cluster_id),
            _ => Ok(vec![Rc::clone(feature)]),
        }
    }

    /// Zoom at which a cluster splits; the view's zoom for anything else.
    pub fn get_cluster_expansion_zoom(&self, feature: &Feature) -> Result<f64> {
        let state = self.state.borrow();
        match (feature.is_cluster(), feature.cluster_id(), state.engine.as_ref()) {
            (true, Some(cluster_id), Some(engine)) => {
                Ok(engine.get_cluster_expansion_zoom(cluster_id)? as f64)
            },
            _ => Ok(state.view.zoom()),
        }
    }

    /// Stops listening to the wrapped source. Also runs on drop.
    pub fn dispose(&self) {
        if let Some(key) = self.listener_key.take() {
            self.source.un_change(key);
        }
    }
}

fn validate_radius(radius: f64) -> Result<()> {
    if !radius.is_finite() || radius < 0.0 {
        return Err(Error::config(format!("Invalid cluster radius: {}", radius)));
    }
    Ok(())
}

impl<S: FeatureSource + 'static, V: View + 'static> FeatureSource for ClusterSource<S, V> {
    fn load_features(&self, extent: &Extent, resolution: f64, projection: Projection) -> Result<()> {
        self.source.load_features(extent, resolution, projection)?;

        {
            let mut state = self.state.borrow_mut();
            let unchanged = state.resolution == Some(resolution)
                && state.extent.as_ref() == Some(extent)
                && state.projection.map_or(false, |p| p.equivalent(&projection));
            if unchanged {
                trace!("Cluster request unchanged, keeping {} features", state.features.len());
                return Ok(());
            }

            state.features.clear();
            state.extent = Some(*extent);
            state.resolution = Some(resolution);
            state.projection = Some(projection);

            let source = &self.source;
            state.process_cluster(false, || source.features())?;
        }

        publish(&self.state);
        Ok(())
    }

    fn features(&self) -> Vec<FeatureRef> {
        self.state.borrow().features.clone()
    }

    fn on_change(&self, listener: ChangeListener) -> ListenerKey {
        self.state.borrow_mut().observable.on(listener)
    }

    fn un_change(&self, key: ListenerKey) -> bool {
        self.state.borrow_mut().observable.un(key)
    }

    fn revision(&self) -> u64 {
        self.state.borrow().observable.revision()
    }
}

impl<S: FeatureSource + 'static, V: View + 'static> Drop for ClusterSource<S, V> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<S: FeatureSource + 'static, V: View + 'static> std::fmt::Debug for ClusterSource<S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ClusterSource")
            .field("radius", &state.radius)
            .field("on_demand", &state.on_demand)
            .field("features", &state.features.len())
            .field("generation", &state.generation)
            .field("wrap_x", &self.wrap_x)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::extract::point_vertices;
    use crate::source::{shared, VectorSource};
    use crate::view::MapView;
    use geo_types::{LineString, MultiPoint};

    type Options = ClusterSourceOptions<VectorSource, MapView>;

    fn setup(
        features: Vec<Feature>,
        configure: impl FnOnce(Options) -> Options,
    ) -> (SharedSource<VectorSource>, Rc<MapView>, ClusterSource<VectorSource, MapView>) {
        let source = shared(VectorSource::with_features(features));
        let view = Rc::new(MapView::new(Projection::WebMercator));
        let options = configure(ClusterSourceOptions::new(Rc::clone(&source), Rc::clone(&view)));
        let cluster = ClusterSource::new(options).unwrap();
        (source, view, cluster)
    }

    fn load_world(cluster: &ClusterSource<VectorSource, MapView>, view: &MapView) -> Result<()> {
        cluster.load_features(&Projection::WebMercator.extent(), view.resolution(), Projection::WebMercator)
    }

    fn two_close_points() -> Vec<Feature> {
        vec![
            Feature::point([0.0, 0.0]).with_id(1u64),
            Feature::point([1.0, 0.0]).with_id(2u64),
        ]
    }

    #[test]
    fn close_points_form_one_cluster() {
        let (source, view, cluster) = setup(two_close_points(), |o| o);
        load_world(&cluster, &view).unwrap();

        let features = cluster.features();
        assert_eq!(features.len(), 1);
        let feature = &features[0];
        assert!(feature.is_cluster());
        assert_eq!(feature.get("point_count"), Some(&Value::from(2)));
        assert_eq!(feature.get("cluster"), Some(&Value::Bool(true)));

        match &feature.geometry {
            Some(Geometry::Point(p)) => assert!((p.x() - 0.5).abs() < 1e-3 && p.y().abs() < 1e-3),
            other => panic!("unexpected geometry {:?}", other),
        }

        let members = feature.cluster_features().unwrap();
        assert_eq!(members.len(), 2);
        let originals = source.features();
        assert!(members.iter().all(|m| originals.iter().any(|o| Rc::ptr_eq(m, o))));
    }

    #[test]
    fn zero_radius_keeps_points_apart() {
        let (_source, view, cluster) = setup(two_close_points(), |o| o.radius(0.0));
        load_world(&cluster, &view).unwrap();

        let features = cluster.features();
        assert_eq!(features.len(), 2);
        for feature in &features {
            assert!(!feature.is_cluster());
            assert_eq!(feature.get("cluster"), Some(&Value::Bool(false)));
            assert_eq!(feature.cluster_features().map(|m| m.len()), Some(1));
        }
    }

    #[test]
    fn empty_source_yields_nothing() {
        let (_source, view, cluster) = setup(Vec::new(), |o| o);
        load_world(&cluster, &view).unwrap();
        assert!(cluster.features().is_empty());
    }

    #[test]
    fn on_demand_singletons_keep_identity() {
        let (source, view, cluster) = setup(vec![Feature::point([10.0, 10.0])], |o| o.on_demand(true));
        load_world(&cluster, &view).unwrap();

        let features = cluster.features();
        assert_eq!(features.len(), 1);
        assert!(Rc::ptr_eq(&features[0], &source.features()[0]));
    }

    #[test]
    fn on_demand_clusters_resolve_members_lazily() {
        let (_source, view, cluster) = setup(two_close_points(), |o| o.on_demand(true));
        load_world(&cluster, &view).unwrap();

        let features = cluster.features();
        assert_eq!(features.len(), 1);
        assert!(features[0].cluster_features().is_none());
        assert_eq!(cluster.get_features_for_cluster(&features[0]).unwrap().len(), 2);
    }

    #[test]
    fn set_radius_rebuilds_for_the_same_request() {
        let (_source, view, cluster) = setup(two_close_points(), |o| o);
        load_world(&cluster, &view).unwrap();
        assert_eq!(cluster.features().len(), 1);

        cluster.set_radius(0.0).unwrap();
        assert_eq!(cluster.radius(), 0.0);
        assert_eq!(cluster.features().len(), 2);

        assert!(matches!(cluster.set_radius(-1.0), Err(Error::Config(_))));
        assert!(matches!(cluster.set_radius(f64::NAN), Err(Error::Config(_))));
        assert_eq!(cluster.radius(), 0.0);
    }

    #[test]
    fn source_changes_recluster() {
        let (source, view, cluster) = setup(vec![Feature::point([0.0, 0.0])], |o| o);
        load_world(&cluster, &view).unwrap();
        assert!(!cluster.features()[0].is_cluster());

        source.add_feature(Feature::point([2.0, 0.0]));
        let features = cluster.features();
        assert_eq!(features.len(), 1);
        assert!(features[0].is_cluster());

        source.clear();
        assert!(cluster.features().is_empty());
    }

    #[test]
    fn repeated_request_is_a_no_op() {
        let (_source, view, cluster) = setup(two_close_points(), |o| o);
        load_world(&cluster, &view).unwrap();
        let revision = cluster.revision();
        let before = cluster.features();

        load_world(&cluster, &view).unwrap();
        assert_eq!(cluster.revision(), revision);
        assert!(Rc::ptr_eq(&before[0], &cluster.features()[0]));

        cluster.load_features(
            &Projection::WebMercator.extent(),
            view.resolution_for_zoom(3.0),
            Projection::WebMercator,
        ).unwrap();
        assert_eq!(cluster.revision(), revision + 1);
    }

    #[test]
    fn members_are_deduplicated_per_feature() {
        let multipoint = Feature::new(Geometry::MultiPoint(MultiPoint::from(vec![[0.0, 0.0], [1.0, 0.0]])));
        let (_source, view, cluster) = setup(vec![multipoint], |o| o.extractor(Box::new(point_vertices)));
        load_world(&cluster, &view).unwrap();

        let features = cluster.features();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].cluster.as_ref().map(|c| c.point_count), Some(2));
        assert_eq!(features[0].cluster_features().map(|m| m.len()), Some(1));
        assert_eq!(cluster.get_features_for_cluster(&features[0]).unwrap().len(), 1);
    }

    #[test]
    fn expansion_zoom() {
        let (_source, view, cluster) = setup(two_close_points(), |o| o);
        load_world(&cluster, &view).unwrap();

        let features = cluster.features();
        let zoom = cluster.get_cluster_expansion_zoom(&features[0]).unwrap();
        // One metre apart splits only near street level
        assert!((22.0..=23.0).contains(&zoom), "zoom {}", zoom);

        let plain = Feature::point([0.0, 0.0]);
        assert_eq!(cluster.get_cluster_expansion_zoom(&plain).unwrap(), view.zoom());
        let plain = Rc::new(plain);
        let members = cluster.get_features_for_cluster(&plain).unwrap();
        assert!(Rc::ptr_eq(&members[0], &plain));
    }

    #[test]
    fn default_extractor_rejects_lines() {
        let line = Feature::new(Geometry::LineString(LineString::from(vec![[0.0, 0.0], [5.0, 5.0]])));
        let (_source, view, cluster) = setup(vec![line], |o| o);
        assert!(matches!(load_world(&cluster, &view), Err(Error::UnsupportedGeometry(_))));
    }

    #[test]
    fn consumers_are_notified() {
        let (source, view, cluster) = setup(two_close_points(), |o| o);
        let seen = Rc::new(Cell::new(0usize));
        let seen_in_listener = Rc::clone(&seen);
        let key = cluster.on_change(Box::new(move |event| seen_in_listener.set(event.features.len())));

        load_world(&cluster, &view).unwrap();
        assert_eq!(seen.get(), 1);
        assert!(cluster.refresh().unwrap());

        cluster.set_radius(0.0).unwrap();
        assert_eq!(seen.get(), 2);

        assert!(cluster.un_change(key));
        source.add_feature(Feature::point([5000.0, 0.0]));
        assert_eq!(seen.get(), 2);
        assert_eq!(cluster.features().len(), 3);
    }

    #[test]
    fn dispose_and_drop_unregister() {
        let (source, _view, cluster) = setup(Vec::new(), |o| o);
        assert_eq!(source.listener_count(), 1);
        cluster.dispose();
        assert_eq!(source.listener_count(), 0);
        cluster.dispose();

        let view = Rc::new(MapView::new(Projection::WebMercator));
        let cluster = ClusterSource::new(ClusterSourceOptions::new(Rc::clone(&source), view)).unwrap();
        assert_eq!(source.listener_count(), 1);
        drop(cluster);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn loader_errors_propagate() {
        let source = shared(VectorSource::new().with_loader(Box::new(|_, _, _| {
            Err(Error::source_err("tile server unreachable"))
        })));
        let view = Rc::new(MapView::new(Projection::WebMercator));
        let cluster = ClusterSource::new(ClusterSourceOptions::new(source, Rc::clone(&view))).unwrap();
        assert!(matches!(load_world(&cluster, &view), Err(Error::Source(_))));
        assert!(cluster.features().is_empty());
    }

    #[test]
    fn loaded_features_are_clustered() {
        let source = shared(VectorSource::new().with_loader(Box::new(|_, _, _| Ok(two_close_points()))));
        let view = Rc::new(MapView::new(Projection::WebMercator));
        let cluster = ClusterSource::new(ClusterSourceOptions::new(source, Rc::clone(&view))).unwrap();
        load_world(&cluster, &view).unwrap();
        assert_eq!(cluster.features().len(), 1);
    }

    #[test]
    fn listeners_may_read_the_wrapped_source() {
        let (source, view, cluster) = setup(two_close_points(), |o| o);
        let seen = Rc::new(Cell::new(0usize));
        let (seen_in_listener, wrapped) = (Rc::clone(&seen), Rc::downgrade(&source));
        cluster.on_change(Box::new(move |_| {
            if let Some(wrapped) = wrapped.upgrade() {
                seen_in_listener.set(wrapped.len());
            }
        }));

        load_world(&cluster, &view).unwrap();
        assert_eq!(seen.get(), 2);

        // The consumer is notified while the wrapped source is dispatching
        source.add_feature(Feature::point([5000.0, 0.0]));
        assert_eq!(seen.get(), 3);
        assert_eq!(cluster.features().len(), 1);
    }

    #[test]
    fn nothing_is_clustered_before_the_first_load() {
        let (source, _view, cluster) = setup(two_close_points(), |o| o);
        assert!(cluster.refresh().unwrap());
        source.add_feature(Feature::point([2.0, 0.0]));

        assert!(cluster.features().is_empty());
        assert!(cluster.state.borrow().engine.is_none());
        assert_eq!(cluster.revision(), 2);
    }

    #[test]
    fn geographic_sources_cluster_in_degrees() {
        let source = shared(VectorSource::with_features(vec![
            Feature::point([10.0, 20.0]).with_id(1u64),
            Feature::point([10.5, 20.0]).with_id(2u64),
            Feature::point([-120.0, -40.0]).with_id(3u64),
        ]));
        let view = Rc::new(MapView::new(Projection::Geographic));
        let cluster = ClusterSource::new(ClusterSourceOptions::new(Rc::clone(&source), Rc::clone(&view))).unwrap();
        cluster.load_features(&Projection::Geographic.extent(), view.resolution(), Projection::Geographic).unwrap();

        let features = cluster.features();
        assert_eq!(features.len(), 2);

        let single = features.iter().find(|f| !f.is_cluster()).unwrap();
        assert_eq!(single.geometry, Some(Geometry::Point(Point::new(-120.0, -40.0))));

        let group = features.iter().find(|f| f.is_cluster()).unwrap();
        assert_eq!(group.get("point_count"), Some(&Value::from(2)));
        match &group.geometry {
            Some(Geometry::Point(p)) => {
                assert!((p.x() - 10.25).abs() < 1e-6, "lon {}", p.x());
                assert!((p.y() - 20.0).abs() < 1e-6, "lat {}", p.y());
            },
            other => panic!("unexpected geometry {:?}", other),
        }
    }
}
