// engine/supercluster.rs
//! Greedy hierarchical point clustering over a fixed zoom range.
//!
//! Points are projected to unit Mercator and indexed once per zoom level.
//! Level `max_zoom + 1` holds the raw points; every level below it is built
//! by merging neighbours of the level above within a radius that halves per
//! zoom step.

use std::f64::consts::PI;
use log::{debug, trace};
use rstar::RTree;
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::error::{Error, Result};
use super::spatial::{self, IndexedNode};

/// Highest `max_zoom` the cluster id encoding can carry
pub const MAX_SUPPORTED_ZOOM: u32 = 30;

const UNPROCESSED: u32 = u32::MAX;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperclusterOptions {
    pub min_zoom: u32,
    pub max_zoom: u32,
    /// Minimum number of points to form a cluster
    pub min_points: usize,
    /// Cluster radius in pixels
    pub radius: f64,
    /// Tile extent the radius is measured in
    pub extent: f64,
}

impl Default for SuperclusterOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 16,
            min_points: 2,
            radius: 40.0,
            extent: 512.0,
        }
    }
}

impl SuperclusterOptions {
    pub fn validate(&self) -> Result<()> {
        if self.min_zoom > self.max_zoom {
            return Err(Error::Config(format!(
                "min_zoom ({}) must not exceed max_zoom ({})", self.min_zoom, self.max_zoom
            )));
        }
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(Error::Config(format!(
                "max_zoom must be at most {}: {}", MAX_SUPPORTED_ZOOM, self.max_zoom
            )));
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(Error::Config(format!("Invalid radius: {}", self.radius)));
        }
        if !self.extent.is_finite() || self.extent <= 0.0 {
            return Err(Error::Config(format!("Invalid extent: {}", self.extent)));
        }
        if self.min_points < 2 {
            return Err(Error::Config(
                "min_points must be at least 2".to_string()
            ));
        }
        Ok(())
    }
}

/// An input point: longitude/latitude in degrees plus a caller payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint<T> {
    pub lon_lat: [f64; 2],
    pub data: T,
}

impl<T> GeoPoint<T> {
    pub fn new(lon_lat: [f64; 2], data: T) -> Self {
        Self { lon_lat, data }
    }
}

/// One entry of a query result.
#[derive(Debug, Clone, Copy)]
pub enum ClusterResult<'a, T> {
    Cluster {
        id: u64,
        point_count: usize,
        lon_lat: [f64; 2],
    },
    Point(&'a GeoPoint<T>),
}

impl<'a, T> ClusterResult<'a, T> {
    pub fn is_cluster(&self) -> bool {
        matches!(self, ClusterResult::Cluster { .. })
    }

    pub fn cluster_id(&self) -> Option<u64> {
        match self {
            ClusterResult::Cluster { id, .. } => Some(*id),
            ClusterResult::Point(_) => None,
        }
    }

    pub fn point_count(&self) -> usize {
        match self {
            ClusterResult::Cluster { point_count, .. } => *point_count,
            ClusterResult::Point(_) => 1,
        }
    }

    pub fn lon_lat(&self) -> [f64; 2] {
        match self {
            ClusterResult::Cluster { lon_lat, .. } => *lon_lat,
            ClusterResult::Point(point) => point.lon_lat,
        }
    }
}

/// Short label for a point count: `1234` -> `"1.2k"`, `15000` -> `"15k"`.
pub fn abbreviate_count(count: usize) -> Value {
    if count >= 10000 {
        Value::from(format!("{}k", (count as f64 / 1000.0).round()))
    } else if count >= 1000 {
        Value::from(format!("{}k", (count as f64 / 100.0).round() / 10.0))
    } else {
        Value::from(count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    /// Index into the loaded points
    Leaf(usize),
    Cluster(u64),
}

#[derive(Debug, Clone)]
struct Node {
    x: f64,
    y: f64,
    /// Last zoom this node was processed at
    zoom: u32,
    kind: NodeKind,
    parent_id: Option<u64>,
    num_points: usize,
}

struct Level {
    nodes: Vec<Node>,
    tree: RTree<IndexedNode>,
}

impl std::fmt::Debug for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Level")
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl Level {
    fn new(nodes: Vec<Node>) -> Self {
        let tree = spatial::build_rtree(nodes.iter().map(|n| [n.x, n.y]));
        Self { nodes, tree }
    }
}

#[derive(Debug)]
pub struct Supercluster<T> {
    options: SuperclusterOptions,
    points: Vec<GeoPoint<T>>,
    /// Indexed by zoom; `None` below `min_zoom` and before `load`
    levels: Vec<Option<Level>>,
}

impl<T> Supercluster<T> {
    pub fn new(options: SuperclusterOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            points: Vec::new(),
            levels: Vec::new(),
        })
    }

    pub fn points(&self) -> &[GeoPoint<T>] {
        &self.points
    }

    /// Replaces the indexed points and rebuilds every zoom level.
    ///
    /// Points with non-finite coordinates are dropped.
    pub fn load(&mut self, points: Vec<GeoPoint<T>>) {
        let total = points.len();
        self.points = points.into_iter()
            .filter(|p| p.lon_lat[0].is_finite() && p.lon_lat[1].is_finite())
            .collect();
        if self.points.len() != total {
            debug!("Dropped {} points with non-finite coordinates", total - self.points.len());
        }

        let min_zoom = self.options.min_zoom;
        let max_zoom = self.options.max_zoom;

        let leaves: Vec<Node> = self.points.iter().enumerate()
            .map(|(i, p)| Node {
                x: lng_x(p.lon_lat[0]),
                y: lat_y(p.lon_lat[1]),
                zoom: UNPROCESSED,
                kind: NodeKind::Leaf(i),
                parent_id: None,
                num_points: 1,
            })
            .collect();

        self.levels = (0..=max_zoom + 1).map(|_| None).collect();
        self.levels[max_zoom as usize + 1] = Some(Level::new(leaves));

        for zoom in (min_zoom..=max_zoom).rev() {
            let clusters = self.cluster_level(zoom);
            trace!("z{}: {} clusters", zoom, clusters.len());
            self.levels[zoom as usize] = Some(Level::new(clusters));
        }

        debug!(
            "Indexed {} points over zooms {}..={}",
            self.points.len(), min_zoom, max_zoom
        );
    }

    fn radius_at(&self, zoom: i32) -> f64 {
        self.options.radius / (self.options.extent * 2f64.powi(zoom))
    }

    /// Merges the nodes of level `zoom + 1` into the node list for `zoom`.
    fn cluster_level(&mut self, zoom: u32) -> Vec<Node> {
        let r = self.radius_at(zoom as i32);
        let min_points = self.options.min_points;
        let point_total = self.points.len() as u64;

        let mut clusters = Vec::new();
        let Some(Level { nodes, tree }) = self.levels[zoom as usize + 1].as_mut() else {
            return clusters;
        };

        for i in 0..nodes.len() {
            if nodes[i].zoom <= zoom {
                continue;
            }
            nodes[i].zoom = zoom;

            let (px, py) = (nodes[i].x, nodes[i].y);
            let neighbor_ids = spatial::within(tree, px, py, r);

            let origin_points = nodes[i].num_points;
            let mut num_points = origin_points;
            for &n in &neighbor_ids {
                if nodes[n].zoom > zoom {
                    num_points += nodes[n].num_points;
                }
            }

            if num_points > origin_points && num_points >= min_points {
                let mut wx = px * origin_points as f64;
                let mut wy = py * origin_points as f64;

                // Origin index and zoom are recoverable from the id
                let id = ((i as u64) << 5) + (zoom as u64 + 1) + point_total;

                for &n in &neighbor_ids {
                    let neighbor = &mut nodes[n];
                    if neighbor.zoom <= zoom {
                        continue;
                    }
                    neighbor.zoom = zoom;
                    wx += neighbor.x * neighbor.num_points as f64;
                    wy += neighbor.y * neighbor.num_points as f64;
                    neighbor.parent_id = Some(id);
                }

                nodes[i].parent_id = Some(id);
                clusters.push(Node {
                    x: wx / num_points as f64,
                    y: wy / num_points as f64,
                    zoom: UNPROCESSED,
                    kind: NodeKind::Cluster(id),
                    parent_id: None,
                    num_points,
                });
            } else {
                clusters.push(nodes[i].clone());

                if num_points > 1 {
                    for &n in &neighbor_ids {
                        let neighbor = &mut nodes[n];
                        if neighbor.zoom <= zoom {
                            continue;
                        }
                        neighbor.zoom = zoom;
                        clusters.push(neighbor.clone());
                    }
                }
            }
        }

        clusters
    }

    fn limit_zoom(&self, zoom: f64) -> usize {
        let min = self.options.min_zoom as f64;
        let max = (self.options.max_zoom + 1) as f64;
        let zoom = zoom.floor();
        if zoom.is_nan() {
            return self.options.min_zoom as usize;
        }
        zoom.clamp(min, max) as usize
    }

    fn to_result(&self, node: &Node) -> ClusterResult<'_, T> {
        match node.kind {
            NodeKind::Cluster(id) => ClusterResult::Cluster {
                id,
                point_count: node.num_points,
                lon_lat: [x_lng(node.x), y_lat(node.y)],
            },
            NodeKind::Leaf(index) => ClusterResult::Point(&self.points[index]),
        }
    }

    /// Clusters and points inside a `[west, south, east, north]` box at `zoom`.
    pub fn get_clusters(&self, bbox: [f64; 4], zoom: f64) -> Vec<ClusterResult<'_, T>> {
        let mut min_lng = ((bbox[0] + 180.0) % 360.0 + 360.0) % 360.0 - 180.0;
        let min_lat = bbox[1].clamp(-90.0, 90.0);
        let mut max_lng = if bbox[2] == 180.0 {
            180.0
        } else {
            ((bbox[2] + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
        };
        let max_lat = bbox[3].clamp(-90.0, 90.0);

        if bbox[2] - bbox[0] >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            // Box crosses the antimeridian
            let mut eastern = self.get_clusters([min_lng, min_lat, 180.0, max_lat], zoom);
            let western = self.get_clusters([-180.0, min_lat, max_lng, max_lat], zoom);
            eastern.extend(western);
            return eastern;
        }

        let Some(Some(level)) = self.levels.get(self.limit_zoom(zoom)) else {
            return Vec::new();
        };

        spatial::range(&level.tree, lng_x(min_lng), lat_y(max_lat), lng_x(max_lng), lat_y(min_lat))
            .into_iter()
            .map(|id| self.to_result(&level.nodes[id]))
            .collect()
    }

    fn origin_of(&self, cluster_id: u64) -> Result<(usize, usize)> {
        let point_total = self.points.len() as u64;
        if cluster_id < point_total {
            return Err(Error::UnknownCluster(cluster_id));
        }
        let encoded = cluster_id - point_total;
        Ok(((encoded >> 5) as usize, (encoded % 32) as usize))
    }

    /// Direct children of a cluster, one zoom level down.
    pub fn get_children(&self, cluster_id: u64) -> Result<Vec<ClusterResult<'_, T>>> {
        let (origin_id, origin_zoom) = self.origin_of(cluster_id)?;
        let level = self.levels.get(origin_zoom)
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownCluster(cluster_id))?;
        let origin = level.nodes.get(origin_id)
            .ok_or(Error::UnknownCluster(cluster_id))?;

        let r = self.radius_at(origin_zoom as i32 - 1);
        let children: Vec<ClusterResult<'_, T>> = spatial::within(&level.tree, origin.x, origin.y, r)
            .into_iter()
            .map(|id| &level.nodes[id])
            .filter(|node| node.parent_id == Some(cluster_id))
            .map(|node| self.to_result(node))
            .collect();

        if children.is_empty() {
            return Err(Error::UnknownCluster(cluster_id));
        }
        Ok(children)
    }

    /// Original points under a cluster. `limit: None` returns all of them.
    pub fn get_leaves(&self, cluster_id: u64, limit: Option<usize>, offset: usize) -> Result<Vec<&GeoPoint<T>>> {
        let mut leaves = Vec::new();
        if limit == Some(0) {
            return Ok(leaves);
        }
        self.append_leaves(&mut leaves, cluster_id, limit, offset, 0)?;
        Ok(leaves)
    }

    fn append_leaves<'a>(
        &'a self,
        result: &mut Vec<&'a GeoPoint<T>>,
        cluster_id: u64,
        limit: Option<usize>,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize> {
        for child in self.get_children(cluster_id)? {
            match child {
                ClusterResult::Cluster { id, point_count, .. } => {
                    if skipped + point_count <= offset {
                        // Skip the whole cluster
                        skipped += point_count;
                    } else {
                        skipped = self.append_leaves(result, id, limit, offset, skipped)?;
                    }
                },
                ClusterResult::Point(point) => {
                    if skipped < offset {
                        skipped += 1;
                    } else {
                        result.push(point);
                    }
                },
            }

            if limit.map_or(false, |limit| result.len() >= limit) {
                break;
            }
        }
        Ok(skipped)
    }

    /// Zoom at which a cluster breaks apart into more than one child.
    pub fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Result<u32> {
        let (_, origin_zoom) = self.origin_of(cluster_id)?;
        let mut expansion_zoom = origin_zoom as i64 - 1;
        let mut current = cluster_id;

        while expansion_zoom <= self.options.max_zoom as i64 {
            let children = self.get_children(current)?;
            expansion_zoom += 1;
            if children.len() != 1 {
                break;
            }
            match children[0].cluster_id() {
                Some(id) => current = id,
                None => break,
            }
        }
        Ok(expansion_zoom.max(0) as u32)
    }
}

// Longitude/latitude to unit Mercator, with y growing southwards
fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

fn lat_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}
