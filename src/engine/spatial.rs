use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Wrapper around a node position to make it compatible with R-Tree spatial indexing
#[derive(Debug, Clone, Copy)]
pub struct IndexedNode {
    /// Position of the node in its level's node array
    pub node_index: usize,
    /// Unit Mercator coordinates, both in [0, 1]
    pub x: f64,
    pub y: f64,
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Builds an R-tree over node positions, in node order.
///
/// Bulk loading keeps the tree balanced; each zoom level is built once and
/// never mutated afterwards.
pub fn build_rtree<I: IntoIterator<Item = [f64; 2]>>(positions: I) -> RTree<IndexedNode> {
    let nodes: Vec<IndexedNode> = positions.into_iter().enumerate()
        .map(|(i, [x, y])| IndexedNode { node_index: i, x, y })
        .collect();

    RTree::bulk_load(nodes)
}

/// Indices of all nodes within `radius` of `(x, y)`, inclusive, ascending.
pub fn within(rtree: &RTree<IndexedNode>, x: f64, y: f64, radius: f64) -> Vec<usize> {
    let mut ids: Vec<usize> = rtree.locate_within_distance([x, y], radius * radius)
        .map(|node| node.node_index)
        .collect();
    ids.sort_unstable();
    ids
}

/// Indices of all nodes inside the box, edges included, ascending.
pub fn range(rtree: &RTree<IndexedNode>, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<usize> {
    let search_area = AABB::from_corners([min_x, min_y], [max_x, max_y]);

    let mut ids: Vec<usize> = rtree.locate_in_envelope(&search_area)
        .map(|node| node.node_index)
        .collect();
    ids.sort_unstable();
    ids
}
