use rstar::{RTree, RTreeObject, AABB};
use thiserror::Error;
use tracing::warn;

/// Position-only record so the tree never holds clones of full entities.
/// `slot` is the entity's index in its owning collection at build time.
#[derive(Clone, Debug)]
pub struct EntityLocation {
    pub slot: usize,
    pub position: [f64; 2],
}

impl RTreeObject for EntityLocation {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("entity in slot {slot} has non-finite position ({x}, {y})")]
    NonFiniteCoordinate { slot: usize, x: f64, y: f64 },
}

/// Build an R*-tree from entity positions via bulk_load (O(n log n)).
pub fn build_index(positions: &[[f64; 2]]) -> Result<RTree<EntityLocation>, IndexError> {
    let mut locations = Vec::with_capacity(positions.len());
    for (slot, &[x, y]) in positions.iter().enumerate() {
        if !(x.is_finite() && y.is_finite()) {
            return Err(IndexError::NonFiniteCoordinate { slot, x, y });
        }
        locations.push(EntityLocation {
            slot,
            position: [x, y],
        });
    }
    Ok(RTree::bulk_load(locations))
}

fn query_is_well_formed(center: [f64; 2], radius: f64) -> bool {
    center[0].is_finite() && center[1].is_finite() && radius.is_finite() && radius >= 0.0
}

/// Slots within `radius` of `center` (inclusive), sorted ascending.
/// Uses an AABB envelope query then filters by Euclidean distance.
pub fn query_index(tree: &RTree<EntityLocation>, center: [f64; 2], radius: f64) -> Vec<usize> {
    if !query_is_well_formed(center, radius) {
        return Vec::new();
    }
    let r_sq = radius * radius;
    let envelope = AABB::from_corners(
        [center[0] - radius, center[1] - radius],
        [center[0] + radius, center[1] + radius],
    );
    let mut result: Vec<usize> = tree
        .locate_in_envelope(&envelope)
        .filter(|loc| {
            let dx = loc.position[0] - center[0];
            let dy = loc.position[1] - center[1];
            dx * dx + dy * dy <= r_sq
        })
        .map(|loc| loc.slot)
        .collect();
    result.sort_unstable();
    result
}

/// Linear-scan equivalent of [`query_index`]. Non-finite positions never match.
pub fn query_brute_force(positions: &[[f64; 2]], center: [f64; 2], radius: f64) -> Vec<usize> {
    if !query_is_well_formed(center, radius) {
        return Vec::new();
    }
    let r_sq = radius * radius;
    positions
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            let dx = p[0] - center[0];
            let dy = p[1] - center[1];
            dx * dx + dy * dy <= r_sq
        })
        .map(|(slot, _)| slot)
        .collect()
}

/// Snapshot of one entity collection's positions, indexed when large enough.
#[derive(Clone, Debug)]
pub struct ProximityIndex {
    positions: Vec<[f64; 2]>,
    tree: Option<RTree<EntityLocation>>,
}

impl ProximityIndex {
    /// Builds the tree when `positions.len() >= min_indexed`. A failed build is
    /// logged and the index answers by linear scan instead.
    pub fn build(positions: Vec<[f64; 2]>, min_indexed: usize) -> Self {
        let tree = if positions.len() >= min_indexed {
            match build_index(&positions) {
                Ok(tree) => Some(tree),
                Err(err) => {
                    warn!(%err, entities = positions.len(), "spatial index build failed, using linear scan");
                    None
                }
            }
        } else {
            None
        };
        Self { positions, tree }
    }

    pub fn within(&self, center: [f64; 2], radius: f64) -> Vec<usize> {
        match &self.tree {
            Some(tree) => query_index(tree, center, radius),
            None => query_brute_force(&self.positions, center, radius),
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.tree.is_some()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
