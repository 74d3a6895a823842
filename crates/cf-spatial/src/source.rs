//! Where the tree gets bounding boxes and velocities from.

use nalgebra::Vector2;

use crate::Aabb;

/// Supplies current bounds, and optionally velocities, for indexed keys.
///
/// The tree never owns the indexed objects. Every operation that needs a
/// fresh bounding box takes a source and asks it by key.
///
/// Any `Fn(K) -> Aabb` closure is a source without velocities:
///
/// ```
/// use cf_spatial::{Aabb, BBTree};
///
/// let boxes = vec![Aabb::from_edges(0.0, 0.0, 1.0, 1.0)];
/// let mut tree = BBTree::new();
/// tree.insert(0_usize, &|i: usize| boxes[i]).unwrap();
/// assert!(tree.contains(0));
/// ```
pub trait SpatialSource<K> {
    /// The tight bounding box of `key` right now.
    fn bounds(&self, key: K) -> Aabb;

    /// The linear velocity of `key`.
    ///
    /// Returning `Some` lets the tree fatten the stored box in the direction
    /// of travel, so slowly moving objects are reinserted less often.
    fn velocity(&self, _key: K) -> Option<Vector2<f64>> {
        None
    }
}

impl<K, F> SpatialSource<K> for F
where
    F: Fn(K) -> Aabb,
{
    fn bounds(&self, key: K) -> Aabb {
        self(key)
    }
}
