//! Incrementally updated bounding box tree for 2D broad-phase collision.
//!
//! This crate indexes objects by key and answers "what overlaps what" cheaply
//! when only a few of them move each frame.
//!
//! # Design Philosophy
//!
//! - **Key-addressed**: The tree stores keys and boxes, never the objects
//!   themselves. Current boxes come from a [`SpatialSource`] passed to each
//!   call that needs them.
//! - **Incremental**: A moved object is only reinserted when it leaves its
//!   stored box. Overlap pairs are cached per object and replayed for
//!   objects that stayed put.
//! - **Deterministic**: Leaves are kept in key order, so a given sequence
//!   of operations always builds the same tree and reports pairs in the
//!   same order.
//!
//! # Example
//!
//! ```
//! use cf_spatial::{Aabb, BBTree};
//! use nalgebra::Point2;
//!
//! let walls = [Aabb::from_edges(-10.0, -1.0, 10.0, 0.0)];
//! let mut balls = vec![
//!     Aabb::from_center(Point2::new(0.0, 2.0), nalgebra::Vector2::new(0.5, 0.5)),
//!     Aabb::from_center(Point2::new(3.0, 2.0), nalgebra::Vector2::new(0.5, 0.5)),
//! ];
//!
//! let mut tree = BBTree::new();
//! tree.insert_static(100, &|_: usize| walls[0]).unwrap();
//! for key in 0..balls.len() {
//!     tree.insert(key, &|i: usize| balls[i]).unwrap();
//! }
//!
//! // Ball 0 falls onto the wall.
//! balls[0] = Aabb::from_center(Point2::new(0.0, 0.4), nalgebra::Vector2::new(0.5, 0.5));
//!
//! let source = |i: usize| if i == 100 { walls[0] } else { balls[i] };
//! let mut contacts = Vec::new();
//! tree.reindex_query(&source, |a, b| contacts.push((a.min(b), a.max(b))));
//! assert_eq!(contacts, vec![(0, 100)]);
//! ```
//!
//! # Coordinate System
//!
//! Boxes are `f64` in world units with `min` at the left/bottom corner.
//! Touching boxes count as overlapping.

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_panics_doc, // Only arena indexing can panic, guarded by tree invariants
)]

mod aabb;
mod error;
mod source;
mod tree;

// Re-export core types
pub use aabb::Aabb;
pub use error::SpatialError;
pub use source::SpatialSource;
pub use tree::{BBTree, TreeConfig};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Vector2};
