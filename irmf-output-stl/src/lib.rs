//! STL output for IRMF slice stacks.
//!
//! Two emitters share the streaming [`writer::StlWriter`]:
//!
//! - [`slice_to_stl`] emits axis-aligned quads for every exposed boundary
//!   voxel face (watertight, one quad per face).
//! - [`slice_to_stl_outline`] reduces each slice to labeled outlines, convex
//!   hulls with concavity re-injection, and emits side walls only.

pub mod concavity;
pub mod edges;
pub mod faces;
pub mod hull;
pub mod labels;
pub mod outline;
pub mod paths;
pub mod writer;

pub use faces::slice_to_stl;
pub use outline::slice_to_stl_outline;
pub use writer::{StlWriter, Tri};
