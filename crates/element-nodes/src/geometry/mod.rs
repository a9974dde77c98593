//! Geometry nodes
//!
//! Nodes that produce free-form shape elements.

mod direct_shape;

pub use direct_shape::{BoxSpec, DirectShapeNode};
