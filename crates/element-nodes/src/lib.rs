//! Element Nodes
//!
//! Reference node implementations for the element engine. Each node turns
//! typed inputs into [`element_engine::Invocation`]s and implements
//! [`element_engine::ElementNode`] to decide how its elements are reused or
//! rebuilt.
//!
//! # Groups
//!
//! - **Geometry**: free-form shapes
//! - **Datum**: levels and grids
//! - **Component**: placed family instances
//!
//! [`CategoryDispatchNode`] routes by element category for graphs that mix
//! element kinds in one output.

pub mod component;
pub mod datum;
pub mod dispatch;
pub mod geometry;

pub use component::*;
pub use datum::*;
pub use dispatch::CategoryDispatchNode;
pub use geometry::*;
