//! Datum nodes
//!
//! Levels and grids that other elements are placed against.

mod grid;
mod level;

pub use grid::{GridCurve, GridNode, GridSpec};
pub use level::{LevelNode, LevelSpec};
