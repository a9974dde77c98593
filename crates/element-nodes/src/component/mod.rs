//! Component nodes
//!
//! Nodes that place instances of loadable component types.

mod family_instance;

pub use family_instance::{FamilyInstanceNode, FamilySymbol, Placement};
