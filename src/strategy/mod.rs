//! Strategy layer: fair probability estimation, value scoring, tier
//! classification and stake sizing.

pub mod edge;
pub mod probability;
pub mod stake;
pub mod tiers;
