//! WaterColorSite infrastructure as a declarative resource graph.
//!
//! One environment token in, one stack description out: compute unit, three
//! tables, search cluster, permission grants, the HTTP routing tree and the
//! edge distribution, in dependency order.

pub mod cli;
pub mod core;
pub mod resources;

pub use crate::core::error::BuildError;
pub use crate::core::stack::{build_stack, synthesize};
