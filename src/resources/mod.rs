//! Resource descriptors: one module per resource family.
//!
//! Each module exposes plain data types plus `build*` functions that derive a
//! descriptor from the resolved names, the resolved configuration and any
//! already-constructed descriptors it depends on.

pub mod api;
pub mod compute;
pub mod edge;
pub mod permissions;
pub mod routing;
pub mod search;
pub mod table;
