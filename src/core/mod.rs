//! Core build logic: types, configuration, naming, ordering, assembly, and
//! the lock/plan layer used for re-invocation.

pub mod config;
pub mod error;
pub mod hasher;
pub mod naming;
pub mod planner;
pub mod resolver;
pub mod stack;
pub mod state;
pub mod types;
