//! Supply Assembly
//!
//! The run-time side of the engine: turning a declared node and a set of
//! supplied values into supplies, and re-assembling them incrementally.
//!
//! # Overview
//!
//! - [`Supplied`]: the values an assembly starts from
//! - [`Supply`] / [`AnySupply`]: one node's result within an assembly
//! - [`ValueMap`] / [`Ctx`]: what a factory's construction function sees
//! - [`OnDemand`]: a node assembled later against an existing scope
//!
//! # Design Decisions
//!
//! 1. Construction is pull-based. `assemble` only wires supplies together;
//!    values are built when first read (or prefetched) and cached, so an
//!    assembly never fails as a whole.
//!
//! 2. Re-assembly carries unaffected supplies over by identity, which lets
//!    observers skip work with a pointer comparison.

mod engine;
mod prefetch;
mod snapshot;
mod supplied;
mod supply;
mod values;

pub use snapshot::{SupplySnapshot, SupplyState};
pub use supplied::Supplied;
pub use supply::{AnySupply, Supply};
pub use values::{Ctx, OnDemand, ValueMap};
