//! Supply Graph
//!
//! This module implements the declared side of the engine: the nodes, the
//! teams computed from them, and the override mechanism.
//!
//! # Overview
//!
//! The declared graph is a directed acyclic graph where:
//!
//! - Nodes are leaves (values supplied from outside) or factories (values
//!   built from other nodes)
//! - Edges point from a factory to what it reads: required deps, optional
//!   deps, assemblers, and hired overrides
//!
//! # Design Decisions
//!
//! 1. Every node carries its own precomputed team rather than the graph
//!    being stored centrally, because:
//!    - Declaration order already guarantees dependencies exist first
//!    - Assembly never has to walk the graph, only a node's team
//!    - Nodes can be shared freely across assemblies and threads
//!
//! 2. Cycles are rejected when a node is declared or hired. Assembly never
//!    has to deal with them.
//!
//! 3. Edges are resolved by name inside an assembly, which is what lets a
//!    hired substitute stand in for a node without touching its dependents.

mod hire;
mod node;
pub(crate) mod team;

pub(crate) use hire::hire;
pub(crate) use node::{FactorySpec, NodeDef};
pub use node::{AsNode, Factory, FactoryConfig, Leaf, NodeKind, NodeName, NodeRef, Typed, Value};
