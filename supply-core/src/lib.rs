//! Supply Core
//!
//! This crate provides the resolution engine for Supply, a dependency
//! injection graph assembler. It implements:
//!
//! - A registry of uniquely named nodes (leaves and factories)
//! - Team computation with declaration-time cycle detection
//! - Assembly with single-flight construction, background prefetch and
//!   lazy members
//! - Incremental re-assembly that keeps untouched branches by identity
//! - Node substitution through `hire` and `mock`
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `registry`: Name reservation and the two declaration forms
//! - `graph`: Nodes, teams and overrides
//! - `assembly`: Supplies, construction and re-assembly
//! - `watch`: Identity-based change notification over re-assembly
//! - `config`: Assembly options
//!
//! # Example
//!
//! ```rust
//! use supply_core::{FactoryConfig, Registry, Supplied};
//!
//! let registry = Registry::new();
//! let name = registry.declare("name").unwrap().as_leaf::<String>();
//!
//! let dep = name.clone();
//! let greeting = registry
//!     .declare("greeting")
//!     .unwrap()
//!     .as_factory(
//!         FactoryConfig::new(move |values, _ctx| Ok(format!("hello {}", values.get(&dep)?)))
//!             .requires(&name),
//!     )
//!     .unwrap();
//!
//! let supply = greeting.assemble(Supplied::new().with(&name, "world".to_string()));
//! assert_eq!(supply.unpack().unwrap().as_str(), "hello world");
//!
//! // Only the branch reading `name` is rebuilt.
//! let next = supply.reassemble(Supplied::new().with(&name, "again".to_string()));
//! assert_eq!(next.unpack().unwrap().as_str(), "hello again");
//! ```

pub mod assembly;
pub mod config;
pub mod error;
pub mod graph;
pub mod registry;
pub mod watch;

pub use assembly::{AnySupply, Ctx, OnDemand, Supplied, Supply, SupplySnapshot, SupplyState, ValueMap};
pub use config::{AssemblyConfig, Prefetch};
pub use error::{BoxError, Result, SupplyError};
pub use graph::{AsNode, Factory, FactoryConfig, Leaf, NodeKind, NodeName, NodeRef, Typed, Value};
pub use registry::{Declaration, Registry};
pub use watch::{SubscriberId, SupplyWatch};
