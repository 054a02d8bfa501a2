//! Externally supplied values.
//!
//! [`Supplied`] is the flat name → value map an assembly starts from. An
//! entry can carry a value, an already built supply, or an explicit "no
//! value"; the last one is authoritative during re-assembly and never falls
//! back to whatever the name held before.

use std::sync::Arc;

use indexmap::IndexMap;

use super::supply::{AnySupply, Supply};
use crate::graph::{AsNode, NodeName, NodeRef, Typed, Value};

pub(crate) enum Provided {
    Value(Value),
    Supply(AnySupply),
    Absent,
}

pub(crate) struct Provision {
    node: NodeRef,
    provided: Provided,
}

impl Provision {
    /// Turn the provision into the supply that seeds the assembly context.
    pub(crate) fn into_supply(self) -> AnySupply {
        match self.provided {
            Provided::Value(value) => AnySupply::packed(self.node, Some(value)),
            Provided::Absent => AnySupply::packed(self.node, None),
            Provided::Supply(supply) => supply,
        }
    }
}

/// Values supplied to an assembly, keyed by node name.
#[derive(Default)]
pub struct Supplied {
    entries: IndexMap<NodeName, Provision>,
}

impl Supplied {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a value for `node`.
    pub fn with<T: Send + Sync + 'static>(self, node: impl Typed<T>, value: T) -> Self {
        self.with_arc(node, Arc::new(value))
    }

    /// Supply a shared value; unpacking returns this same allocation.
    pub fn with_arc<T: Send + Sync + 'static>(self, node: impl Typed<T>, value: Arc<T>) -> Self {
        self.insert(node.node_ref(), Provided::Value(value))
    }

    /// Reuse an already built supply as is.
    pub fn with_supply<T>(self, supply: &Supply<T>) -> Self {
        self.with_any(supply.as_any())
    }

    pub fn with_any(self, supply: &AnySupply) -> Self {
        let node = supply.node().clone();
        self.insert(&node, Provided::Supply(supply.clone()))
    }

    /// Explicitly supply "no value" for `node`.
    pub fn without(self, node: impl AsNode) -> Self {
        self.insert(node.node_ref(), Provided::Absent)
    }

    fn insert(mut self, node: &NodeRef, provided: Provided) -> Self {
        self.entries.insert(
            node.name().clone(),
            Provision {
                node: node.clone(),
                provided,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &NodeName> + '_ {
        self.entries.keys()
    }

    /// Convert every entry into its seed supply.
    pub(crate) fn into_seeds(self) -> IndexMap<NodeName, AnySupply> {
        self.entries
            .into_iter()
            .map(|(name, provision)| (name, provision.into_supply()))
            .collect()
    }
}
