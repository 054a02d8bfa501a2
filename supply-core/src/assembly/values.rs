//! What construction functions see.
//!
//! A factory's `construct` receives a [`ValueMap`], which unpacks team
//! members only when they are read, and a [`Ctx`], which assembles
//! assemblers (or fresh copies of team members) on demand.

use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;

use super::engine;
use super::supplied::Supplied;
use super::supply::{downcast, AnySupply, Supply};
use crate::config::AssemblyConfig;
use crate::error::{Result, SupplyError};
use crate::graph::{AsNode, NodeName, NodeRef, Typed, Value};

/// Values of a supply's team, unpacked on access.
#[derive(Clone, Copy)]
pub struct ValueMap<'a> {
    resolved: &'a IndexMap<NodeName, AnySupply>,
}

impl<'a> ValueMap<'a> {
    pub(crate) fn new(resolved: &'a IndexMap<NodeName, AnySupply>) -> Self {
        Self { resolved }
    }

    /// Read a required value, building it if needed.
    pub fn get<T: Send + Sync + 'static>(&self, node: impl Typed<T>) -> Result<Arc<T>> {
        let name = node.node_ref().name();
        downcast(name, self.get_any(name.as_str())?)
    }

    /// Read a value that may legitimately be missing.
    ///
    /// Errors raised while building a present value are still returned.
    pub fn optional<T: Send + Sync + 'static>(&self, node: impl Typed<T>) -> Result<Option<Arc<T>>> {
        let name = node.node_ref().name();
        match self.resolved.get(name) {
            None => Ok(None),
            Some(supply) => supply
                .resolve()?
                .map(|value| downcast(name, value))
                .transpose(),
        }
    }

    /// Read a value by name without a type.
    pub fn get_any(&self, name: &str) -> Result<Value> {
        match self.resolved.get(name) {
            Some(supply) => supply.unpack_any(),
            None => Err(SupplyError::MissingDependency(NodeName::from(name))),
        }
    }

    /// The supply behind `name`, if it is part of the team.
    pub fn supply(&self, name: &str) -> Option<&'a AnySupply> {
        self.resolved.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'a NodeName> + 'a {
        self.resolved.keys()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Construction context of the supply being built.
pub struct Ctx<'a> {
    supply: &'a AnySupply,
}

impl<'a> Ctx<'a> {
    pub(crate) fn new(supply: &'a AnySupply) -> Self {
        Self { supply }
    }

    /// Name of the node being built.
    pub fn name(&self) -> &NodeName {
        self.supply.name()
    }

    /// Handle for assembling `node` against the current scope.
    pub fn on_demand<T>(&self, node: impl Typed<T>) -> OnDemand<T> {
        self.supply.ctx(node)
    }

    /// Assemble `node` right away with `supplied` layered over the current scope.
    pub fn assemble<T>(&self, node: impl Typed<T>, supplied: Supplied) -> Supply<T> {
        self.on_demand(node).assemble(supplied)
    }
}

/// A node ready to be assembled against another supply's scope.
///
/// Holding one does not keep the supply it came from alive, only the
/// members it may reuse.
pub struct OnDemand<T> {
    node: NodeRef,
    base: IndexMap<NodeName, AnySupply>,
    config: AssemblyConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OnDemand<T> {
    pub(crate) fn new(from: &AnySupply, node: &NodeRef) -> Self {
        let scope = from.scope();

        // A substitute hired on the assembled node replaces the assembler too.
        let node = scope
            .and_then(|scope| scope.overrides.get(node.name()))
            .cloned()
            .unwrap_or_else(|| node.clone());

        let mut base = from.resolved_map().clone();
        if let Some(scope) = scope {
            for (name, supply) in &scope.seeds {
                base.entry(name.clone()).or_insert_with(|| supply.clone());
            }
        }

        Self {
            node,
            base,
            config: from.config(),
            _marker: PhantomData,
        }
    }

    /// The node that will be assembled, after substitution.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Assemble the node. Reusable members of the scope are shared unless
    /// `supplied` perturbs them.
    pub fn assemble(&self, supplied: Supplied) -> Supply<T> {
        engine::assemble_over(&self.node, &self.base, supplied, self.config).typed()
    }
}

impl<T> AsNode for OnDemand<T> {
    fn node_ref(&self) -> &NodeRef {
        &self.node
    }
}
