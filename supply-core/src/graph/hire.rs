//! Overrides
//!
//! `mock` declares an alternative factory under an existing name. `hire`
//! derives a node whose team has named members swapped for substitutes.
//!
//! Hiring composes: hiring an already hired node merges the override lists
//! (last override wins per name) and rebuilds the team from the original,
//! un-hired node, so substitutes never nest. Members that only a replaced
//! node needed are dropped from the hired team.

use indexmap::IndexMap;

use super::node::{AsNode, Factory, FactoryConfig, FactorySpec, Leaf, NodeDef, NodeKind, NodeList, NodeName, NodeRef};
use super::team::{self, Merge, TeamBuilder};
use crate::error::Result;
use crate::registry::define_factory;

/// Derive `node` with `overrides` substituted into its team.
///
/// Leaves have nothing to substitute and are returned unchanged.
pub(crate) fn hire(node: &NodeRef, overrides: &[NodeRef]) -> Result<NodeRef> {
    let Some(spec) = node.factory() else {
        return Ok(node.clone());
    };
    let base = spec.base.clone().unwrap_or_else(|| node.clone());
    let Some(base_spec) = base.factory() else {
        return Ok(node.clone());
    };
    let owner = node.name();

    let mut merged: IndexMap<NodeName, NodeRef> = IndexMap::new();
    for hired in spec.overrides.iter().chain(overrides) {
        merged.insert(hired.name().clone(), hired.clone());
    }

    let mut wide = base_spec.wide.clone();
    wide.extend(team::wide_closure(owner, merged.values())?);

    let mut builder = TeamBuilder::with_members(owner, base_spec.team.clone());
    for hired in merged.values() {
        builder.add(hired, Merge::LastWins)?;
    }
    builder.retain_reachable(base_spec.requires.iter().map(NodeRef::name).chain(merged.keys()));
    let team = builder.finish()?;

    tracing::debug!(
        node = %owner,
        overrides = ?merged.keys().collect::<Vec<_>>(),
        team = team.len(),
        "node hired"
    );

    Ok(NodeRef::new(NodeDef {
        name: owner.clone(),
        type_name: node.type_name(),
        kind: NodeKind::Factory(FactorySpec {
            requires: base_spec.requires.clone(),
            optional: base_spec.optional.clone(),
            assemblers: base_spec.assemblers.clone(),
            overrides: merged.into_values().collect::<NodeList>(),
            lazy: base_spec.lazy,
            mock: base_spec.mock,
            construct: base_spec.construct.clone(),
            team,
            wide,
            base: Some(base.clone()),
        }),
    }))
}

impl<T: Send + Sync + 'static> Factory<T> {
    /// Derive a node with the given nodes substituted by name.
    ///
    /// Cycle detection is re-run over the substituted graph.
    pub fn hire<I>(&self, overrides: I) -> Result<Factory<T>>
    where
        I: IntoIterator,
        I::Item: AsNode,
    {
        let overrides: Vec<NodeRef> = overrides
            .into_iter()
            .map(|node| node.node_ref().clone())
            .collect();
        hire(self.node_ref(), &overrides).map(Factory::from_ref)
    }

    /// Declare an alternative factory under this node's name.
    ///
    /// Mocks can only be introduced through [`Factory::hire`].
    pub fn mock(&self, config: FactoryConfig<T>) -> Result<Factory<T>> {
        define_factory(self.name().clone(), config, true).map(Factory::from_ref)
    }
}

impl<T: Send + Sync + 'static> Leaf<T> {
    /// Declare a factory standing in for this leaf.
    pub fn mock(&self, config: FactoryConfig<T>) -> Result<Factory<T>> {
        define_factory(self.name().clone(), config, true).map(Factory::from_ref)
    }
}
