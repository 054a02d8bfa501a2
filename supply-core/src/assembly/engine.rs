//! Assembly Engine
//!
//! Turns a node plus supplied values into a tree of supplies.
//!
//! # Algorithm
//!
//! 1. Seed the context with the supplied (or preserved) entries.
//! 2. Walk the node's team in build order. Each member not already seeded
//!    gets one supply: leaves become "no value" placeholders, factories
//!    become built supplies whose resolved map is taken from the same
//!    context. Two dependents of a member therefore hold the same supply.
//! 3. Hand the fresh, non-lazy members to the prefetcher.
//! 4. Wrap the whole context in the root supply.
//!
//! Nothing here runs user code. Construction happens on first read, or in
//! the background when prefetch is enabled.
//!
//! # Re-assembly
//!
//! An existing supply's members are carried over unless their own name or
//! any name they read, or could read, was changed. Carried-over members
//! keep their identity and their cached result; the new delta always wins
//! over them.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::prefetch;
use super::supplied::Supplied;
use super::supply::{AnySupply, Scope, Supply};
use crate::config::AssemblyConfig;
use crate::graph::{AsNode, Factory, Leaf, NodeName, NodeRef, Value};

/// Assemble `root` over `seeds`.
pub(crate) fn assemble(
    root: &NodeRef,
    seeds: IndexMap<NodeName, AnySupply>,
    config: AssemblyConfig,
) -> AnySupply {
    if let Some(seeded) = seeds.get(root.name()) {
        return seeded.clone();
    }
    if root.is_leaf() {
        return AnySupply::packed(root.clone(), None);
    }

    let overrides = root
        .overrides()
        .iter()
        .map(|node| (node.name().clone(), node.clone()))
        .collect();
    let scope = Arc::new(Scope {
        seeds: seeds.clone(),
        overrides,
        config,
    });

    let seeded = seeds.len();
    let mut context = seeds;
    let mut fresh = Vec::new();

    for member in root.team() {
        if context.contains_key(member.name()) {
            continue;
        }
        let supply = if member.is_leaf() {
            AnySupply::packed(member.clone(), None)
        } else {
            let resolved = effective_team(member, &context);
            let supply = AnySupply::built(member.clone(), resolved, scope.clone());
            if !member.is_lazy() {
                fresh.push(supply.clone());
            }
            supply
        };
        context.insert(member.name().clone(), supply);
    }

    tracing::debug!(
        node = %root.name(),
        seeded,
        built = context.len() - seeded,
        prefetch = fresh.len(),
        "assembled"
    );

    let supply = AnySupply::built(root.clone(), context, scope);
    prefetch::schedule(fresh, config.prefetch);
    supply
}

/// Assemble `node` with `supplied` layered over reusable entries of `base`.
pub(crate) fn assemble_over(
    node: &NodeRef,
    base: &IndexMap<NodeName, AnySupply>,
    supplied: Supplied,
    config: AssemblyConfig,
) -> AnySupply {
    let changed: IndexSet<NodeName> = supplied.names().cloned().collect();
    let mut seeds = preserve(base, &changed, node.name());
    seeds.extend(supplied.into_seeds());
    assemble(node, seeds, config)
}

/// Everything `member` can read, by name, resolved against `context`.
///
/// Edges are followed by name so a hired substitute is picked up in place
/// of the node the member was declared against.
fn effective_team(
    member: &NodeRef,
    context: &IndexMap<NodeName, AnySupply>,
) -> IndexMap<NodeName, AnySupply> {
    let mut resolved = IndexMap::new();
    for dep in member.direct_deps().chain(member.overrides()) {
        let Some(supply) = context.get(dep.name()) else {
            continue;
        };
        for (name, inner) in supply.resolved_map() {
            resolved.entry(name.clone()).or_insert_with(|| inner.clone());
        }
        resolved.insert(dep.name().clone(), supply.clone());
    }
    resolved
}

/// Entries of `base` that survive a change to `changed`.
///
/// An entry is dropped when it is `target` itself, when it was changed, or
/// when it or any member it reads declares an edge to a changed name. An
/// optional dependency that was absent counts as declared, so supplying it
/// later rebuilds every reader.
pub(crate) fn preserve(
    base: &IndexMap<NodeName, AnySupply>,
    changed: &IndexSet<NodeName>,
    target: &NodeName,
) -> IndexMap<NodeName, AnySupply> {
    base.iter()
        .filter(|(name, supply)| *name != target && !changed.contains(*name) && !perturbed(supply, changed))
        .map(|(name, supply)| (name.clone(), supply.clone()))
        .collect()
}

/// Whether anything `supply` reads, or would read once supplied, changed.
fn perturbed(supply: &AnySupply, changed: &IndexSet<NodeName>) -> bool {
    if supply.is_packed() {
        return false;
    }
    let declared = |node: &NodeRef| {
        node.direct_deps()
            .chain(node.assemblers())
            .chain(node.overrides())
            .any(|dep| changed.contains(dep.name()))
    };
    declared(supply.node())
        || supply
            .resolved_map()
            .iter()
            .any(|(name, member)| changed.contains(name) || (!member.is_packed() && declared(member.node())))
}

/// Re-assemble `existing` with `delta`, optionally as a hired node.
pub(crate) fn reassemble(
    existing: &AnySupply,
    delta: Supplied,
    hired: Option<(NodeRef, Vec<NodeRef>)>,
) -> AnySupply {
    if existing.is_packed() {
        return match delta.into_seeds().shift_remove(existing.name()) {
            Some(replacement) => replacement,
            None => existing.clone(),
        };
    }

    let mut changed: IndexSet<NodeName> = delta.names().cloned().collect();
    let node = match hired {
        Some((node, overrides)) => {
            changed.extend(overrides.iter().map(|node| node.name().clone()));
            node
        }
        None => existing.node().clone(),
    };

    let mut seeds = preserve(existing.resolved_map(), &changed, node.name());
    let preserved = seeds.len();
    seeds.extend(delta.into_seeds());

    tracing::debug!(
        node = %node.name(),
        preserved,
        changed = changed.len(),
        "reassembling"
    );

    assemble(&node, seeds, existing.config())
}

impl<T: Send + Sync + 'static> Factory<T> {
    /// Assemble this node with the default configuration.
    ///
    /// Always returns a supply; failures surface when a value is unpacked.
    pub fn assemble(&self, supplied: Supplied) -> Supply<T> {
        self.assemble_with(supplied, AssemblyConfig::default())
    }

    pub fn assemble_with(&self, supplied: Supplied, config: AssemblyConfig) -> Supply<T> {
        assemble(self.node_ref(), supplied.into_seeds(), config).typed()
    }
}

impl<T: Send + Sync + 'static> Leaf<T> {
    /// Wrap a value as a supply of this leaf.
    pub fn pack(&self, value: T) -> Supply<T> {
        self.pack_arc(Arc::new(value))
    }

    /// Wrap a shared value; unpacking returns this same allocation.
    pub fn pack_arc(&self, value: Arc<T>) -> Supply<T> {
        AnySupply::packed(self.node_ref().clone(), Some(value as Value)).typed()
    }
}
