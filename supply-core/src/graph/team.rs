//! Team Builder
//!
//! A node's team is the deduplicated transitive closure of the nodes it
//! needs built. Teams are computed once, when the node is declared, from
//! the already computed teams of its direct dependencies, so no recursion
//! over the whole graph is ever needed.
//!
//! # Algorithm
//!
//! 1. Flatten every direct dependency together with its own team.
//! 2. Deduplicate by name. Plain declarations keep the first occurrence;
//!    override lists keep the last, so a hired node replaces rather than
//!    duplicates the node it stands in for.
//! 3. Reject the declaration if the owner's name shows up while flattening.
//! 4. Sort the members so every node comes after the nodes it reads from
//!    (Kahn's algorithm). A leftover set means the names loop.
//!
//! Two closures exist per factory. The narrow one (required deps and
//! overrides) decides what an assembly builds. The wide one also follows
//! optional and assembler edges; it is only used to reject cycles, since
//! those edges may legally point anywhere except back at the owner.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};

use super::node::{NodeName, NodeRef};
use crate::error::{Result, SupplyError};

/// Deduplication policy when two entries share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Merge {
    FirstWins,
    LastWins,
}

/// Accumulates team members in flattening order.
pub(crate) struct TeamBuilder<'a> {
    owner: &'a NodeName,
    members: IndexMap<NodeName, NodeRef>,
}

impl<'a> TeamBuilder<'a> {
    pub(crate) fn new(owner: &'a NodeName) -> Self {
        Self {
            owner,
            members: IndexMap::new(),
        }
    }

    /// Seed with an existing team, keeping its order.
    pub(crate) fn with_members(owner: &'a NodeName, members: IndexMap<NodeName, NodeRef>) -> Self {
        Self { owner, members }
    }

    /// Add `dep` and its team.
    pub(crate) fn add(&mut self, dep: &NodeRef, merge: Merge) -> Result<()> {
        let loops_back = dep.name() == self.owner || dep.team().any(|m| m.name() == self.owner);
        if loops_back {
            return Err(cycle_error(self.owner, std::slice::from_ref(dep)));
        }
        for member in dep.team() {
            self.insert(member, Merge::FirstWins);
        }
        self.insert(dep, merge);
        Ok(())
    }

    fn insert(&mut self, node: &NodeRef, merge: Merge) {
        match merge {
            Merge::FirstWins => {
                self.members
                    .entry(node.name().clone())
                    .or_insert_with(|| node.clone());
            }
            Merge::LastWins => {
                self.members.insert(node.name().clone(), node.clone());
            }
        }
    }

    /// Drop members no longer reachable from `roots`.
    ///
    /// Edges are required and override edges, followed by name, so members
    /// only the replaced node needed fall away with it.
    pub(crate) fn retain_reachable<'n>(&mut self, roots: impl IntoIterator<Item = &'n NodeName>) {
        let mut reached: HashSet<NodeName> = HashSet::new();
        let mut stack: Vec<NodeName> = roots.into_iter().cloned().collect();
        while let Some(name) = stack.pop() {
            let Some(node) = self.members.get(&name) else {
                continue;
            };
            for dep in node.requires().iter().chain(node.overrides()) {
                if !reached.contains(dep.name()) {
                    stack.push(dep.name().clone());
                }
            }
            reached.insert(name);
        }
        self.members.retain(|name, _| reached.contains(name));
    }

    /// Finish: sort members into build order.
    pub(crate) fn finish(self) -> Result<IndexMap<NodeName, NodeRef>> {
        build_order(self.owner, self.members)
    }
}

/// Compute the narrow team of `owner` from its required dependencies.
pub(crate) fn build_team(owner: &NodeName, requires: &[NodeRef]) -> Result<IndexMap<NodeName, NodeRef>> {
    let mut builder = TeamBuilder::new(owner);
    for dep in requires {
        builder.add(dep, Merge::FirstWins)?;
    }
    builder.finish()
}

/// Compute the wide closure of names reachable from `edges`.
///
/// Fails if `owner` is reachable.
pub(crate) fn wide_closure<'n>(
    owner: &NodeName,
    edges: impl IntoIterator<Item = &'n NodeRef>,
) -> Result<IndexSet<NodeName>> {
    let edges: Vec<&NodeRef> = edges.into_iter().collect();
    let mut closure = IndexSet::new();
    for dep in &edges {
        closure.insert(dep.name().clone());
        closure.extend(dep.wide_team().cloned());
    }
    if closure.contains(owner) {
        return Err(cycle_error(owner, edges.into_iter().cloned().collect::<Vec<_>>().as_slice()));
    }
    Ok(closure)
}

/// Every edge kind leaving `node`.
fn wide_edges(node: &NodeRef) -> impl Iterator<Item = &NodeRef> + '_ {
    node.requires()
        .iter()
        .chain(node.optional())
        .chain(node.assemblers())
        .chain(node.overrides())
}

/// Build a cycle error, searching `starts` for the path back to `owner`.
fn cycle_error(owner: &NodeName, starts: &[NodeRef]) -> SupplyError {
    let path = find_path(owner, starts).unwrap_or_else(|| vec![owner.clone(), owner.clone()]);
    SupplyError::CircularDependency {
        node: owner.clone(),
        path,
    }
}

/// Depth-first search for a node named `owner`, following every edge kind.
///
/// Returns the path `owner -> .. -> owner`.
fn find_path(owner: &NodeName, starts: &[NodeRef]) -> Option<Vec<NodeName>> {
    let mut visited: HashSet<NodeName> = HashSet::new();
    let mut stack: Vec<(NodeRef, Vec<NodeName>)> = starts
        .iter()
        .rev()
        .map(|node| (node.clone(), vec![owner.clone()]))
        .collect();

    while let Some((node, mut path)) = stack.pop() {
        path.push(node.name().clone());
        if node.name() == owner {
            return Some(path);
        }
        if !visited.insert(node.name().clone()) {
            continue;
        }
        for next in wide_edges(&node).collect::<Vec<_>>().into_iter().rev() {
            stack.push((next.clone(), path.clone()));
        }
    }
    None
}

/// Sort `members` so each node follows everything it reads from.
///
/// Edges are taken by name and only count when both ends are members, so a
/// hired substitute is ordered by its own dependencies rather than the
/// dependencies of the node it replaced.
pub(crate) fn build_order(
    owner: &NodeName,
    members: IndexMap<NodeName, NodeRef>,
) -> Result<IndexMap<NodeName, NodeRef>> {
    let mut in_degree: HashMap<&NodeName, usize> = HashMap::new();
    let mut dependents: HashMap<&NodeName, Vec<&NodeName>> = HashMap::new();
    let mut queue = VecDeque::new();

    // Calculate in-degrees (only counting edges within the member set)
    for (name, node) in &members {
        let deps = order_edges(node, &members);
        in_degree.insert(name, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(name);
        }
        if in_degree[name] == 0 {
            queue.push_back(name);
        }
    }

    // Kahn's algorithm
    let mut sorted: Vec<&NodeName> = Vec::with_capacity(members.len());
    while let Some(name) = queue.pop_front() {
        sorted.push(name);
        for &dependent in dependents.get(name).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if sorted.len() < members.len() {
        let done: HashSet<&NodeName> = sorted.iter().copied().collect();
        return Err(SupplyError::CircularDependency {
            node: owner.clone(),
            path: leftover_cycle(&members, &done),
        });
    }

    let order: Vec<NodeName> = sorted.into_iter().cloned().collect();
    let mut members = members;
    Ok(order
        .into_iter()
        .filter_map(|name| members.swap_remove_entry(&name))
        .collect())
}

/// Names `node` must be built after, restricted to `members`.
fn order_edges<'m>(node: &NodeRef, members: &'m IndexMap<NodeName, NodeRef>) -> Vec<&'m NodeName> {
    let mut seen = IndexSet::new();
    for dep in node.direct_deps().chain(node.overrides()) {
        if let Some((name, _)) = members.get_key_value(dep.name()) {
            if name != node.name() {
                seen.insert(name);
            }
        }
    }
    seen.into_iter().collect()
}

/// Walk the unsorted remainder until a name repeats.
///
/// Every leftover member still has an unsatisfied edge into the remainder,
/// so the walk always closes a loop.
fn leftover_cycle(members: &IndexMap<NodeName, NodeRef>, done: &HashSet<&NodeName>) -> Vec<NodeName> {
    let Some((start, _)) = members.iter().find(|(name, _)| !done.contains(name)) else {
        return Vec::new();
    };
    let mut walk: Vec<NodeName> = vec![start.clone()];
    let mut current = start;
    loop {
        let node = &members[current];
        let Some(next) = order_edges(node, members)
            .into_iter()
            .find(|name| !done.contains(name))
        else {
            return walk;
        };
        if let Some(pos) = walk.iter().position(|n| n == next) {
            let mut cycle = walk.split_off(pos);
            cycle.push(next.clone());
            return cycle;
        }
        walk.push(next.clone());
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AsNode, FactoryConfig};
    use crate::Registry;

    fn names(team: &IndexMap<NodeName, NodeRef>) -> Vec<&str> {
        team.keys().map(NodeName::as_str).collect()
    }

    #[test]
    fn team_is_deduplicated_closure_in_build_order() {
        let registry = Registry::new();
        let c = registry.declare("c").unwrap().as_leaf::<u32>();
        let a = registry
            .declare("a")
            .unwrap()
            .as_factory(FactoryConfig::new(|_, _| Ok(1u32)).requires(&c))
            .unwrap();
        let b = registry
            .declare("b")
            .unwrap()
            .as_factory(FactoryConfig::new(|_, _| Ok(2u32)).requires(&c))
            .unwrap();

        let owner = NodeName::from("root");
        let team = build_team(&owner, &[a.node_ref().clone(), b.node_ref().clone()]).unwrap();
        assert_eq!(names(&team), vec!["c", "a", "b"]);
    }

    #[test]
    fn owner_in_flattened_team_is_a_cycle() {
        let registry = Registry::new();
        let a = registry.declare("a").unwrap().as_leaf::<u32>();

        let err = build_team(&NodeName::from("a"), &[a.node_ref().clone()]).unwrap_err();
        assert!(matches!(err, SupplyError::CircularDependency { .. }));
    }

    #[test]
    fn last_wins_replaces_existing_member() {
        let registry = Registry::new();
        let x = registry.declare("x").unwrap().as_leaf::<u32>();
        let first = registry
            .declare("dep")
            .unwrap()
            .as_factory(FactoryConfig::new(|_, _| Ok(1u32)).requires(&x))
            .unwrap();
        let other = registry.declare("other").unwrap().as_leaf::<u32>();

        let owner = NodeName::from("owner");
        let mut builder = TeamBuilder::new(&owner);
        builder.add(first.node_ref(), Merge::FirstWins).unwrap();
        builder.add(other.node_ref(), Merge::LastWins).unwrap();
        let team = builder.finish().unwrap();

        assert_eq!(names(&team), vec!["x", "other", "dep"]);
        assert!(team["dep"].ptr_eq(first.node_ref()));
    }
}
