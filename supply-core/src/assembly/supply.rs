//! Supply Implementation
//!
//! A supply is the per-assembly result for one node. Leaf values and other
//! supplied entries are *packed*: their value is known up front. Factory
//! members are *built*: they hold the supplies of their own team and run
//! the factory's construction function at most once.
//!
//! # Single Flight
//!
//! A built supply stores its outcome in a `OnceLock`. The first reader runs
//! `construct` (and `on_ready`) under the lock's initialization guard; any
//! concurrent reader blocks on the same guard instead of racing. Success
//! and failure are both cached, so every later read observes the same
//! value or the same error.
//!
//! # Ownership
//!
//! A supply owns the supplies of its team, never the other way round. The
//! graph is acyclic, so reference counting is enough to release a whole
//! assembly once nothing points at it.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use super::engine;
use super::snapshot::{SupplySnapshot, SupplyState};
use super::supplied::Supplied;
use super::values::{Ctx, OnDemand, ValueMap};
use crate::config::AssemblyConfig;
use crate::error::{Result, SupplyError};
use crate::graph::{AsNode, NodeName, NodeRef, Typed, Value};

/// Read-only environment shared by every built supply of one assembly.
pub(crate) struct Scope {
    /// Entries the assembly was seeded with (supplied or preserved).
    pub(crate) seeds: IndexMap<NodeName, AnySupply>,

    /// Substitutes hired on the assembled node, by name.
    pub(crate) overrides: IndexMap<NodeName, NodeRef>,

    pub(crate) config: AssemblyConfig,
}

pub(crate) enum Origin {
    /// Value known up front; `None` means "no value".
    Packed(Option<Value>),

    /// Value produced by the node's factory on first read.
    Built {
        scope: Arc<Scope>,
        cell: OnceLock<Result<Value>>,
    },
}

pub(crate) struct SupplyInner {
    node: NodeRef,

    /// Supplies of every node this one can read, by name.
    resolved: IndexMap<NodeName, AnySupply>,

    origin: Origin,
}

/// Type-erased supply.
///
/// Cloning is cheap and preserves identity: clones compare equal under
/// [`AnySupply::same_as`].
#[derive(Clone)]
pub struct AnySupply(Arc<SupplyInner>);

impl AnySupply {
    pub(crate) fn packed(node: NodeRef, value: Option<Value>) -> Self {
        Self(Arc::new(SupplyInner {
            node,
            resolved: IndexMap::new(),
            origin: Origin::Packed(value),
        }))
    }

    pub(crate) fn built(node: NodeRef, resolved: IndexMap<NodeName, AnySupply>, scope: Arc<Scope>) -> Self {
        Self(Arc::new(SupplyInner {
            node,
            resolved,
            origin: Origin::Built {
                scope,
                cell: OnceLock::new(),
            },
        }))
    }

    /// The node this supply was produced for.
    pub fn node(&self) -> &NodeRef {
        &self.0.node
    }

    pub fn name(&self) -> &NodeName {
        self.0.node.name()
    }

    /// Supplies of every team member, by name.
    pub fn resolved_map(&self) -> &IndexMap<NodeName, AnySupply> {
        &self.0.resolved
    }

    /// Unpacked values of every team member, read on demand.
    pub fn value_map(&self) -> ValueMap<'_> {
        ValueMap::new(&self.0.resolved)
    }

    /// Whether the value was supplied rather than built.
    pub fn is_packed(&self) -> bool {
        matches!(self.0.origin, Origin::Packed(_))
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &AnySupply) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn scope(&self) -> Option<&Arc<Scope>> {
        match &self.0.origin {
            Origin::Packed(_) => None,
            Origin::Built { scope, .. } => Some(scope),
        }
    }

    pub(crate) fn config(&self) -> AssemblyConfig {
        self.scope().map(|scope| scope.config).unwrap_or_default()
    }

    /// Resolve the value, building it if needed. `Ok(None)` means no value.
    pub(crate) fn resolve(&self) -> Result<Option<Value>> {
        match &self.0.origin {
            Origin::Packed(value) => Ok(value.clone()),
            Origin::Built { cell, .. } => cell.get_or_init(|| self.construct()).clone().map(Some),
        }
    }

    fn construct(&self) -> Result<Value> {
        let node = &self.0.node;
        let Some(spec) = node.factory() else {
            return Err(SupplyError::MissingDependency(node.name().clone()));
        };
        tracing::trace!(node = %node.name(), "constructing");

        let values = ValueMap::new(&self.0.resolved);
        let ctx = Ctx::new(self);
        (spec.construct)(&values, &ctx).map_err(|err| SupplyError::construction(node.name(), err))
    }

    /// Unpack the value, failing if the node has none.
    pub fn unpack_any(&self) -> Result<Value> {
        self.resolve()?
            .ok_or_else(|| SupplyError::MissingDependency(self.name().clone()))
    }

    /// Current construction state, without triggering construction.
    pub fn state(&self) -> SupplyState {
        match &self.0.origin {
            Origin::Packed(Some(_)) => SupplyState::Ready,
            Origin::Packed(None) => SupplyState::Absent,
            Origin::Built { cell, .. } => match cell.get() {
                None => SupplyState::Pending,
                Some(Ok(_)) => SupplyState::Ready,
                Some(Err(_)) => SupplyState::Failed,
            },
        }
    }

    /// Handle for assembling `node` on demand against this supply's scope.
    pub fn ctx<T>(&self, node: impl Typed<T>) -> OnDemand<T> {
        OnDemand::new(self, node.node_ref())
    }

    /// Re-assemble with changed supplied values.
    ///
    /// Branches whose teams do not touch `delta` are carried over as the
    /// very same supplies.
    pub fn reassemble(&self, delta: Supplied) -> AnySupply {
        engine::reassemble(self, delta, None)
    }

    /// Re-assemble with changed values and substituted nodes.
    pub fn reassemble_with<I>(&self, delta: Supplied, overrides: I) -> Result<AnySupply>
    where
        I: IntoIterator,
        I::Item: AsNode,
    {
        let overrides: Vec<NodeRef> = overrides
            .into_iter()
            .map(|node| node.node_ref().clone())
            .collect();
        let node = crate::graph::hire(self.node(), &overrides)?;
        Ok(engine::reassemble(self, delta, Some((node, overrides))))
    }

    /// Describe this supply and its team.
    pub fn snapshot(&self) -> Vec<SupplySnapshot> {
        std::iter::once(self)
            .chain(self.0.resolved.values())
            .map(SupplySnapshot::of)
            .collect()
    }

    /// Render [`AnySupply::snapshot`] as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// View as a typed supply. The type is checked when unpacking.
    pub fn typed<T>(&self) -> Supply<T> {
        Supply {
            any: self.clone(),
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for AnySupply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supply")
            .field("node", self.name())
            .field("packed", &self.is_packed())
            .field("state", &self.state())
            .field("resolved", &self.0.resolved.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(name: &NodeName, value: Value) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| SupplyError::TypeMismatch {
        node: name.clone(),
        expected: type_name::<T>(),
    })
}

/// A supply of values of type `T`.
pub struct Supply<T> {
    any: AnySupply,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Supply<T> {
    pub fn as_any(&self) -> &AnySupply {
        &self.any
    }

    pub fn into_any(self) -> AnySupply {
        self.any
    }

    pub fn node(&self) -> &NodeRef {
        self.any.node()
    }

    pub fn name(&self) -> &NodeName {
        self.any.name()
    }

    pub fn resolved_map(&self) -> &IndexMap<NodeName, AnySupply> {
        self.any.resolved_map()
    }

    pub fn value_map(&self) -> ValueMap<'_> {
        self.any.value_map()
    }

    pub fn state(&self) -> SupplyState {
        self.any.state()
    }

    pub fn same_as(&self, other: &Supply<T>) -> bool {
        self.any.same_as(&other.any)
    }

    pub fn ctx<U>(&self, node: impl Typed<U>) -> OnDemand<U> {
        self.any.ctx(node)
    }

    pub fn reassemble(&self, delta: Supplied) -> Supply<T> {
        self.any.reassemble(delta).typed()
    }

    pub fn reassemble_with<I>(&self, delta: Supplied, overrides: I) -> Result<Supply<T>>
    where
        I: IntoIterator,
        I::Item: AsNode,
    {
        self.any.reassemble_with(delta, overrides).map(|any| any.typed())
    }

    pub fn snapshot(&self) -> Vec<SupplySnapshot> {
        self.any.snapshot()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        self.any.to_json()
    }
}

impl<T: Send + Sync + 'static> Supply<T> {
    /// Unpack the value, building it on first access.
    pub fn unpack(&self) -> Result<Arc<T>> {
        downcast(self.name(), self.any.unpack_any()?)
    }

    /// Unpack, treating "no value" as `None`.
    pub fn unpack_optional(&self) -> Result<Option<Arc<T>>> {
        self.any
            .resolve()?
            .map(|value| downcast(self.name(), value))
            .transpose()
    }
}

impl<T> Clone for Supply<T> {
    fn clone(&self) -> Self {
        self.any.typed()
    }
}

impl<T> fmt::Debug for Supply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.any, f)
    }
}
