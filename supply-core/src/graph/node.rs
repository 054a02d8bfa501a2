//! Graph Nodes
//!
//! This module defines the declared, immutable vertices of the supply graph.
//!
//! A node is either a leaf, whose value is always provided from outside, or
//! a factory, which knows how to build its value from other nodes. Nodes are
//! shared through [`NodeRef`] and never mutated after declaration; `hire` and
//! `mock` derive new nodes instead.

use std::any::{type_name, Any};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::assembly::{Ctx, ValueMap};
use crate::error::BoxError;

/// Type-erased value produced by a node.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Erased construction function: runs `construct` and then `on_ready`.
pub(crate) type ConstructFn =
    Arc<dyn Fn(&ValueMap<'_>, &Ctx<'_>) -> std::result::Result<Value, BoxError> + Send + Sync>;

const NO_NODES: &[NodeRef] = &[];

/// Dependency lists are short in practice.
pub(crate) type NodeList = SmallVec<[NodeRef; 4]>;

/// Unique name of a node within its registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName(Arc<str>);

impl NodeName {
    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether `name` is an acceptable identifier.
    pub fn is_valid(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl Borrow<str> for NodeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// The kind of node in the supply graph.
pub enum NodeKind {
    /// A value supplied from outside. Leaves have no dependencies.
    Leaf,

    /// A node built from other nodes.
    Factory(FactorySpec),
}

/// Everything a factory node carries besides its name.
pub struct FactorySpec {
    /// Dependencies that must resolve for the node to build.
    pub(crate) requires: NodeList,

    /// Dependencies read only if something else supplies them.
    pub(crate) optional: NodeList,

    /// Factories known to the node but never wired automatically.
    pub(crate) assemblers: NodeList,

    /// Substitutions introduced by `hire`.
    pub(crate) overrides: NodeList,

    /// Build on first read instead of in the background.
    pub(crate) lazy: bool,

    /// Declared through `mock`; only usable via `hire`.
    pub(crate) mock: bool,

    pub(crate) construct: ConstructFn,

    /// Narrow closure (requires + overrides), in build order.
    pub(crate) team: IndexMap<NodeName, NodeRef>,

    /// Wide closure names (requires + optional + assemblers + overrides).
    pub(crate) wide: IndexSet<NodeName>,

    /// The node this one was hired from, if any.
    pub(crate) base: Option<NodeRef>,
}

/// A declared node.
pub struct NodeDef {
    pub(crate) name: NodeName,
    pub(crate) kind: NodeKind,
    pub(crate) type_name: &'static str,
}

/// Shared handle to a declared node.
#[derive(Clone)]
pub struct NodeRef(pub(crate) Arc<NodeDef>);

impl NodeRef {
    pub(crate) fn new(def: NodeDef) -> Self {
        Self(Arc::new(def))
    }

    /// Get the node's name.
    pub fn name(&self) -> &NodeName {
        &self.0.name
    }

    /// Get the node's kind.
    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Name of the Rust type this node produces.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.0.kind, NodeKind::Leaf)
    }

    pub(crate) fn factory(&self) -> Option<&FactorySpec> {
        match &self.0.kind {
            NodeKind::Factory(spec) => Some(spec),
            NodeKind::Leaf => None,
        }
    }

    /// Whether the node waits for its first read before building.
    pub fn is_lazy(&self) -> bool {
        self.factory().is_some_and(|f| f.lazy)
    }

    /// Whether the node was declared with `mock`.
    pub fn is_mock(&self) -> bool {
        self.factory().is_some_and(|f| f.mock)
    }

    /// The deduplicated transitive closure of required deps and overrides,
    /// in build order. Empty for leaves.
    pub fn team(&self) -> impl Iterator<Item = &NodeRef> + '_ {
        self.factory().into_iter().flat_map(|f| f.team.values())
    }

    /// Names of every node reachable through any edge kind.
    pub fn wide_team(&self) -> impl Iterator<Item = &NodeName> + '_ {
        self.factory().into_iter().flat_map(|f| f.wide.iter())
    }

    pub fn requires(&self) -> &[NodeRef] {
        self.factory().map_or(NO_NODES, |f| f.requires.as_slice())
    }

    pub fn optional(&self) -> &[NodeRef] {
        self.factory().map_or(NO_NODES, |f| f.optional.as_slice())
    }

    pub fn assemblers(&self) -> &[NodeRef] {
        self.factory().map_or(NO_NODES, |f| f.assemblers.as_slice())
    }

    pub fn overrides(&self) -> &[NodeRef] {
        self.factory().map_or(NO_NODES, |f| f.overrides.as_slice())
    }

    /// Direct dependencies that feed `construct`: required then optional.
    pub(crate) fn direct_deps(&self) -> impl Iterator<Item = &NodeRef> + '_ {
        self.requires().iter().chain(self.optional().iter())
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("name", &self.0.name);
        match &self.0.kind {
            NodeKind::Leaf => {
                s.field("kind", &"leaf");
            }
            NodeKind::Factory(spec) => {
                s.field("kind", &"factory")
                    .field("team", &spec.team.keys().collect::<Vec<_>>())
                    .field("lazy", &spec.lazy)
                    .field("mock", &spec.mock);
            }
        }
        s.finish()
    }
}

/// Anything that names a node.
pub trait AsNode {
    fn node_ref(&self) -> &NodeRef;
}

/// A node known to produce values of type `T`.
pub trait Typed<T>: AsNode {}

impl AsNode for NodeRef {
    fn node_ref(&self) -> &NodeRef {
        self
    }
}

impl<N: AsNode + ?Sized> AsNode for &N {
    fn node_ref(&self) -> &NodeRef {
        (**self).node_ref()
    }
}

impl<T, N: Typed<T> + ?Sized> Typed<T> for &N {}

/// A leaf node accepting externally supplied values of type `T`.
pub struct Leaf<T> {
    node: NodeRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Leaf<T> {
    pub(crate) fn from_ref(node: NodeRef) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &NodeName {
        self.node.name()
    }
}

impl<T> Clone for Leaf<T> {
    fn clone(&self) -> Self {
        Self::from_ref(self.node.clone())
    }
}

impl<T> fmt::Debug for Leaf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.node, f)
    }
}

impl<T> AsNode for Leaf<T> {
    fn node_ref(&self) -> &NodeRef {
        &self.node
    }
}

impl<T> Typed<T> for Leaf<T> {}

/// A factory node producing values of type `T`.
pub struct Factory<T> {
    node: NodeRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Factory<T> {
    pub(crate) fn from_ref(node: NodeRef) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &NodeName {
        self.node.name()
    }

    pub fn is_lazy(&self) -> bool {
        self.node.is_lazy()
    }

    pub fn team(&self) -> impl Iterator<Item = &NodeRef> + '_ {
        self.node.team()
    }
}

impl<T> Clone for Factory<T> {
    fn clone(&self) -> Self {
        Self::from_ref(self.node.clone())
    }
}

impl<T> fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.node, f)
    }
}

impl<T> AsNode for Factory<T> {
    fn node_ref(&self) -> &NodeRef {
        &self.node
    }
}

impl<T> Typed<T> for Factory<T> {}

type TypedConstruct<T> =
    Box<dyn Fn(&ValueMap<'_>, &Ctx<'_>) -> std::result::Result<T, BoxError> + Send + Sync>;
type TypedReady<T> =
    Box<dyn Fn(&T, &ValueMap<'_>) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Declaration of a factory node.
///
/// # Example
///
/// ```rust,ignore
/// let api = registry.declare("api")?.as_factory(
///     FactoryConfig::new(|values, _ctx| Ok(Api::new(values.get(&db)?)))
///         .requires(&db)
///         .lazy(true),
/// )?;
/// ```
pub struct FactoryConfig<T> {
    pub(crate) construct: TypedConstruct<T>,
    pub(crate) on_ready: Option<TypedReady<T>>,
    pub(crate) requires: NodeList,
    pub(crate) optional: NodeList,
    pub(crate) assemblers: NodeList,
    pub(crate) lazy: bool,
}

impl<T: Send + Sync + 'static> FactoryConfig<T> {
    /// Start a config from its construction function.
    pub fn new<F>(construct: F) -> Self
    where
        F: Fn(&ValueMap<'_>, &Ctx<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            construct: Box::new(construct),
            on_ready: None,
            requires: NodeList::new(),
            optional: NodeList::new(),
            assemblers: NodeList::new(),
            lazy: false,
        }
    }

    /// Add a required dependency.
    pub fn requires(mut self, node: impl AsNode) -> Self {
        self.requires.push(node.node_ref().clone());
        self
    }

    /// Add an optional dependency; it resolves to `None` when nothing supplies it.
    pub fn optional(mut self, node: impl AsNode) -> Self {
        self.optional.push(node.node_ref().clone());
        self
    }

    /// Make a factory available for on-demand assembly through `Ctx`.
    pub fn assembler(mut self, node: impl AsNode) -> Self {
        self.assemblers.push(node.node_ref().clone());
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Run a hook on the freshly built value before anyone observes it.
    pub fn on_ready<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T, &ValueMap<'_>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_ready = Some(Box::new(hook));
        self
    }

    /// Fold `construct` and `on_ready` into one type-erased function.
    pub(crate) fn erase(
        construct: TypedConstruct<T>,
        on_ready: Option<TypedReady<T>>,
    ) -> ConstructFn {
        Arc::new(move |values, ctx| {
            let value = construct(values, ctx)?;
            if let Some(hook) = &on_ready {
                hook(&value, values)?;
            }
            Ok(Arc::new(value) as Value)
        })
    }

    pub(crate) fn type_name() -> &'static str {
        type_name::<T>()
    }
}
