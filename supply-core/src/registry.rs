//! Node Registry
//!
//! A registry is the namespace nodes are declared in. It guarantees that
//! each name is declared once and hands out the two declaration forms.
//!
//! The name set is append-only: there is no way to unregister a node, and a
//! name stays reserved even if its declaration is later rejected.

use dashmap::DashSet;

use crate::error::{Result, SupplyError};
use crate::graph::{
    team, FactoryConfig, FactorySpec, Factory, Leaf, NodeDef, NodeKind, NodeName, NodeRef,
};

/// Namespace of uniquely named nodes.
#[derive(Debug, Default)]
pub struct Registry {
    names: DashSet<NodeName>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` and return a builder for its node.
    pub fn declare(&self, name: &str) -> Result<Declaration<'_>> {
        if !NodeName::is_valid(name) {
            return Err(SupplyError::InvalidName(name.to_string()));
        }
        let name = NodeName::from(name);
        if !self.names.insert(name.clone()) {
            return Err(SupplyError::DuplicateName(name));
        }
        tracing::trace!(node = %name, "name reserved");
        Ok(Declaration {
            _registry: self,
            name,
        })
    }

    /// Check whether `name` has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of declared names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All declared names, in no particular order.
    pub fn names(&self) -> Vec<NodeName> {
        self.names.iter().map(|name| name.key().clone()).collect()
    }
}

/// A reserved name waiting for its node definition.
#[must_use = "a declaration does nothing until it is turned into a node"]
pub struct Declaration<'r> {
    _registry: &'r Registry,
    name: NodeName,
}

impl Declaration<'_> {
    pub fn name(&self) -> &NodeName {
        &self.name
    }

    /// Declare a leaf accepting values of type `T`.
    pub fn as_leaf<T: Send + Sync + 'static>(self) -> Leaf<T> {
        tracing::debug!(node = %self.name, "leaf declared");
        Leaf::from_ref(NodeRef::new(NodeDef {
            name: self.name,
            kind: NodeKind::Leaf,
            type_name: std::any::type_name::<T>(),
        }))
    }

    /// Declare a factory.
    ///
    /// Fails if the dependency closure reaches back to this name, or if a
    /// mock is used as a direct dependency.
    pub fn as_factory<T: Send + Sync + 'static>(self, config: FactoryConfig<T>) -> Result<Factory<T>> {
        define_factory(self.name, config, false).map(Factory::from_ref)
    }
}

/// Build a factory node under `name`. Shared by declarations and mocks.
pub(crate) fn define_factory<T: Send + Sync + 'static>(
    name: NodeName,
    config: FactoryConfig<T>,
    mock: bool,
) -> Result<NodeRef> {
    let FactoryConfig {
        construct,
        on_ready,
        requires,
        optional,
        assemblers,
        lazy,
    } = config;

    for dep in requires.iter().chain(&optional).chain(&assemblers) {
        if dep.is_mock() {
            return Err(SupplyError::MockAsDependency {
                mock: dep.name().clone(),
                dependent: name,
            });
        }
    }

    let wide = team::wide_closure(&name, requires.iter().chain(&optional).chain(&assemblers))?;
    let team = team::build_team(&name, &requires)?;

    tracing::debug!(
        node = %name,
        team = team.len(),
        lazy,
        mock,
        "factory declared"
    );

    Ok(NodeRef::new(NodeDef {
        name,
        type_name: FactoryConfig::<T>::type_name(),
        kind: NodeKind::Factory(FactorySpec {
            requires,
            optional,
            assemblers,
            overrides: Default::default(),
            lazy,
            mock,
            construct: FactoryConfig::erase(construct, on_ready),
            team,
            wide,
            base: None,
        }),
    }))
}
