//! Serializable view of a supply tree, for logging and debugging.

use serde::Serialize;

use super::supply::AnySupply;
use crate::graph::NodeKind;

/// Construction state of a supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyState {
    /// Not built yet.
    Pending,
    Ready,
    /// Built and failed; the error is cached.
    Failed,
    /// Supplied as "no value".
    Absent,
}

/// One row of [`AnySupply::snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct SupplySnapshot {
    pub name: String,
    pub kind: &'static str,
    /// `"packed"` for supplied values, `"built"` for factory output.
    pub origin: &'static str,
    pub state: SupplyState,
    pub lazy: bool,
    pub resolved: Vec<String>,
}

impl SupplySnapshot {
    pub(crate) fn of(supply: &AnySupply) -> Self {
        let node = supply.node();
        Self {
            name: supply.name().to_string(),
            kind: match node.kind() {
                NodeKind::Leaf => "leaf",
                NodeKind::Factory(_) => "factory",
            },
            origin: if supply.is_packed() { "packed" } else { "built" },
            state: supply.state(),
            lazy: node.is_lazy(),
            resolved: supply
                .resolved_map()
                .keys()
                .map(ToString::to_string)
                .collect(),
        }
    }
}
