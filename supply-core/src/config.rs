//! Assembly configuration.
//!
//! The only knob is how eager members are pre-built. Configs are plain
//! data and can be loaded from JSON:
//!
//! ```json
//! { "prefetch": "inline" }
//! ```

use serde::{Deserialize, Serialize};

/// How non-lazy team members are built ahead of first access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prefetch {
    /// Build on a tokio blocking thread when a runtime is available,
    /// otherwise on the shared prefetch thread. Never blocks `assemble`.
    #[default]
    Background,

    /// Build before `assemble` returns. Failures are still deferred.
    Inline,

    /// Build only on first access.
    Off,
}

/// Options for a single assembly and every re-assembly derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub prefetch: Prefetch,
}

impl AssemblyConfig {
    /// Construction strictly on demand.
    pub fn no_prefetch() -> Self {
        Self::default().with_prefetch(Prefetch::Off)
    }

    /// Eager members built synchronously during `assemble`.
    pub fn inline() -> Self {
        Self::default().with_prefetch(Prefetch::Inline)
    }

    pub fn with_prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
