use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::alloc::DEFAULT_POOL_LIMIT;

/// Runtime limits applied to a [`Vm`](super::Vm).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Maximum nesting of interpreted calls.
    pub max_call_depth: usize,
    /// Stack capacity reserved when the VM is created.
    pub initial_stack_capacity: usize,
    /// Frame buffers kept for reuse per thread.
    pub frame_pool_limit: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            initial_stack_capacity: 256,
            frame_pool_limit: DEFAULT_POOL_LIMIT,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid VM configuration")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("in {}", path.display()))
    }
}
