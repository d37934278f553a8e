//! Configuration for the wgpu backend.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{BackendError, BackendResult};

/// Default workgroup size; its product fits the WebGPU minimum of 256
/// invocations per workgroup.
pub const DEFAULT_WORKGROUP_SIZE: [u32; 3] = [8, 8, 1];

/// Which adapter to prefer when several are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
    None,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(value: PowerPreference) -> Self {
        match value {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::None => wgpu::PowerPreference::None,
        }
    }
}

/// Settings for adapter selection and kernel dispatch.
///
/// Can be built with the `with_*` methods or loaded from JSON:
///
/// ```json
/// { "power_preference": "low_power", "workgroup_size": [64, 1, 1] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub power_preference: PowerPreference,
    pub force_fallback_adapter: bool,
    /// Must match the `@workgroup_size` the kernel declares.
    pub workgroup_size: [u32; 3],
    pub entry_point: String,
    pub label: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::default(),
            force_fallback_adapter: false,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            entry_point: "main".to_string(),
            label: "gpumat".to_string(),
        }
    }
}

impl GpuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_power_preference(mut self, power_preference: PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }

    pub fn with_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }

    pub fn with_workgroup_size(mut self, x: u32, y: u32, z: u32) -> Self {
        self.workgroup_size = [x, y, z];
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn from_json_str(json: &str) -> BackendResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BackendError::InvalidConfig {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| BackendError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> BackendResult<()> {
        if self.workgroup_size.contains(&0) {
            return Err(BackendError::InvalidConfig {
                message: format!("workgroup size {:?} has a zero axis", self.workgroup_size),
            });
        }
        if self.entry_point.trim().is_empty() {
            return Err(BackendError::InvalidConfig {
                message: "entry point must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Invocations per workgroup.
    pub fn invocations_per_workgroup(&self) -> u64 {
        self.workgroup_size.iter().map(|&n| n as u64).product()
    }
}
