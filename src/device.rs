use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CtfError;

/// Execution backend tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    /// General-purpose processor memory, rustfft transforms.
    #[default]
    #[serde(rename = "cpu", alias = "host")]
    Host,
    /// Accelerator-resident memory, wgpu compute transforms.
    #[serde(rename = "gpu", alias = "device")]
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Host => "cpu",
            Device::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = CtfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "host" => Ok(Device::Host),
            "gpu" | "device" => Ok(Device::Gpu),
            other => Err(CtfError::InvalidConfig(format!(
                "\"{other}\" is not a valid value for Device (expected \"cpu\" or \"gpu\")"
            ))),
        }
    }
}

impl TryFrom<i32> for Device {
    type Error = CtfError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Device::Host),
            1 => Ok(Device::Gpu),
            other => Err(CtfError::InvalidConfig(format!(
                "{other} is not a valid value for Device (expected 0 or 1)"
            ))),
        }
    }
}
