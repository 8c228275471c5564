//! Reconstruction request configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::device::Device;
use crate::error::{CtfError, Result};

/// Everything a reconstruction request fixes up front: which backend runs
/// the correction and the geometry the downstream back-projection needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: Device,
    /// Adapter index for `Device::Gpu`; negative selects the default adapter.
    pub gpu_index: i32,
    /// Detector pixels per projection row.
    pub num_pixels: usize,
    pub num_angles: usize,
    pub num_defocus: usize,
    pub grid_width: usize,
    pub grid_height: usize,
    pub pixel_size: f32,
    /// Rotation centre in pixels.
    pub centre: f32,
    /// Tilt angles in radians, one per projection.
    pub angles: Vec<f32>,
    /// Defocus per group, in Å.
    pub defocus: Vec<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Device::Host,
            gpu_index: -1,
            num_pixels: 0,
            num_angles: 0,
            num_defocus: 0,
            grid_width: 0,
            grid_height: 0,
            pixel_size: 1.0,
            centre: 0.0,
            angles: Vec::new(),
            defocus: Vec::new(),
        }
    }
}

impl Config {
    /// Check the counts agree with the metadata they describe.
    pub fn validate(&self) -> Result<()> {
        if self.num_pixels == 0 {
            return Err(CtfError::InvalidConfig("num_pixels must be > 0".into()));
        }
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(CtfError::InvalidConfig(format!(
                "grid must be non-empty, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.angles.len() != self.num_angles {
            return Err(CtfError::InvalidConfig(format!(
                "num_angles={} but {} angles given",
                self.num_angles,
                self.angles.len()
            )));
        }
        if self.defocus.len() != self.num_defocus {
            return Err(CtfError::InvalidConfig(format!(
                "num_defocus={} but {} defocus values given",
                self.num_defocus,
                self.defocus.len()
            )));
        }
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(CtfError::InvalidConfig(format!(
                "pixel_size must be positive, got {}",
                self.pixel_size
            )));
        }
        if !self.centre.is_finite() {
            return Err(CtfError::InvalidConfig("centre must be finite".into()));
        }
        Ok(())
    }

    /// The accelerator index as an adapter position, if one was requested.
    pub fn adapter_index(&self) -> Option<usize> {
        usize::try_from(self.gpu_index).ok()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config = Self::from_json_str_unchecked(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse without [`Config::validate`], for partial configs whose geometry
    /// is filled in later by [`Config::with_stack_geometry`].
    pub fn from_json_str_unchecked(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file_unchecked(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str_unchecked(&text)
    }

    /// Fill the geometry of a `(num_angles, _, num_pixels)` projection stack
    /// corrected for `defoci`, then validate.
    ///
    /// Angles already present are kept and must number `num_angles`; an
    /// empty angle list is filled with zeros.
    pub fn with_stack_geometry(
        mut self,
        num_angles: usize,
        num_pixels: usize,
        defoci: &[f64],
    ) -> Result<Self> {
        if self.angles.is_empty() {
            log::warn!("no tilt angles configured, using 0 for all {num_angles} projections");
            self.angles = vec![0.0; num_angles];
        } else if self.angles.len() != num_angles {
            return Err(CtfError::InvalidConfig(format!(
                "config lists {} angles but the stack has {} projections",
                self.angles.len(),
                num_angles
            )));
        }
        self.num_angles = num_angles;
        self.num_pixels = num_pixels;
        self.grid_width = num_pixels;
        self.grid_height = num_pixels;
        self.defocus = defoci.iter().map(|&d| d as f32).collect();
        self.num_defocus = self.defocus.len();
        self.validate()?;
        Ok(self)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
