//! Engine configuration (TOML)
//!
//! ```toml
//! tick_rate_hz = 60.0
//! preset = "visualizer"
//! geometries = ["tetrahedron", "hypercube"]
//!
//! [resolver]
//! seed = 7
//!
//! [[mappings]]
//! name = "gridDensity"
//! source = "bass"
//! min = 5.0
//! max = 40.0
//! curve = { kind = "exponential" }
//! ```

use crate::audio::{ExtractorConfig, SpectrumConfig};
use crate::choreography::GeometryCatalog;
use crate::envelope::EnvelopeConfig;
use crate::logging::LogConfig;
use crate::parameter_mapper::{CurveKind, FeatureSource, MappingPreset, ParameterMapper, ParameterMapping};
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Geometry resolver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Seed for random/explosive geometry picks
    pub seed: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { seed: 0x4859_5045 }
    }
}

fn default_max() -> f32 {
    1.0
}

/// A mapping as written in the config file
///
/// `source` stays a string here so one bad entry does not fail the whole
/// file; it is parsed in [`MappingEntry::to_mapping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Target parameter name
    pub name: String,
    /// Feature name (band, spectral feature)
    pub source: String,
    /// Curve
    #[serde(default)]
    pub curve: CurveKind,
    /// Output minimum
    #[serde(default)]
    pub min: f32,
    /// Output maximum
    #[serde(default = "default_max")]
    pub max: f32,
    /// Gate threshold
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Smoothing factor
    #[serde(default)]
    pub smoothing: Option<f32>,
    /// Envelope
    #[serde(default)]
    pub envelope: Option<EnvelopeConfig>,
}

impl MappingEntry {
    /// Parse the source and validate
    pub fn to_mapping(&self) -> Result<ParameterMapping> {
        let source: FeatureSource =
            self.source
                .parse()
                .map_err(|_| CoreError::InvalidMapping {
                    name: self.name.clone(),
                    reason: format!("unknown feature source '{}'", self.source),
                })?;
        let mapping = ParameterMapping {
            name: self.name.clone(),
            source,
            curve: self.curve,
            min: self.min,
            max: self.max,
            threshold: self.threshold,
            smoothing: self.smoothing,
            envelope: self.envelope,
        };
        mapping.validate()?;
        Ok(mapping)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal scheduler rate
    pub tick_rate_hz: f64,
    /// Built-in mapping set loaded before `mappings`
    pub preset: Option<MappingPreset>,
    /// Extra mappings; entries with the same name replace preset ones
    pub mappings: Vec<MappingEntry>,
    /// Feature extraction
    pub extractor: ExtractorConfig,
    /// PCM analysis for hosts feeding raw samples
    pub spectrum: SpectrumConfig,
    /// Geometry resolver
    pub resolver: ResolverConfig,
    /// Geometry catalog; empty means the built-in visualizer set
    pub geometries: Vec<String>,
    /// Logging
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            preset: Some(MappingPreset::Visualizer),
            mappings: Vec::new(),
            extractor: ExtractorConfig::default(),
            spectrum: SpectrumConfig::default(),
            resolver: ResolverConfig::default(),
            geometries: Vec::new(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        debug!(
            "Loaded engine config: {} Hz, preset {:?}, {} mapping entries",
            config.tick_rate_hz,
            config.preset,
            config.mappings.len()
        );
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Seconds per tick (1/60 when the rate is unusable)
    pub fn tick_interval(&self) -> f64 {
        if self.tick_rate_hz.is_finite() && self.tick_rate_hz > 0.0 {
            1.0 / self.tick_rate_hz
        } else {
            1.0 / 60.0
        }
    }

    /// Catalog from `geometries`, or the built-in set
    pub fn catalog(&self) -> GeometryCatalog {
        if self.geometries.is_empty() {
            GeometryCatalog::visualizer_defaults()
        } else {
            GeometryCatalog::new(self.geometries.iter().cloned())
        }
    }

    /// Mapper with the preset and every valid entry; invalid entries are skipped
    pub fn build_mapper(&self) -> ParameterMapper {
        let mut mapper = match self.preset {
            Some(preset) => ParameterMapper::with_preset(preset),
            None => ParameterMapper::new(),
        };
        for entry in &self.mappings {
            match entry.to_mapping().and_then(|mapping| mapper.register(mapping)) {
                Ok(()) => {}
                Err(e) => warn!("Skipping mapping entry '{}': {}", entry.name, e),
            }
        }
        mapper
    }
}
