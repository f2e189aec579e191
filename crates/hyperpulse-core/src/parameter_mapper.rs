//! Parameter Mapper - feature frame to named parameter values
//!
//! Each [`ParameterMapping`] turns one feature into one output parameter:
//! threshold gate, curve, optional ADSR envelope, range scaling and
//! exponential smoothing, in that order.

use crate::audio::features::normalize_key;
use crate::audio::{FeatureFrame, FrequencyBand};
use crate::envelope::{EnvelopeConfig, EnvelopeGenerator};
use crate::{clamp01, CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};

/// Scalar descriptors of the frame other than the bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralFeature {
    /// Spectral centroid
    Centroid,
    /// Spectral rolloff
    Rolloff,
    /// Spectral flux
    Flux,
    /// RMS level
    Rms,
    /// Onset strength (0 without an onset)
    OnsetStrength,
    /// 1.0 on onset ticks, 0.0 otherwise
    Onset,
    /// Mean band level
    Energy,
    /// Tempo normalized over 60-200 BPM
    Tempo,
}

impl SpectralFeature {
    const ALL: [SpectralFeature; 8] = [
        SpectralFeature::Centroid,
        SpectralFeature::Rolloff,
        SpectralFeature::Flux,
        SpectralFeature::Rms,
        SpectralFeature::OnsetStrength,
        SpectralFeature::Onset,
        SpectralFeature::Energy,
        SpectralFeature::Tempo,
    ];

    /// Canonical snake_case name
    pub fn name(self) -> &'static str {
        match self {
            SpectralFeature::Centroid => "centroid",
            SpectralFeature::Rolloff => "rolloff",
            SpectralFeature::Flux => "flux",
            SpectralFeature::Rms => "rms",
            SpectralFeature::OnsetStrength => "onset_strength",
            SpectralFeature::Onset => "onset",
            SpectralFeature::Energy => "energy",
            SpectralFeature::Tempo => "tempo",
        }
    }

    /// Read the feature from a frame
    pub fn read(self, frame: &FeatureFrame) -> f32 {
        match self {
            SpectralFeature::Centroid => frame.spectral_centroid,
            SpectralFeature::Rolloff => frame.spectral_rolloff,
            SpectralFeature::Flux => frame.spectral_flux,
            SpectralFeature::Rms => frame.rms,
            SpectralFeature::OnsetStrength => frame.onset_strength,
            SpectralFeature::Onset => {
                if frame.onset {
                    1.0
                } else {
                    0.0
                }
            }
            SpectralFeature::Energy => frame.energy(),
            SpectralFeature::Tempo => (frame.bpm - 60.0) / 140.0,
        }
    }
}

/// Caller-supplied function of the frame
#[derive(Clone)]
pub struct DerivedFeature {
    label: String,
    func: Arc<dyn Fn(&FeatureFrame) -> f32 + Send + Sync>,
}

impl DerivedFeature {
    /// Wrap a closure under a label used in logs and `Display`
    pub fn new(
        label: impl Into<String>,
        func: impl Fn(&FeatureFrame) -> f32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// Label of this feature
    pub fn label(&self) -> &str {
        &self.label
    }

    fn eval(&self, frame: &FeatureFrame) -> f32 {
        (self.func)(frame)
    }
}

impl fmt::Debug for DerivedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedFeature")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl PartialEq for DerivedFeature {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// Where a mapping reads its input from
///
/// Serialized as a plain feature name ("bass", "centroid", "energy", ...).
/// Derived sources wrap a host closure and refuse to serialize.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub enum FeatureSource {
    /// One frequency band
    Band(FrequencyBand),
    /// A spectral descriptor
    Spectral(SpectralFeature),
    /// A host function of the frame
    Derived(DerivedFeature),
}

impl FeatureSource {
    /// Raw value for this tick; non-finite results read as 0
    pub fn resolve(&self, frame: &FeatureFrame) -> f32 {
        let value = match self {
            FeatureSource::Band(band) => frame.band(*band),
            FeatureSource::Spectral(feature) => feature.read(frame),
            FeatureSource::Derived(derived) => derived.eval(frame),
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    /// Derived source from a closure
    pub fn derived(
        label: impl Into<String>,
        func: impl Fn(&FeatureFrame) -> f32 + Send + Sync + 'static,
    ) -> Self {
        FeatureSource::Derived(DerivedFeature::new(label, func))
    }
}

impl FromStr for FeatureSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(band) = FrequencyBand::from_name(s) {
            return Ok(FeatureSource::Band(band));
        }
        let key = normalize_key(s);
        SpectralFeature::ALL
            .into_iter()
            .find(|feature| normalize_key(feature.name()) == key)
            .map(FeatureSource::Spectral)
            .ok_or_else(|| CoreError::InvalidMapping {
                name: s.to_string(),
                reason: "unknown feature source".to_string(),
            })
    }
}

impl TryFrom<String> for FeatureSource {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl Serialize for FeatureSource {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            FeatureSource::Band(band) => serializer.serialize_str(band.name()),
            FeatureSource::Spectral(feature) => serializer.serialize_str(feature.name()),
            FeatureSource::Derived(derived) => Err(serde::ser::Error::custom(format!(
                "derived feature '{}' cannot be serialized",
                derived.label
            ))),
        }
    }
}

impl fmt::Display for FeatureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSource::Band(band) => f.write_str(band.name()),
            FeatureSource::Spectral(feature) => f.write_str(feature.name()),
            FeatureSource::Derived(derived) => write!(f, "derived:{}", derived.label),
        }
    }
}

impl From<FrequencyBand> for FeatureSource {
    fn from(band: FrequencyBand) -> Self {
        FeatureSource::Band(band)
    }
}

impl From<SpectralFeature> for FeatureSource {
    fn from(feature: SpectralFeature) -> Self {
        FeatureSource::Spectral(feature)
    }
}

/// Nonlinear transform applied to a normalized input
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurveKind {
    /// Identity
    #[default]
    Linear,
    /// x²
    Exponential,
    /// log10(1 + 9x)
    Logarithmic,
    /// Logistic centered at 0.5, rescaled so 0 -> 0 and 1 -> 1
    SCurve,
    /// 1 at or above the mapping threshold (default 0.5), else 0
    Threshold,
    /// x^exponent
    Power {
        /// Exponent applied to the input
        exponent: f32,
    },
}

impl CurveKind {
    const S_CURVE_STEEPNESS: f32 = 10.0;
    const DEFAULT_CUTOFF: f32 = 0.5;

    /// Apply the curve to `x` (clamped to [0, 1] first)
    pub fn apply(self, x: f32, cutoff: Option<f32>) -> f32 {
        let x = clamp01(x);
        let y = match self {
            CurveKind::Linear => x,
            CurveKind::Exponential => x * x,
            CurveKind::Logarithmic => (1.0 + 9.0 * x).log10(),
            CurveKind::SCurve => {
                let logistic = |v: f32| 1.0 / (1.0 + (-Self::S_CURVE_STEEPNESS * (v - 0.5)).exp());
                let low = logistic(0.0);
                let high = logistic(1.0);
                (logistic(x) - low) / (high - low)
            }
            CurveKind::Threshold => {
                if x >= cutoff.unwrap_or(Self::DEFAULT_CUTOFF) {
                    1.0
                } else {
                    0.0
                }
            }
            CurveKind::Power { exponent } => {
                if exponent.is_finite() && exponent > 0.0 {
                    x.powf(exponent)
                } else {
                    x
                }
            }
        };
        clamp01(y)
    }
}

/// One feature-to-parameter mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Target parameter name
    pub name: String,
    /// Input feature
    pub source: FeatureSource,
    /// Curve applied after gating
    #[serde(default)]
    pub curve: CurveKind,
    /// Output at curve value 0
    pub min: f32,
    /// Output at curve value 1
    pub max: f32,
    /// Inputs below this read as 0 (threshold curve: cut-off)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    /// Exponential smoothing factor against the previous output, in [0, 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f32>,
    /// Envelope shaping the curved value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeConfig>,
}

impl ParameterMapping {
    /// Linear mapping of `source` onto [0, 1]
    pub fn new(name: impl Into<String>, source: impl Into<FeatureSource>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            curve: CurveKind::Linear,
            min: 0.0,
            max: 1.0,
            threshold: None,
            smoothing: None,
            envelope: None,
        }
    }

    /// Set the curve
    pub fn with_curve(mut self, curve: CurveKind) -> Self {
        self.curve = curve;
        self
    }

    /// Set the output range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the gate threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Set the smoothing factor
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = Some(smoothing);
        self
    }

    /// Attach an envelope
    pub fn with_envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.envelope = Some(envelope);
        self
    }

    /// Check the mapping can be registered
    pub fn validate(&self) -> Result<()> {
        let reject = |reason: &str| {
            Err(CoreError::InvalidMapping {
                name: self.name.clone(),
                reason: reason.to_string(),
            })
        };

        if self.name.trim().is_empty() {
            return reject("name is empty");
        }
        if !(self.max - self.min).is_finite() {
            return reject("range is not finite");
        }
        if let Some(threshold) = self.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return reject("threshold must lie in [0, 1]");
            }
        }
        if let Some(smoothing) = self.smoothing {
            if !(0.0..1.0).contains(&smoothing) {
                return reject("smoothing must lie in [0, 1)");
            }
        }
        if let CurveKind::Power { exponent } = self.curve {
            if !exponent.is_finite() || exponent <= 0.0 {
                return reject("power exponent must be positive");
            }
        }
        if let Some(envelope) = &self.envelope {
            if !(0.0..=1.0).contains(&envelope.sustain_level) {
                return reject("envelope sustain must lie in [0, 1]");
            }
            if envelope.attack_ms < 0.0 || envelope.decay_ms < 0.0 || envelope.release_ms < 0.0 {
                return reject("envelope durations must not be negative");
            }
        }
        Ok(())
    }

    /// Scale a [0, 1] value into the output range
    pub fn scale(&self, value: f32) -> f32 {
        self.min + clamp01(value) * (self.max - self.min)
    }

    /// Gate and curve the raw input
    fn shape(&self, raw: f32) -> f32 {
        match self.curve {
            CurveKind::Threshold => self.curve.apply(raw, self.threshold),
            curve => {
                let gated = match self.threshold {
                    Some(threshold) if raw < threshold => 0.0,
                    _ => raw,
                };
                curve.apply(gated, None)
            }
        }
    }
}

/// Per-mapping runtime state
#[derive(Debug, Clone, Default, PartialEq)]
struct MappingState {
    envelope: Option<EnvelopeGenerator>,
    /// Input currently above the envelope trigger level
    gate_open: bool,
    last_output: Option<f32>,
}

impl MappingState {
    fn for_mapping(mapping: &ParameterMapping) -> Self {
        Self {
            envelope: mapping.envelope.map(EnvelopeGenerator::new),
            gate_open: false,
            last_output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MappingSlot {
    mapping: ParameterMapping,
    state: MappingState,
}

/// Registry of mappings evaluated together every tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMapper {
    slots: BTreeMap<String, MappingSlot>,
}

impl ParameterMapper {
    /// Create an empty mapper
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mapper loaded with a preset
    pub fn with_preset(preset: MappingPreset) -> Self {
        let mut mapper = Self::new();
        for mapping in preset.mappings() {
            if let Err(e) = mapper.register(mapping) {
                tracing::warn!("Skipping preset mapping: {}", e);
            }
        }
        mapper
    }

    /// Add or replace a mapping; replacement resets its runtime state
    pub fn register(&mut self, mapping: ParameterMapping) -> Result<()> {
        mapping.validate()?;
        let state = MappingState::for_mapping(&mapping);
        debug!(
            "Registered mapping {} <- {} ({:?}, [{}, {}])",
            mapping.name, mapping.source, mapping.curve, mapping.min, mapping.max
        );
        self.slots
            .insert(mapping.name.clone(), MappingSlot { mapping, state });
        Ok(())
    }

    /// Remove a mapping
    pub fn unregister(&mut self, name: &str) -> Option<ParameterMapping> {
        self.slots.remove(name).map(|slot| slot.mapping)
    }

    /// Get a mapping by target name
    pub fn get(&self, name: &str) -> Option<&ParameterMapping> {
        self.slots.get(name).map(|slot| &slot.mapping)
    }

    /// Iterate mappings in name order
    pub fn mappings(&self) -> impl Iterator<Item = &ParameterMapping> {
        self.slots.values().map(|slot| &slot.mapping)
    }

    /// Number of registered mappings
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no mappings are registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Envelope phase of a mapping, if it has one
    pub fn envelope_phase(&self, name: &str) -> Option<crate::envelope::EnvelopePhase> {
        self.slots
            .get(name)
            .and_then(|slot| slot.state.envelope.as_ref())
            .map(EnvelopeGenerator::phase)
    }

    /// Clear envelopes and smoothing history
    pub fn reset_state(&mut self) {
        for slot in self.slots.values_mut() {
            slot.state = MappingState::for_mapping(&slot.mapping);
        }
    }

    /// Evaluate every mapping against a frame
    pub fn map(&mut self, frame: &FeatureFrame, now: f64) -> HashMap<String, f32> {
        let mut values = HashMap::with_capacity(self.slots.len());

        for (name, slot) in &mut self.slots {
            let mapping = &slot.mapping;
            let state = &mut slot.state;

            let raw = mapping.source.resolve(frame);
            let mut value = mapping.shape(raw);

            if let Some(envelope) = state.envelope.as_mut() {
                let config = *envelope.config();
                if !state.gate_open && value >= config.trigger_threshold {
                    envelope.trigger(value, now);
                    state.gate_open = true;
                } else if state.gate_open && value < config.release_threshold {
                    envelope.release_phase(now);
                    state.gate_open = false;
                }
                value = envelope.update(now);
            }

            let scaled = mapping.scale(value);
            let output = match (mapping.smoothing, state.last_output) {
                (Some(k), Some(previous)) => previous * k + scaled * (1.0 - k),
                _ => scaled,
            };
            state.last_output = Some(output);

            trace!("map {}: raw={:.3} -> {:.3}", name, raw, output);
            values.insert(name.clone(), output);
        }

        values
    }
}

/// Built-in mapping sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPreset {
    /// Balanced 4D rotation, density and colour response
    Visualizer,
    /// Onset-driven envelopes for drum-heavy material
    Percussive,
}

impl MappingPreset {
    /// Mappings making up the preset
    pub fn mappings(self) -> Vec<ParameterMapping> {
        match self {
            MappingPreset::Visualizer => vec![
                ParameterMapping::new("chaos", SpectralFeature::Energy)
                    .with_range(0.0, 0.4)
                    .with_smoothing(0.7),
                ParameterMapping::new("speed", SpectralFeature::Rms)
                    .with_curve(CurveKind::Logarithmic)
                    .with_range(0.0, 1.0)
                    .with_smoothing(0.8),
                ParameterMapping::new("rot4dXW", FrequencyBand::Bass)
                    .with_curve(CurveKind::Exponential)
                    .with_range(0.0, 1.2)
                    .with_smoothing(0.6),
                ParameterMapping::new("rot4dYW", FrequencyBand::Mid)
                    .with_curve(CurveKind::SCurve)
                    .with_range(0.0, 0.9)
                    .with_smoothing(0.6),
                ParameterMapping::new("rot4dZW", FrequencyBand::HighMid)
                    .with_curve(CurveKind::Power { exponent: 1.5 })
                    .with_range(0.0, 0.8)
                    .with_smoothing(0.6),
                ParameterMapping::new("gridDensity", FrequencyBand::SubBass)
                    .with_threshold(0.1)
                    .with_range(0.0, 25.0)
                    .with_envelope(EnvelopeConfig {
                        attack_ms: 30.0,
                        decay_ms: 120.0,
                        sustain_level: 0.6,
                        release_ms: 250.0,
                        trigger_threshold: 0.3,
                        release_threshold: 0.15,
                    }),
                ParameterMapping::new("hue", SpectralFeature::Centroid)
                    .with_range(0.0, 90.0)
                    .with_smoothing(0.9),
                ParameterMapping::new("morphFactor", SpectralFeature::Rolloff)
                    .with_curve(CurveKind::SCurve)
                    .with_range(0.0, 1.0)
                    .with_smoothing(0.85),
            ],
            MappingPreset::Percussive => vec![
                ParameterMapping::new("chaos", SpectralFeature::Energy)
                    .with_curve(CurveKind::Exponential)
                    .with_range(0.0, 0.6)
                    .with_smoothing(0.5),
                ParameterMapping::new("intensity", SpectralFeature::OnsetStrength)
                    .with_curve(CurveKind::Threshold)
                    .with_threshold(0.3)
                    .with_range(0.0, 0.5)
                    .with_envelope(EnvelopeConfig::percussive()),
                ParameterMapping::new("rot4dXW", FrequencyBand::SubBass)
                    .with_curve(CurveKind::Exponential)
                    .with_range(0.0, 1.5)
                    .with_envelope(EnvelopeConfig::percussive()),
                ParameterMapping::new("speed", SpectralFeature::Flux)
                    .with_curve(CurveKind::Logarithmic)
                    .with_range(0.0, 1.5)
                    .with_smoothing(0.9),
            ],
        }
    }
}
