//! Sequences - time-bounded blocks of scripted base values
//!
//! Exchanged as JSON records:
//! `{ time, duration, effects: { system?, geometry?, rotation?, chaos?, speed?,
//! colorShift?, parameters?, actions? } }`

use super::geometry::GeometryDirective;
use crate::audio::FeatureFrame;
use crate::parameter_mapper::FeatureSource;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A parameter value handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Numeric parameter
    Number(f32),
    /// Enum-like string parameter
    Text(String),
}

impl ParameterValue {
    /// Numeric value, if this is a number
    pub fn as_number(&self) -> Option<f32> {
        match self {
            ParameterValue::Number(v) => Some(*v),
            ParameterValue::Text(_) => None,
        }
    }

    /// String value, if this is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(s) => Some(s),
            ParameterValue::Number(_) => None,
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        ParameterValue::Number(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

/// How the 4D rotation behaves during a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    /// Moderate rotation
    Auto,
    /// Nearly still
    Minimal,
    /// Fast steady spin
    Spin,
    /// Fast and erratic
    Chaos,
}

impl RotationMode {
    /// Mode name as exchanged
    pub fn name(self) -> &'static str {
        match self {
            RotationMode::Auto => "auto",
            RotationMode::Minimal => "minimal",
            RotationMode::Spin => "spin",
            RotationMode::Chaos => "chaos",
        }
    }

    /// Scripted rotation speed floor
    pub fn base_rotation_speed(self) -> f32 {
        match self {
            RotationMode::Minimal => 0.1,
            RotationMode::Auto => 0.5,
            RotationMode::Spin => 1.0,
            RotationMode::Chaos => 1.5,
        }
    }
}

/// How the palette drifts during a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorShiftMode {
    /// Slow drift
    Auto,
    /// No scripted drift
    Freeze,
    /// Continuous hue rotation
    Cycle,
    /// Drift in bursts
    Pulse,
}

impl ColorShiftMode {
    /// Mode name as exchanged
    pub fn name(self) -> &'static str {
        match self {
            ColorShiftMode::Auto => "auto",
            ColorShiftMode::Freeze => "freeze",
            ColorShiftMode::Cycle => "cycle",
            ColorShiftMode::Pulse => "pulse",
        }
    }

    /// Scripted hue shift rate floor
    pub fn base_hue_rate(self) -> f32 {
        match self {
            ColorShiftMode::Freeze => 0.0,
            ColorShiftMode::Auto => 0.2,
            ColorShiftMode::Pulse => 0.5,
            ColorShiftMode::Cycle => 1.0,
        }
    }
}

/// How an audio-linked descriptor combines the feature with its base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioLinkMode {
    /// base + feature * scale
    #[default]
    Add,
    /// base * feature * scale
    Multiply,
    /// feature * scale
    Replace,
}

/// Inputs available to dynamic descriptors
#[derive(Debug, Clone, Copy)]
pub struct ExpressionInput<'a> {
    /// Seconds since the sequence started
    pub elapsed: f64,
    /// Sequence progress (0.0 - 1.0)
    pub progress: f32,
    /// Current audio features
    pub frame: &'a FeatureFrame,
}

type ExpressionCallback = dyn Fn(&ExpressionInput<'_>) -> f32 + Send + Sync;

/// Host closure evaluated every tick
#[derive(Clone)]
pub struct ExpressionFn(Arc<ExpressionCallback>);

impl ExpressionFn {
    /// Wrap a closure
    pub fn new(func: impl Fn(&ExpressionInput<'_>) -> f32 + Send + Sync + 'static) -> Self {
        Self(Arc::new(func))
    }

    /// Evaluate, mapping non-finite results to 0
    pub fn eval(&self, input: &ExpressionInput<'_>) -> f32 {
        let value = (self.0)(input);
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }
}

impl fmt::Debug for ExpressionFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExpressionFn(..)")
    }
}

impl PartialEq for ExpressionFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn default_scale() -> f32 {
    1.0
}

/// Per-parameter dynamic value inside a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDescriptor {
    /// Fixed number
    Literal(f32),
    /// Fixed enum-string value
    NamedLookup(String),
    /// Follows an audio feature
    AudioLinked {
        /// Feature the value follows
        axis: FeatureSource,
        /// Multiplier on the feature
        #[serde(default = "default_scale")]
        scale: f32,
        /// Combination with `base`
        #[serde(default)]
        mode: AudioLinkMode,
        /// Value the feature is combined with
        #[serde(default)]
        base: f32,
    },
    /// Sine oscillation over sequence time
    Wave {
        /// Cycles per second
        speed: f32,
        /// Peak deviation from `offset`
        amplitude: f32,
        /// Phase in radians
        #[serde(default)]
        phase: f32,
        /// Center value
        #[serde(default)]
        offset: f32,
    },
    /// Host closure (not serializable)
    #[serde(skip)]
    Expression(ExpressionFn),
}

impl ParameterDescriptor {
    /// Resolve for the current tick
    pub fn resolve(&self, input: &ExpressionInput<'_>) -> ParameterValue {
        match self {
            ParameterDescriptor::Literal(value) => ParameterValue::Number(*value),
            ParameterDescriptor::NamedLookup(name) => ParameterValue::Text(name.clone()),
            ParameterDescriptor::AudioLinked {
                axis,
                scale,
                mode,
                base,
            } => {
                let feature = axis.resolve(input.frame) * scale;
                let value = match mode {
                    AudioLinkMode::Add => base + feature,
                    AudioLinkMode::Multiply => base * feature,
                    AudioLinkMode::Replace => feature,
                };
                ParameterValue::Number(finite_or_zero(value))
            }
            ParameterDescriptor::Wave {
                speed,
                amplitude,
                phase,
                offset,
            } => {
                let angle =
                    std::f64::consts::TAU * *speed as f64 * input.elapsed + *phase as f64;
                let value = offset + amplitude * angle.sin() as f32;
                ParameterValue::Number(finite_or_zero(value))
            }
            ParameterDescriptor::Expression(func) => ParameterValue::Number(func.eval(input)),
        }
    }
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Action forwarded verbatim to the host while its sequence is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceAction {
    /// Action type understood by the host
    #[serde(rename = "type")]
    pub action_type: String,
    /// Free-form arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

impl SequenceAction {
    /// Create an action without arguments
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            args: None,
        }
    }

    /// Attach arguments
    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = Some(args);
        self
    }
}

/// Scripted base values of a sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceEffects {
    /// Visualization system name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Geometry selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryDirective>,
    /// Rotation behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationMode>,
    /// Base chaos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos: Option<f32>,
    /// Base speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    /// Palette behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_shift: Option<ColorShiftMode>,
    /// Dynamic per-parameter values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterDescriptor>,
    /// Host actions fired when the sequence becomes active
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<SequenceAction>,
}

/// A time-bounded block of the choreography
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Start time in seconds
    pub time: f64,
    /// Length in seconds
    pub duration: f64,
    /// Scripted values
    #[serde(default)]
    pub effects: SequenceEffects,
}

impl Sequence {
    /// Create a sequence without effects
    pub fn new(time: f64, duration: f64) -> Self {
        Self {
            time,
            duration,
            effects: SequenceEffects::default(),
        }
    }

    /// Set the effects
    pub fn with_effects(mut self, effects: SequenceEffects) -> Self {
        self.effects = effects;
        self
    }

    /// End time (exclusive)
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    /// Whether `time` lies in `[start, start + duration)`
    pub fn contains(&self, time: f64) -> bool {
        time >= self.time && time < self.end()
    }

    /// Whether the two intervals share any time
    pub fn overlaps(&self, other: &Sequence) -> bool {
        self.duration > 0.0
            && other.duration > 0.0
            && self.time < other.end()
            && other.time < self.end()
    }

    /// Progress through the sequence at `time` (0 for zero-length sequences)
    pub fn progress(&self, time: f64) -> f32 {
        if self.duration > 0.0 {
            ((time - self.time) / self.duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }

    /// Check timing fields
    pub fn validate(&self) -> Result<()> {
        if !self.time.is_finite() || !self.duration.is_finite() {
            return Err(CoreError::InvalidSequence(
                "time and duration must be finite".to_string(),
            ));
        }
        if self.duration < 0.0 {
            return Err(CoreError::InvalidSequence(format!(
                "negative duration {} at {}s",
                self.duration, self.time
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrequencyBand;
    use crate::choreography::geometry::GeometryMode;

    fn input(frame: &FeatureFrame, elapsed: f64) -> ExpressionInput<'_> {
        ExpressionInput {
            elapsed,
            progress: 0.0,
            frame,
        }
    }

    #[test]
    fn test_sequence_interval_is_half_open() {
        let seq = Sequence::new(2.0, 3.0);
        assert!(!seq.contains(1.99));
        assert!(seq.contains(2.0));
        assert!(seq.contains(4.99));
        assert!(!seq.contains(5.0));

        let empty = Sequence::new(2.0, 0.0);
        assert!(!empty.contains(2.0));
        assert_eq!(empty.progress(2.0), 0.0);
    }

    #[test]
    fn test_overlap() {
        let a = Sequence::new(0.0, 10.0);
        assert!(a.overlaps(&Sequence::new(5.0, 10.0)));
        assert!(!a.overlaps(&Sequence::new(10.0, 5.0)));
    }

    #[test]
    fn test_validate() {
        assert!(Sequence::new(0.0, 1.0).validate().is_ok());
        assert!(Sequence::new(0.0, -1.0).validate().is_err());
        assert!(Sequence::new(f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn test_descriptor_resolution() {
        let mut frame = FeatureFrame::default();
        frame.bands[FrequencyBand::Bass.index()] = 0.5;

        let linked = ParameterDescriptor::AudioLinked {
            axis: FeatureSource::Band(FrequencyBand::Bass),
            scale: 2.0,
            mode: AudioLinkMode::Add,
            base: 0.25,
        };
        assert_eq!(linked.resolve(&input(&frame, 0.0)), ParameterValue::Number(1.25));

        let wave = ParameterDescriptor::Wave {
            speed: 0.25,
            amplitude: 2.0,
            phase: 0.0,
            offset: 1.0,
        };
        let peak = wave.resolve(&input(&frame, 1.0)).as_number().unwrap();
        assert!((peak - 3.0).abs() < 1e-5);

        let named = ParameterDescriptor::NamedLookup("holographic".to_string());
        assert_eq!(named.resolve(&input(&frame, 0.0)).as_text(), Some("holographic"));

        let expr = ParameterDescriptor::Expression(ExpressionFn::new(|i| i.elapsed as f32 * 2.0));
        assert_eq!(expr.resolve(&input(&frame, 1.5)), ParameterValue::Number(3.0));
    }

    #[test]
    fn test_effects_json_shape() {
        let effects = SequenceEffects {
            geometry: Some(GeometryDirective::Mode(GeometryMode::Hold)),
            rotation: Some(RotationMode::Minimal),
            chaos: Some(0.0),
            color_shift: Some(ColorShiftMode::Freeze),
            actions: vec![SequenceAction::new("flash").with_args(serde_json::json!({"ms": 80}))],
            ..Default::default()
        };
        let json = serde_json::to_value(Sequence::new(1.0, 2.0).with_effects(effects)).unwrap();

        assert_eq!(json["effects"]["colorShift"], "freeze");
        assert_eq!(json["effects"]["rotation"], "minimal");
        assert_eq!(json["effects"]["actions"][0]["type"], "flash");
        assert!(json["effects"].get("parameters").is_none());
    }

    #[test]
    fn test_expression_descriptor_is_not_serializable() {
        let mut effects = SequenceEffects::default();
        effects.parameters.insert(
            "x".to_string(),
            ParameterDescriptor::Expression(ExpressionFn::new(|_| 1.0)),
        );
        assert!(serde_json::to_string(&effects).is_err());
    }
}
