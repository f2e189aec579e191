//! Hyperpulse Core - Audio-reactive parameter engine
//!
//! This crate turns raw audio into animated visualizer parameters:
//! - Feature extraction (bands, spectral descriptors, onsets, tempo)
//! - ADSR envelopes and per-parameter mapping curves
//! - Choreography timeline with scripted sequences
//! - Geometry selection strategies (hold, cycle, morph, random)
//! - Tick scheduler merging scripted base values with the audio overlay

#![warn(missing_docs)]

use thiserror::Error;

pub mod audio;
pub mod choreography;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod logging;
pub mod parameter_mapper;

// --- Re-exports grouped by category ---

// Audio analysis
pub use audio::{
    AudioBuffers, AudioInput, ExtractorConfig, FeatureExtractor, FeatureFrame, FrequencyBand,
    PcmSource, SpectrumAnalyzer, SpectrumConfig,
};

// Mapping
pub use envelope::{EnvelopeConfig, EnvelopeGenerator, EnvelopePhase};
pub use parameter_mapper::{
    CurveKind, DerivedFeature, FeatureSource, MappingPreset, ParameterMapper, ParameterMapping,
    SpectralFeature,
};

// Choreography
pub use choreography::{
    AudioLinkMode, CandidateRef, ChoreographyTimeline, ColorShiftMode, CycleDirection,
    ExpressionFn, ExpressionInput, GeometryCatalog, GeometryDirective, GeometryMode,
    GeometryResolutionState, GeometryTargetResolver, ImportReport, ParameterDescriptor,
    ParameterValue, RotationMode, Sequence, SequenceAction, SequenceEffects, TimelineFrame,
};

// Engine
pub use config::{EngineConfig, MappingEntry, ResolverConfig};
pub use engine::{ActionDispatcher, EngineContext, NullDispatcher, ParameterSnapshot, Scheduler};
pub use logging::LogConfig;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// A parameter mapping failed validation
    #[error("Invalid mapping '{name}': {reason}")]
    InvalidMapping {
        /// Target parameter name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A sequence failed validation
    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    /// A choreography import was rejected as a whole
    #[error("Invalid import: {0}")]
    InvalidImport(String),

    /// No sequence at the given position
    #[error("Sequence not found at index {0}")]
    SequenceNotFound(usize),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Clamp to [0, 1], mapping non-finite values to 0
pub(crate) fn clamp01(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp01_guards_non_finite() {
        assert_eq!(clamp01(f32::NAN), 0.0);
        assert_eq!(clamp01(f32::INFINITY), 0.0);
        assert_eq!(clamp01(-0.5), 0.0);
        assert_eq!(clamp01(1.5), 1.0);
        assert_eq!(clamp01(0.25), 0.25);
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidMapping {
            name: "chaos".to_string(),
            reason: "range is not finite".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid mapping 'chaos': range is not finite");

        let err = CoreError::SequenceNotFound(3);
        assert!(err.to_string().contains('3'));
    }
}
