//! Choreography: scripted sequences, geometry selection and the timeline

pub mod geometry;
pub mod sequence;
pub mod timeline;

pub use geometry::{
    CandidateRef, CatalogUpdate, CycleDirection, GeometryCatalog, GeometryDirective,
    GeometryMode, GeometryResolutionState, GeometryTargetResolver, ResolveContext,
};
pub use sequence::{
    AudioLinkMode, ColorShiftMode, ExpressionFn, ExpressionInput, ParameterDescriptor,
    ParameterValue, RotationMode, Sequence, SequenceAction, SequenceEffects,
};
pub use timeline::{ChoreographyTimeline, ImportReport, TimelineFrame};
