//! Choreography Timeline
//!
//! Holds the ordered sequence list and a playback transport, and turns the
//! active sequence into scripted base values for each tick.

use super::geometry::{GeometryCatalog, GeometryTargetResolver, ResolveContext};
use super::sequence::{ExpressionInput, ParameterValue, Sequence, SequenceAction};
use crate::audio::FeatureFrame;
use crate::{CoreError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Base value key carrying the resolved geometry index
pub const GEOMETRY_KEY: &str = "geometry";

const DEFAULT_CHAOS: f32 = 0.2;
const DEFAULT_SPEED: f32 = 1.0;

/// Outcome of a JSON import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    /// Sequences now in the timeline
    pub imported: usize,
    /// Items skipped as malformed
    pub rejected: usize,
}

/// Timeline output for one tick
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimelineFrame {
    /// Index of the active sequence
    pub active_sequence: Option<usize>,
    /// Whether the active sequence changed on this tick
    pub sequence_changed: bool,
    /// Resolved geometry index
    pub geometry: usize,
    /// Scripted base values, including the geometry index
    pub base_values: BTreeMap<String, ParameterValue>,
    /// Actions of a sequence that became active on this tick
    pub actions: Vec<SequenceAction>,
}

/// Sequence list with playback transport
#[derive(Debug)]
pub struct ChoreographyTimeline {
    sequences: Vec<Sequence>,
    resolver: GeometryTargetResolver,
    /// Sequence whose entry was last reported; follows it across edits
    entered: Option<usize>,
    playback_time: f64,
    playing: bool,
    speed: f64,
}

impl ChoreographyTimeline {
    /// Create an empty, stopped timeline
    pub fn new(catalog: GeometryCatalog, seed: u64) -> Self {
        Self {
            sequences: Vec::new(),
            resolver: GeometryTargetResolver::new(catalog, seed),
            entered: None,
            playback_time: 0.0,
            playing: false,
            speed: 1.0,
        }
    }

    // --- Transport ---

    /// Start or resume playback
    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Pause, keeping the position
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Stop and rewind
    pub fn stop(&mut self) {
        self.playing = false;
        self.playback_time = 0.0;
    }

    /// Jump to a position (seconds, clamped at 0)
    pub fn seek(&mut self, time: f64) {
        self.playback_time = if time.is_finite() { time.max(0.0) } else { 0.0 };
    }

    /// Set playback speed (negative values are clamped to 0)
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 1.0 };
    }

    /// Playback speed multiplier
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Whether playback is running
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current position in seconds
    pub fn playback_time(&self) -> f64 {
        self.playback_time
    }

    /// Move the position forward by `dt` seconds when playing
    pub fn advance(&mut self, dt: f64) {
        if self.playing && dt.is_finite() && dt > 0.0 {
            self.playback_time += dt * self.speed;
        }
    }

    /// End of the last sequence
    pub fn total_duration(&self) -> f64 {
        self.sequences.iter().map(Sequence::end).fold(0.0, f64::max)
    }

    // --- Sequences ---

    /// Sequences ordered by start time
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Sequence at `index`
    pub fn sequence(&self, index: usize) -> Option<&Sequence> {
        self.sequences.get(index)
    }

    /// Number of sequences
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Whether there are no sequences
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// The geometry resolver
    pub fn resolver(&self) -> &GeometryTargetResolver {
        &self.resolver
    }

    /// Mutable access to the resolver (catalog channel, direct catalog swaps)
    pub fn resolver_mut(&mut self) -> &mut GeometryTargetResolver {
        &mut self.resolver
    }

    /// Index of the first sequence containing `time`
    pub fn active_sequence(&self, time: f64) -> Option<usize> {
        self.sequences.iter().position(|s| s.contains(time))
    }

    /// Insert a sequence, returning its index in the sorted list
    pub fn add_sequence(&mut self, sequence: Sequence) -> Result<usize> {
        sequence.validate()?;
        let index = self.insert_sorted(sequence);
        if let Some(entered) = self.entered.as_mut() {
            if *entered >= index {
                *entered += 1;
            }
        }
        self.after_edit(index);
        Ok(index)
    }

    /// Replace the sequence at `index`, returning its new index
    pub fn update_sequence(&mut self, index: usize, sequence: Sequence) -> Result<usize> {
        sequence.validate()?;
        if index >= self.sequences.len() {
            return Err(CoreError::SequenceNotFound(index));
        }
        self.sequences.remove(index);
        let new_index = self.insert_sorted(sequence);
        // An edited sequence keeps its entry; others shift with the move
        self.entered = self.entered.map(|entered| {
            if entered == index {
                new_index
            } else {
                let entered = if entered > index { entered - 1 } else { entered };
                if entered >= new_index {
                    entered + 1
                } else {
                    entered
                }
            }
        });
        self.after_edit(new_index);
        Ok(new_index)
    }

    /// Remove the sequence at `index`
    pub fn remove_sequence(&mut self, index: usize) -> Result<Sequence> {
        if index >= self.sequences.len() {
            return Err(CoreError::SequenceNotFound(index));
        }
        let removed = self.sequences.remove(index);
        self.entered = match self.entered {
            Some(entered) if entered == index => None,
            Some(entered) if entered > index => Some(entered - 1),
            other => other,
        };
        self.resolver.reset();
        debug!("Removed sequence at {}s", removed.time);
        Ok(removed)
    }

    /// Remove every sequence
    pub fn clear(&mut self) {
        self.sequences.clear();
        self.entered = None;
        self.resolver.reset();
    }

    /// Replace the whole list (sorted, stable for equal start times)
    pub fn set_sequences(&mut self, mut sequences: Vec<Sequence>) {
        sequences.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.sequences = sequences;
        self.entered = None;
        self.resolver.reset();
        for index in 0..self.sequences.len() {
            self.warn_overlaps(index);
        }
    }

    /// Insert after any sequence with an equal start time
    fn insert_sorted(&mut self, sequence: Sequence) -> usize {
        let index = self
            .sequences
            .partition_point(|s| s.time <= sequence.time);
        self.sequences.insert(index, sequence);
        index
    }

    fn after_edit(&mut self, index: usize) {
        self.resolver.reset();
        self.warn_overlaps(index);
    }

    fn warn_overlaps(&self, index: usize) {
        let Some(sequence) = self.sequences.get(index) else {
            return;
        };
        for (other_index, other) in self.sequences.iter().enumerate().skip(index + 1) {
            if sequence.overlaps(other) {
                warn!(
                    "Sequence {} ({}s..{}s) overlaps sequence {} ({}s..{}s); the earlier one wins",
                    index,
                    sequence.time,
                    sequence.end(),
                    other_index,
                    other.time,
                    other.end()
                );
            }
        }
    }

    // --- Evaluation ---

    /// Evaluate at the current playback position
    pub fn evaluate_current(&mut self, frame: &FeatureFrame) -> TimelineFrame {
        self.evaluate(self.playback_time, frame)
    }

    /// Scripted base values and geometry at `time`
    pub fn evaluate(&mut self, time: f64, frame: &FeatureFrame) -> TimelineFrame {
        self.resolver.poll_catalog_updates();

        let active = self.active_sequence(time);
        let sequence_changed = active != self.entered;
        if sequence_changed {
            debug!("Active sequence changed: {:?} -> {:?}", self.entered, active);
            self.entered = active;
        }
        // Edits reset the resolver without changing the active sequence
        if active != self.resolver.state().active_sequence {
            self.resolver.begin_sequence(active);
        }

        let mut base_values = BTreeMap::new();
        let mut actions = Vec::new();

        let geometry = match active.and_then(|index| self.sequences.get(index)) {
            Some(sequence) => {
                let elapsed = (time - sequence.time).max(0.0);
                let ctx = ResolveContext {
                    frame,
                    elapsed,
                    duration: sequence.duration,
                };
                let geometry = self.resolver.resolve(sequence.effects.geometry.as_ref(), &ctx);

                let input = ExpressionInput {
                    elapsed,
                    progress: sequence.progress(time),
                    frame,
                };
                collect_base_values(sequence, &input, &mut base_values);
                if sequence_changed {
                    actions = sequence.effects.actions.clone();
                }
                geometry
            }
            None => {
                let ctx = ResolveContext {
                    frame,
                    elapsed: 0.0,
                    duration: 0.0,
                };
                self.resolver.resolve(None, &ctx)
            }
        };

        base_values.insert(
            GEOMETRY_KEY.to_string(),
            ParameterValue::Number(geometry as f32),
        );

        TimelineFrame {
            active_sequence: active,
            sequence_changed,
            geometry,
            base_values,
            actions,
        }
    }

    // --- Exchange ---

    /// Serialize the sequence list as a JSON array
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.sequences)?)
    }

    /// Replace the sequence list from a JSON array
    ///
    /// A document that is not an array, or an array whose items are all
    /// malformed, is rejected and the current list is kept. Otherwise
    /// malformed items are skipped and counted.
    pub fn import_json(&mut self, text: &str) -> Result<ImportReport> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let serde_json::Value::Array(items) = value else {
            return Err(CoreError::InvalidImport(
                "expected a top-level array of sequences".to_string(),
            ));
        };

        let total = items.len();
        let mut sequences = Vec::with_capacity(total);
        let mut report = ImportReport::default();
        for (position, item) in items.into_iter().enumerate() {
            let parsed = serde_json::from_value::<Sequence>(item)
                .map_err(CoreError::from)
                .and_then(|sequence| sequence.validate().map(|()| sequence));
            match parsed {
                Ok(sequence) => sequences.push(sequence),
                Err(e) => {
                    warn!("Skipping sequence item {}: {}", position, e);
                    report.rejected += 1;
                }
            }
        }

        if total > 0 && sequences.is_empty() {
            return Err(CoreError::InvalidImport(format!(
                "none of the {} items is a valid sequence",
                total
            )));
        }

        report.imported = sequences.len();
        self.set_sequences(sequences);
        info!(
            "Imported {} sequences ({} rejected)",
            report.imported, report.rejected
        );
        Ok(report)
    }

    /// Import from a JSON file
    pub fn load_from_path(&mut self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let text = std::fs::read_to_string(path.as_ref())?;
        self.import_json(&text)
    }

    /// Export to a JSON file
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.export_json()?)?;
        Ok(())
    }
}

fn collect_base_values(
    sequence: &Sequence,
    input: &ExpressionInput<'_>,
    out: &mut BTreeMap<String, ParameterValue>,
) {
    let effects = &sequence.effects;

    out.insert(
        "chaos".to_string(),
        ParameterValue::Number(finite_or(effects.chaos, DEFAULT_CHAOS)),
    );
    out.insert(
        "speed".to_string(),
        ParameterValue::Number(finite_or(effects.speed, DEFAULT_SPEED)),
    );
    if let Some(system) = &effects.system {
        out.insert("system".to_string(), ParameterValue::Text(system.clone()));
    }
    if let Some(rotation) = effects.rotation {
        out.insert("rotationMode".to_string(), rotation.name().into());
        out.insert(
            "rotationSpeed".to_string(),
            ParameterValue::Number(rotation.base_rotation_speed()),
        );
    }
    if let Some(color_shift) = effects.color_shift {
        out.insert("colorShift".to_string(), color_shift.name().into());
        out.insert(
            "hueShift".to_string(),
            ParameterValue::Number(color_shift.base_hue_rate()),
        );
    }
    // Descriptors override the scalar effects above
    for (name, descriptor) in &effects.parameters {
        out.insert(name.clone(), descriptor.resolve(input));
    }
}

fn finite_or(value: Option<f32>, fallback: f32) -> f32 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => fallback,
    }
}
