//! Tick scheduler
//!
//! One `tick(dt)` runs the whole pipeline: audio input, feature extraction,
//! parameter mapping, timeline evaluation, merge and hand-off.

use crate::audio::{AudioInput, FeatureExtractor, FeatureFrame};
use crate::choreography::timeline::GEOMETRY_KEY;
use crate::choreography::{ChoreographyTimeline, GeometryCatalog, ParameterValue, SequenceAction};
use crate::config::EngineConfig;
use crate::parameter_mapper::ParameterMapper;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace, warn};

/// Receives sequence actions when their sequence becomes active
pub trait ActionDispatcher {
    /// Handle one action
    fn dispatch(&mut self, action: &SequenceAction);
}

/// Discards every action
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

impl ActionDispatcher for NullDispatcher {
    fn dispatch(&mut self, action: &SequenceAction) {
        trace!("Dropping action '{}'", action.action_type);
    }
}

impl ActionDispatcher for Sender<SequenceAction> {
    fn dispatch(&mut self, action: &SequenceAction) {
        if let Err(e) = self.try_send(action.clone()) {
            warn!("Action '{}' not delivered: {}", action.action_type, e);
        }
    }
}

impl ActionDispatcher for Vec<SequenceAction> {
    fn dispatch(&mut self, action: &SequenceAction) {
        self.push(action.clone());
    }
}

/// Collaborators handed to the scheduler
pub struct EngineContext {
    /// Engine configuration
    pub config: EngineConfig,
    /// Geometry catalog
    pub catalog: GeometryCatalog,
    /// Action sink
    pub dispatcher: Box<dyn ActionDispatcher + Send>,
}

impl EngineContext {
    /// Context with the configured catalog and no action sink
    pub fn new(config: EngineConfig) -> Self {
        let catalog = config.catalog();
        Self {
            config,
            catalog,
            dispatcher: Box::new(NullDispatcher),
        }
    }

    /// Use another catalog
    pub fn with_catalog(mut self, catalog: GeometryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Use another action sink
    pub fn with_dispatcher(mut self, dispatcher: impl ActionDispatcher + Send + 'static) -> Self {
        self.dispatcher = Box::new(dispatcher);
        self
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Final parameter set for one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    /// Tick counter, starting at 1
    pub tick: u64,
    /// Engine clock in seconds
    pub time: f64,
    /// Timeline position in seconds
    pub playback_time: f64,
    /// Active sequence index
    pub active_sequence: Option<usize>,
    /// Resolved geometry index
    pub geometry: usize,
    /// Features the values were derived from
    pub features: FeatureFrame,
    /// Merged parameter values
    pub values: BTreeMap<String, ParameterValue>,
}

/// Combine scripted base values with the audio overlay
///
/// Numeric bases are a floor the overlay is added to. Text bases and the
/// geometry index are never touched; overlay-only names are inserted as is.
pub fn merge_values(
    mut base: BTreeMap<String, ParameterValue>,
    overlay: &HashMap<String, f32>,
) -> BTreeMap<String, ParameterValue> {
    for (name, delta) in overlay {
        if name == GEOMETRY_KEY {
            continue;
        }
        match base.get_mut(name) {
            Some(ParameterValue::Number(value)) => *value += delta,
            Some(ParameterValue::Text(_)) => {}
            None => {
                base.insert(name.clone(), ParameterValue::Number(*delta));
            }
        }
    }
    base
}

/// Drives the pipeline one tick at a time
pub struct Scheduler {
    extractor: FeatureExtractor,
    mapper: ParameterMapper,
    timeline: ChoreographyTimeline,
    input: Option<Box<dyn AudioInput + Send>>,
    dispatcher: Box<dyn ActionDispatcher + Send>,
    clock: f64,
    tick_count: u64,
    snapshot_sender: Option<Sender<ParameterSnapshot>>,
    dropped_snapshots: u64,
}

impl Scheduler {
    /// Build the pipeline from a context; the timeline starts playing
    pub fn new(context: EngineContext) -> Self {
        let EngineContext {
            config,
            catalog,
            dispatcher,
        } = context;

        let mut timeline = ChoreographyTimeline::new(catalog, config.resolver.seed);
        timeline.play();

        let mapper = config.build_mapper();
        debug!(
            "Scheduler created: {} mappings, {} geometries",
            mapper.len(),
            timeline.resolver().catalog().len()
        );

        Self {
            extractor: FeatureExtractor::new(config.extractor.clone()),
            mapper,
            timeline,
            input: None,
            dispatcher,
            clock: 0.0,
            tick_count: 0,
            snapshot_sender: None,
            dropped_snapshots: 0,
        }
    }

    /// Attach an audio input
    pub fn with_input(mut self, input: impl AudioInput + Send + 'static) -> Self {
        self.set_input(input);
        self
    }

    /// Replace the audio input
    pub fn set_input(&mut self, input: impl AudioInput + Send + 'static) {
        self.input = Some(Box::new(input));
    }

    /// Detach the audio input; ticks then see silence
    pub fn clear_input(&mut self) {
        self.input = None;
    }

    /// Open a bounded snapshot channel; full channels drop snapshots
    pub fn snapshot_channel(&mut self, capacity: usize) -> Receiver<ParameterSnapshot> {
        let (tx, rx) = bounded(capacity.max(1));
        self.snapshot_sender = Some(tx);
        rx
    }

    /// Engine clock in seconds
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Ticks run so far
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Snapshots dropped because the channel was full
    pub fn dropped_snapshots(&self) -> u64 {
        self.dropped_snapshots
    }

    /// Feature extractor
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Parameter mapper
    pub fn mapper(&self) -> &ParameterMapper {
        &self.mapper
    }

    /// Mutable parameter mapper
    pub fn mapper_mut(&mut self) -> &mut ParameterMapper {
        &mut self.mapper
    }

    /// Choreography timeline
    pub fn timeline(&self) -> &ChoreographyTimeline {
        &self.timeline
    }

    /// Mutable choreography timeline (edits, transport)
    pub fn timeline_mut(&mut self) -> &mut ChoreographyTimeline {
        &mut self.timeline
    }

    /// Advance by `dt` seconds and produce the merged parameter set
    pub fn tick(&mut self, dt: f64) -> ParameterSnapshot {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += dt;
        self.tick_count += 1;
        let now = self.clock;

        self.timeline.advance(dt);

        let buffers = self.input.as_mut().and_then(|input| input.next_buffers(now));
        let frame = match buffers {
            Some(buffers) => self.extractor.extract(&buffers, now),
            None => self.extractor.silent_frame(),
        };

        let overlay = self.mapper.map(&frame, now);
        let playback_time = self.timeline.playback_time();
        let scripted = self.timeline.evaluate(playback_time, &frame);

        for action in &scripted.actions {
            debug!("Dispatching action '{}'", action.action_type);
            self.dispatcher.dispatch(action);
        }

        let snapshot = ParameterSnapshot {
            tick: self.tick_count,
            time: now,
            playback_time,
            active_sequence: scripted.active_sequence,
            geometry: scripted.geometry,
            features: frame,
            values: merge_values(scripted.base_values, &overlay),
        };

        if let Some(sender) = &self.snapshot_sender {
            match sender.try_send(snapshot.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped_snapshots += 1;
                    trace!("Snapshot channel full, dropped tick {}", snapshot.tick);
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Snapshot receiver gone, closing channel");
                    self.snapshot_sender = None;
                }
            }
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffers;
    use crate::choreography::{RotationMode, Sequence, SequenceEffects};
    use std::collections::VecDeque;

    fn loud_buffers() -> AudioBuffers {
        AudioBuffers {
            frequency: vec![0.9; 1024],
            time_domain: vec![0.5; 512],
            sample_rate: 44100,
        }
    }

    #[test]
    fn test_merge_adds_overlay_to_numeric_base() {
        let mut base = BTreeMap::new();
        base.insert("chaos".to_string(), ParameterValue::Number(0.0));
        base.insert("rotationMode".to_string(), ParameterValue::from("minimal"));
        base.insert(GEOMETRY_KEY.to_string(), ParameterValue::Number(2.0));

        let mut overlay = HashMap::new();
        overlay.insert("chaos".to_string(), 0.3);
        overlay.insert("rotationMode".to_string(), 0.9);
        overlay.insert(GEOMETRY_KEY.to_string(), 5.0);
        overlay.insert("hue".to_string(), 0.25);

        let merged = merge_values(base, &overlay);
        assert_eq!(merged["chaos"], ParameterValue::Number(0.3));
        assert_eq!(merged["rotationMode"].as_text(), Some("minimal"));
        assert_eq!(merged[GEOMETRY_KEY], ParameterValue::Number(2.0));
        assert_eq!(merged["hue"], ParameterValue::Number(0.25));
    }

    #[test]
    fn test_tick_without_input_is_silent() {
        let mut scheduler = Scheduler::new(EngineContext::default());
        let snapshot = scheduler.tick(1.0 / 60.0);

        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.features.energy(), 0.0);
        assert_eq!(snapshot.values["chaos"], ParameterValue::Number(0.0));
        assert!(snapshot.values.contains_key(GEOMETRY_KEY));
    }

    #[test]
    fn test_minimal_rotation_still_reacts_to_audio() {
        let mut scheduler =
            Scheduler::new(EngineContext::default()).with_input(VecDeque::from(vec![loud_buffers(); 30]));
        scheduler
            .timeline_mut()
            .add_sequence(Sequence::new(0.0, 10.0).with_effects(SequenceEffects {
                rotation: Some(RotationMode::Minimal),
                chaos: Some(0.0),
                ..Default::default()
            }))
            .unwrap();

        let mut last = None;
        for _ in 0..30 {
            last = Some(scheduler.tick(1.0 / 60.0));
        }
        let snapshot = last.unwrap();
        assert_eq!(snapshot.active_sequence, Some(0));
        let chaos = snapshot.values["chaos"].as_number().unwrap();
        assert!(chaos > 0.0, "chaos={}", chaos);
    }

    #[test]
    fn test_actions_reach_channel_dispatcher() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut scheduler = Scheduler::new(EngineContext::default().with_dispatcher(tx));
        let mut seq = Sequence::new(0.0, 1.0);
        seq.effects
            .actions
            .push(SequenceAction::new("flash").with_args(serde_json::json!({"ms": 50})));
        scheduler.timeline_mut().add_sequence(seq).unwrap();

        scheduler.tick(0.01);
        scheduler.tick(0.01);

        let received: Vec<SequenceAction> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].action_type, "flash");
    }

    #[test]
    fn test_snapshot_channel_drops_when_full() {
        let mut scheduler = Scheduler::new(EngineContext::default());
        let rx = scheduler.snapshot_channel(2);
        for _ in 0..5 {
            scheduler.tick(0.01);
        }
        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(scheduler.dropped_snapshots(), 3);

        drop(rx);
        scheduler.tick(0.01);
        assert_eq!(scheduler.tick_count(), 6);
    }

    #[test]
    fn test_paused_timeline_holds_position() {
        let mut scheduler = Scheduler::new(EngineContext::default());
        scheduler.tick(0.5);
        scheduler.timeline_mut().pause();
        let snapshot = scheduler.tick(0.5);
        assert!((snapshot.time - 1.0).abs() < 1e-12);
        assert!((snapshot.playback_time - 0.5).abs() < 1e-12);
    }
}
