//! Geometry Target Resolver
//!
//! Turns a sequence's geometry directive into a concrete catalog index.
//! The catalog itself belongs to the host; changes arrive as
//! [`CatalogUpdate`] messages that the resolver drains before resolving.

use crate::audio::FeatureFrame;
use crate::parameter_mapper::{FeatureSource, SpectralFeature};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Number of redraws allowed to avoid repeating the previous random pick
const MAX_REPEAT_RETRIES: usize = 5;

const RANDOM_THRESHOLD: f32 = 0.6;
const RANDOM_MIN_INTERVAL: f64 = 0.75;
const EXPLOSIVE_THRESHOLD: f32 = 0.35;
const EXPLOSIVE_MIN_INTERVAL: f64 = 0.25;

/// Ordered geometry names with case-insensitive lookup
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometryCatalog {
    names: Vec<String>,
}

impl GeometryCatalog {
    /// Create a catalog from names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The eight base geometries of the 4D visualizer
    pub fn visualizer_defaults() -> Self {
        Self::new([
            "tetrahedron",
            "hypercube",
            "sphere",
            "torus",
            "klein_bottle",
            "fractal",
            "wave",
            "crystal",
        ])
    }

    /// Number of geometries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name at `index`
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// All names in order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Case-insensitive lookup
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(wanted))
    }
}

/// Message sent by the host when its geometry registry changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogUpdate {
    /// Replace the whole catalog
    Replace(GeometryCatalog),
    /// Register one more geometry at the end
    Append(String),
}

/// Candidate entry: catalog index or geometry name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateRef {
    /// Catalog index
    Index(usize),
    /// Geometry name
    Name(String),
}

/// Cycle direction through the candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleDirection {
    /// Ascending order
    #[default]
    Forward,
    /// Descending order
    Backward,
}

fn default_cycle_interval() -> f64 {
    2.0
}

fn default_morph_cycles() -> f64 {
    1.0
}

/// Selection strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GeometryMode {
    /// Keep the last resolved geometry
    Hold,
    /// Step every `interval` seconds
    Cycle {
        /// Seconds per step
        #[serde(default = "default_cycle_interval")]
        interval: f64,
        /// Explicit order; empty means the whole catalog
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidates: Vec<CandidateRef>,
        /// Step direction
        #[serde(default)]
        direction: CycleDirection,
        /// First index when stepping through the whole catalog
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_index: Option<usize>,
    },
    /// Scan the candidates over the sequence lifetime
    Morph {
        /// Scan order; empty means the whole catalog
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidates: Vec<CandidateRef>,
        /// Number of scans per sequence
        #[serde(default = "default_morph_cycles")]
        cycles: f64,
    },
    /// Audio-gated random pick
    Random {
        /// Pool; empty means the whole catalog
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidates: Vec<CandidateRef>,
        /// Gate level (default 0.6)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Seconds between picks (default 0.75)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_interval: Option<f64>,
        /// Gating feature (default energy)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature: Option<FeatureSource>,
    },
    /// Random with a lower gate and shorter interval
    Explosive {
        /// Pool; empty means the whole catalog
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidates: Vec<CandidateRef>,
        /// Gate level (default 0.35)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Seconds between picks (default 0.25)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_interval: Option<f64>,
        /// Gating feature (default energy)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature: Option<FeatureSource>,
    },
}

impl GeometryMode {
    /// Mode with default settings from its keyword
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "hold" => Some(GeometryMode::Hold),
            "cycle" => Some(GeometryMode::Cycle {
                interval: default_cycle_interval(),
                candidates: Vec::new(),
                direction: CycleDirection::Forward,
                start_index: None,
            }),
            "morph" => Some(GeometryMode::Morph {
                candidates: Vec::new(),
                cycles: default_morph_cycles(),
            }),
            "random" => Some(GeometryMode::Random {
                candidates: Vec::new(),
                threshold: None,
                min_interval: None,
                feature: None,
            }),
            "explosive" => Some(GeometryMode::Explosive {
                candidates: Vec::new(),
                threshold: None,
                min_interval: None,
                feature: None,
            }),
            _ => None,
        }
    }
}

/// Which geometry a sequence wants
///
/// Exchanged as a bare number (index), a string (geometry name or mode
/// keyword) or an object tagged with `mode`. A name that spells a mode
/// keyword is written as `{"name": ...}` so it reads back as a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDirective", into = "RawDirective")]
pub enum GeometryDirective {
    /// Explicit catalog index
    Index(usize),
    /// Geometry name
    Named(String),
    /// Selection strategy
    Mode(GeometryMode),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawDirective {
    Index(usize),
    Text(String),
    Mode(GeometryMode),
    Named { name: String },
}

impl From<RawDirective> for GeometryDirective {
    fn from(raw: RawDirective) -> Self {
        match raw {
            RawDirective::Index(index) => GeometryDirective::Index(index),
            RawDirective::Text(text) => match GeometryMode::from_keyword(&text) {
                Some(mode) => GeometryDirective::Mode(mode),
                None => GeometryDirective::Named(text),
            },
            RawDirective::Mode(mode) => GeometryDirective::Mode(mode),
            RawDirective::Named { name } => GeometryDirective::Named(name),
        }
    }
}

impl From<GeometryDirective> for RawDirective {
    fn from(directive: GeometryDirective) -> Self {
        match directive {
            GeometryDirective::Index(index) => RawDirective::Index(index),
            GeometryDirective::Named(name) if GeometryMode::from_keyword(&name).is_some() => {
                RawDirective::Named { name }
            }
            GeometryDirective::Named(name) => RawDirective::Text(name),
            GeometryDirective::Mode(mode) => RawDirective::Mode(mode),
        }
    }
}

/// Per-sequence resolver memory
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryResolutionState {
    /// Sequence the state belongs to
    pub active_sequence: Option<usize>,
    /// Geometry resolved just before the sequence began
    pub sequence_start_geometry: usize,
    /// Last random/explosive pick
    pub last_random_index: usize,
    /// Sequence-elapsed time of the last pick; `None` means never
    pub last_random_change_time: Option<f64>,
}

/// Per-tick inputs for resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Current audio features
    pub frame: &'a FeatureFrame,
    /// Seconds since the sequence started
    pub elapsed: f64,
    /// Sequence length in seconds
    pub duration: f64,
}

/// Resolves directives to catalog indices
#[derive(Debug)]
pub struct GeometryTargetResolver {
    catalog: GeometryCatalog,
    state: GeometryResolutionState,
    last_resolved: usize,
    rng: StdRng,
    updates: Option<Receiver<CatalogUpdate>>,
}

impl GeometryTargetResolver {
    /// Create a resolver with a seeded RNG
    pub fn new(catalog: GeometryCatalog, seed: u64) -> Self {
        debug!(
            "GeometryTargetResolver created: {} geometries, seed={}",
            catalog.len(),
            seed
        );
        Self {
            catalog,
            state: GeometryResolutionState::default(),
            last_resolved: 0,
            rng: StdRng::seed_from_u64(seed),
            updates: None,
        }
    }

    /// Current catalog
    pub fn catalog(&self) -> &GeometryCatalog {
        &self.catalog
    }

    /// Current resolution state
    pub fn state(&self) -> &GeometryResolutionState {
        &self.state
    }

    /// Index returned by the last resolution
    pub fn last_resolved(&self) -> usize {
        self.last_resolved
    }

    /// Open the update channel; the host keeps the sender
    ///
    /// A second call replaces the previous channel.
    pub fn catalog_channel(&mut self) -> Sender<CatalogUpdate> {
        let (tx, rx) = unbounded();
        self.updates = Some(rx);
        tx
    }

    /// Replace the catalog directly
    pub fn set_catalog(&mut self, catalog: GeometryCatalog) {
        self.catalog = catalog;
        self.rewrap();
    }

    /// Apply pending catalog updates, returning whether anything changed
    pub fn poll_catalog_updates(&mut self) -> bool {
        let Some(rx) = &self.updates else {
            return false;
        };

        let mut changed = false;
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(CatalogUpdate::Replace(catalog)) => {
                    self.catalog = catalog;
                    changed = true;
                }
                Ok(CatalogUpdate::Append(name)) => {
                    self.catalog.names.push(name);
                    changed = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if disconnected {
            debug!("Geometry catalog channel closed");
            self.updates = None;
        }
        if changed {
            debug!("Geometry catalog updated: {} geometries", self.catalog.len());
            self.rewrap();
        }
        changed
    }

    fn rewrap(&mut self) {
        let n = self.catalog.len();
        if n == 0 {
            self.last_resolved = 0;
        } else {
            self.last_resolved %= n;
        }
    }

    /// Start tracking a new active sequence (or none)
    ///
    /// The previous resolved index carries over as the start and last random
    /// geometry so cuts stay continuous.
    pub fn begin_sequence(&mut self, sequence: Option<usize>) {
        self.state = GeometryResolutionState {
            active_sequence: sequence,
            sequence_start_geometry: self.last_resolved,
            last_random_index: self.last_resolved,
            last_random_change_time: None,
        };
    }

    /// Forget the active sequence
    pub fn reset(&mut self) {
        self.begin_sequence(None);
    }

    /// Resolve a directive; `None` holds the last index
    pub fn resolve(
        &mut self,
        directive: Option<&GeometryDirective>,
        ctx: &ResolveContext<'_>,
    ) -> usize {
        let n = self.catalog.len();
        if n == 0 {
            self.last_resolved = 0;
            return 0;
        }

        let index = match directive {
            None => self.last_resolved,
            Some(GeometryDirective::Index(index)) => *index,
            Some(GeometryDirective::Named(name)) => match self.catalog.index_of(name) {
                Some(index) => index,
                None => {
                    trace!("Unknown geometry '{}', holding {}", name, self.last_resolved);
                    self.last_resolved
                }
            },
            Some(GeometryDirective::Mode(mode)) => self.resolve_mode(mode, ctx, n),
        };

        self.last_resolved = index % n;
        self.last_resolved
    }

    fn resolve_mode(&mut self, mode: &GeometryMode, ctx: &ResolveContext<'_>, n: usize) -> usize {
        match mode {
            GeometryMode::Hold => self.last_resolved,
            GeometryMode::Cycle {
                interval,
                candidates,
                direction,
                start_index,
            } => {
                let step = if *interval > 0.0 && ctx.elapsed > 0.0 {
                    (ctx.elapsed / interval).floor() as usize
                } else {
                    0
                };
                let pool = self.candidate_pool(candidates);
                if pool.is_empty() {
                    let start = start_index.unwrap_or(self.state.sequence_start_geometry) % n;
                    offset(start, step, n, *direction)
                } else {
                    pool[offset(0, step, pool.len(), *direction)]
                }
            }
            GeometryMode::Morph { candidates, cycles } => {
                let mut pool = self.candidate_pool(candidates);
                if pool.is_empty() {
                    pool = (0..n).collect();
                }
                let progress = if ctx.duration > 0.0 {
                    (ctx.elapsed / ctx.duration).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let cycles = if cycles.is_finite() && *cycles > 0.0 {
                    *cycles
                } else {
                    1.0
                };
                let position = if progress >= 1.0 {
                    1.0
                } else {
                    (progress * cycles).fract()
                };
                let slot = ((position * pool.len() as f64) as usize).min(pool.len() - 1);
                pool[slot]
            }
            GeometryMode::Random {
                candidates,
                threshold,
                min_interval,
                feature,
            } => self.resolve_random(
                candidates,
                threshold.unwrap_or(RANDOM_THRESHOLD),
                min_interval.unwrap_or(RANDOM_MIN_INTERVAL),
                feature.as_ref(),
                ctx,
                n,
            ),
            GeometryMode::Explosive {
                candidates,
                threshold,
                min_interval,
                feature,
            } => self.resolve_random(
                candidates,
                threshold.unwrap_or(EXPLOSIVE_THRESHOLD),
                min_interval.unwrap_or(EXPLOSIVE_MIN_INTERVAL),
                feature.as_ref(),
                ctx,
                n,
            ),
        }
    }

    fn resolve_random(
        &mut self,
        candidates: &[CandidateRef],
        threshold: f32,
        min_interval: f64,
        feature: Option<&FeatureSource>,
        ctx: &ResolveContext<'_>,
        n: usize,
    ) -> usize {
        let level = match feature {
            Some(source) => source.resolve(ctx.frame),
            None => SpectralFeature::Energy.read(ctx.frame),
        };
        let due = self
            .state
            .last_random_change_time
            .map_or(true, |last| ctx.elapsed - last >= min_interval);

        if level >= threshold && due {
            let mut pool = self.candidate_pool(candidates);
            if pool.is_empty() {
                pool = (0..n).collect();
            }
            let previous = self.state.last_random_index % n;
            let mut pick = pool[self.rng.random_range(0..pool.len())];
            if pool.len() > 1 {
                for _ in 0..MAX_REPEAT_RETRIES {
                    if pick != previous {
                        break;
                    }
                    pick = pool[self.rng.random_range(0..pool.len())];
                }
            }
            trace!(
                "Random geometry pick {} (level {:.2} >= {:.2})",
                pick,
                level,
                threshold
            );
            self.state.last_random_index = pick;
            self.state.last_random_change_time = Some(ctx.elapsed);
        }

        self.state.last_random_index % n
    }

    /// Resolve candidate refs to indices; unknown names are dropped
    fn candidate_pool(&self, candidates: &[CandidateRef]) -> Vec<usize> {
        let n = self.catalog.len();
        candidates
            .iter()
            .filter_map(|candidate| match candidate {
                CandidateRef::Index(index) => Some(index % n),
                CandidateRef::Name(name) => self.catalog.index_of(name),
            })
            .collect()
    }
}

fn offset(start: usize, step: usize, len: usize, direction: CycleDirection) -> usize {
    let step = step % len;
    match direction {
        CycleDirection::Forward => (start + step) % len,
        CycleDirection::Backward => (start + len - step) % len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(count: usize) -> GeometryTargetResolver {
        let names: Vec<String> = (0..count).map(|i| format!("geo{}", i)).collect();
        GeometryTargetResolver::new(GeometryCatalog::new(names), 7)
    }

    fn ctx(frame: &FeatureFrame, elapsed: f64, duration: f64) -> ResolveContext<'_> {
        ResolveContext {
            frame,
            elapsed,
            duration,
        }
    }

    fn energetic(level: f32) -> FeatureFrame {
        let mut frame = FeatureFrame::default();
        frame.bands = [level; crate::audio::BAND_COUNT];
        frame
    }

    #[test]
    fn test_catalog_lookup_is_case_insensitive() {
        let catalog = GeometryCatalog::visualizer_defaults();
        assert_eq!(catalog.index_of("HyperCube"), Some(1));
        assert_eq!(catalog.index_of("nope"), None);
    }

    #[test]
    fn test_index_wraps_and_named_holds_when_unknown() {
        let mut r = resolver(4);
        let frame = FeatureFrame::default();
        assert_eq!(r.resolve(Some(&GeometryDirective::Index(6)), &ctx(&frame, 0.0, 1.0)), 2);
        assert_eq!(
            r.resolve(Some(&GeometryDirective::Named("GEO3".into())), &ctx(&frame, 0.0, 1.0)),
            3
        );
        assert_eq!(
            r.resolve(Some(&GeometryDirective::Named("missing".into())), &ctx(&frame, 0.0, 1.0)),
            3
        );
        assert_eq!(r.resolve(None, &ctx(&frame, 0.0, 1.0)), 3);
    }

    #[test]
    fn test_empty_catalog_resolves_to_zero() {
        let mut r = GeometryTargetResolver::new(GeometryCatalog::default(), 1);
        let frame = energetic(1.0);
        let random = GeometryDirective::Mode(GeometryMode::from_keyword("random").unwrap());
        assert_eq!(r.resolve(Some(&random), &ctx(&frame, 0.0, 1.0)), 0);
        assert_eq!(r.resolve(Some(&GeometryDirective::Index(9)), &ctx(&frame, 0.0, 1.0)), 0);
    }

    #[test]
    fn test_cycle_with_candidates() {
        let mut r = resolver(8);
        let frame = FeatureFrame::default();
        let cycle = GeometryDirective::Mode(GeometryMode::Cycle {
            interval: 2.0,
            candidates: vec![
                CandidateRef::Index(5),
                CandidateRef::Name("geo1".into()),
                CandidateRef::Index(3),
            ],
            direction: CycleDirection::Forward,
            start_index: None,
        });
        assert_eq!(r.resolve(Some(&cycle), &ctx(&frame, 0.0, 10.0)), 5);
        assert_eq!(r.resolve(Some(&cycle), &ctx(&frame, 2.5, 10.0)), 1);
        assert_eq!(r.resolve(Some(&cycle), &ctx(&frame, 5.0, 10.0)), 3);
        assert_eq!(r.resolve(Some(&cycle), &ctx(&frame, 6.0, 10.0)), 5);
    }

    #[test]
    fn test_cycle_backward_from_start_geometry() {
        let mut r = resolver(4);
        let frame = FeatureFrame::default();
        r.resolve(Some(&GeometryDirective::Index(1)), &ctx(&frame, 0.0, 1.0));
        r.begin_sequence(Some(0));
        assert_eq!(r.state().sequence_start_geometry, 1);

        let cycle = GeometryDirective::Mode(GeometryMode::Cycle {
            interval: 1.0,
            candidates: Vec::new(),
            direction: CycleDirection::Backward,
            start_index: None,
        });
        assert_eq!(r.resolve(Some(&cycle), &ctx(&frame, 0.5, 10.0)), 1);
        assert_eq!(r.resolve(Some(&cycle), &ctx(&frame, 1.5, 10.0)), 0);
        assert_eq!(r.resolve(Some(&cycle), &ctx(&frame, 2.5, 10.0)), 3);
    }

    #[test]
    fn test_morph_scans_catalog() {
        let mut r = resolver(4);
        let frame = FeatureFrame::default();
        let morph = GeometryDirective::Mode(GeometryMode::from_keyword("morph").unwrap());
        assert_eq!(r.resolve(Some(&morph), &ctx(&frame, 0.0, 8.0)), 0);
        assert_eq!(r.resolve(Some(&morph), &ctx(&frame, 2.0, 8.0)), 1);
        assert_eq!(r.resolve(Some(&morph), &ctx(&frame, 7.9, 8.0)), 3);
        assert_eq!(r.resolve(Some(&morph), &ctx(&frame, 8.0, 8.0)), 3);
        assert_eq!(r.resolve(Some(&morph), &ctx(&frame, 3.0, 0.0)), 0);
    }

    #[test]
    fn test_random_respects_threshold_and_interval() {
        let mut r = resolver(6);
        let random = GeometryDirective::Mode(GeometryMode::from_keyword("random").unwrap());
        r.begin_sequence(Some(0));

        let quiet = energetic(0.1);
        r.resolve(Some(&random), &ctx(&quiet, 0.0, 10.0));
        assert_eq!(r.state().last_random_change_time, None);

        let loud = energetic(0.8);
        r.resolve(Some(&random), &ctx(&loud, 0.1, 10.0));
        assert_eq!(r.state().last_random_change_time, Some(0.1));
        r.resolve(Some(&random), &ctx(&loud, 0.5, 10.0));
        assert_eq!(r.state().last_random_change_time, Some(0.1));
        r.resolve(Some(&random), &ctx(&loud, 0.9, 10.0));
        assert_eq!(r.state().last_random_change_time, Some(0.9));
    }

    #[test]
    fn test_random_avoids_immediate_repeat_with_two_candidates() {
        let mut r = resolver(2);
        let explosive = GeometryDirective::Mode(GeometryMode::from_keyword("explosive").unwrap());
        let loud = energetic(1.0);
        let mut previous = r.resolve(Some(&explosive), &ctx(&loud, 0.0, 100.0));
        let mut repeats = 0;
        for step in 1..50 {
            let index = r.resolve(Some(&explosive), &ctx(&loud, step as f64, 100.0));
            if index == previous {
                repeats += 1;
            }
            previous = index;
        }
        // Each repeat needs six identical draws in a row
        assert!(repeats < 5, "repeats={}", repeats);
    }

    #[test]
    fn test_catalog_updates_are_polled() {
        let mut r = resolver(6);
        let frame = FeatureFrame::default();
        r.resolve(Some(&GeometryDirective::Index(5)), &ctx(&frame, 0.0, 1.0));

        let tx = r.catalog_channel();
        tx.send(CatalogUpdate::Replace(GeometryCatalog::new(["a", "b"])))
            .unwrap();
        tx.send(CatalogUpdate::Append("c".into())).unwrap();
        assert!(r.poll_catalog_updates());
        assert_eq!(r.catalog().len(), 3);
        assert_eq!(r.last_resolved(), 2);
        assert!(!r.poll_catalog_updates());
    }

    #[test]
    fn test_directive_json_forms() {
        let index: GeometryDirective = serde_json::from_str("3").unwrap();
        assert_eq!(index, GeometryDirective::Index(3));

        let named: GeometryDirective = serde_json::from_str("\"torus\"").unwrap();
        assert_eq!(named, GeometryDirective::Named("torus".into()));

        let keyword: GeometryDirective = serde_json::from_str("\"cycle\"").unwrap();
        assert!(matches!(keyword, GeometryDirective::Mode(GeometryMode::Cycle { interval, .. }) if interval == 2.0));

        let object: GeometryDirective =
            serde_json::from_str(r#"{"mode":"random","threshold":0.5,"feature":"bass"}"#).unwrap();
        match object {
            GeometryDirective::Mode(GeometryMode::Random {
                threshold, feature, ..
            }) => {
                assert_eq!(threshold, Some(0.5));
                assert!(feature.is_some());
            }
            other => panic!("unexpected directive {:?}", other),
        }

        assert!(serde_json::from_str::<GeometryDirective>("-1").is_err());
    }

    #[test]
    fn test_keyword_named_geometry_survives_round_trip() {
        let named = GeometryDirective::Named("Cycle".into());
        let json = serde_json::to_string(&named).unwrap();
        assert_eq!(json, r#"{"name":"Cycle"}"#);
        assert_eq!(serde_json::from_str::<GeometryDirective>(&json).unwrap(), named);

        let plain = GeometryDirective::Named("torus".into());
        assert_eq!(serde_json::to_string(&plain).unwrap(), "\"torus\"");
    }
}
