//! Feature Extractor - per-tick spectral analysis
//!
//! Turns one frequency-domain amplitude buffer and one time-domain sample
//! buffer into a [`FeatureFrame`]. All timing is driven by the caller's
//! `now` (seconds), so a run is fully replayable with synthetic timestamps.

use super::features::{FeatureFrame, FrequencyBand, BAND_COUNT};
use super::AudioBuffers;
use crate::clamp01;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Configuration for [`FeatureExtractor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Band smoothing factor k in `smoothed = smoothed*k + new*(1-k)`
    pub smoothing: f32,
    /// Amplitude that maps to 1.0 (1.0 for float spectra, 255 for byte analysers)
    pub amplitude_full_scale: f32,
    /// Zero point of the time-domain samples (0.0 for float PCM, 128 for bytes)
    pub time_domain_center: f32,
    /// Distance from the zero point that maps to full scale
    pub time_domain_full_scale: f32,
    /// Cumulative energy fraction used for spectral rolloff
    pub rolloff_fraction: f32,
    /// Spectral flux above which an onset may fire
    pub onset_threshold: f32,
    /// Minimum time between onsets in seconds
    pub min_onset_interval: f64,
    /// Number of onset timestamps kept for tempo estimation
    pub onset_history: usize,
    /// Onsets required before the tempo estimate leaves its default
    pub min_onsets_for_bpm: usize,
    /// Lowest reported tempo
    pub min_bpm: f32,
    /// Highest reported tempo
    pub max_bpm: f32,
    /// Tempo reported until enough onsets are observed
    pub default_bpm: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            amplitude_full_scale: 1.0,
            time_domain_center: 0.0,
            time_domain_full_scale: 1.0,
            rolloff_fraction: 0.85,
            onset_threshold: 0.02,
            min_onset_interval: 0.115,
            onset_history: 16,
            min_onsets_for_bpm: 4,
            min_bpm: 60.0,
            max_bpm: 200.0,
            default_bpm: FeatureFrame::DEFAULT_BPM,
        }
    }
}

impl ExtractorConfig {
    /// Tempo bounds, ordered and finite
    fn bpm_bounds(&self) -> (f32, f32) {
        let lo = if self.min_bpm.is_finite() { self.min_bpm } else { 60.0 };
        let hi = if self.max_bpm.is_finite() { self.max_bpm } else { 200.0 };
        if lo <= hi {
            (lo, hi)
        } else {
            (hi, lo)
        }
    }

    /// Clamp a tempo into the configured bounds
    fn clamp_bpm(&self, bpm: f32) -> f32 {
        let (lo, hi) = self.bpm_bounds();
        if bpm.is_finite() {
            bpm.clamp(lo, hi)
        } else {
            lo
        }
    }
}

/// Feature extractor with band smoothing, onset detection and tempo tracking
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
    /// Smoothed band levels
    smoothed_bands: [f32; BAND_COUNT],
    /// Normalized spectrum of the previous frame, for flux
    previous_spectrum: Vec<f32>,
    /// Timestamp of the most recent onset
    last_onset: Option<f64>,
    /// Recent onset timestamps (bounded ring)
    onset_times: VecDeque<f64>,
    /// Current tempo estimate
    bpm: f32,
    /// Frames analyzed since creation or reset
    frame_count: u64,
}

impl FeatureExtractor {
    /// Create a new extractor
    pub fn new(config: ExtractorConfig) -> Self {
        debug!(
            "FeatureExtractor created: smoothing={}, onset_threshold={}, min_onset_interval={}s",
            config.smoothing, config.onset_threshold, config.min_onset_interval
        );
        let bpm = config.clamp_bpm(config.default_bpm);
        Self {
            onset_times: VecDeque::with_capacity(config.onset_history.max(1)),
            config,
            smoothed_bands: [0.0; BAND_COUNT],
            previous_spectrum: Vec::new(),
            last_onset: None,
            bpm,
            frame_count: 0,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Current tempo estimate
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// Onset timestamps currently in the history ring
    pub fn onset_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.onset_times.iter().copied()
    }

    /// Frames analyzed since creation or the last reset
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Extract features from a buffer pair
    pub fn extract(&mut self, buffers: &AudioBuffers, now: f64) -> FeatureFrame {
        self.extract_raw(
            &buffers.frequency,
            &buffers.time_domain,
            buffers.sample_rate,
            now,
        )
    }

    /// Frame used when no audio is available this tick
    pub fn silent_frame(&self) -> FeatureFrame {
        FeatureFrame::silent(self.bpm)
    }

    /// Extract features from raw slices
    ///
    /// Empty buffers or a zero sample rate yield a silent frame and leave
    /// the extractor state untouched.
    pub fn extract_raw(
        &mut self,
        frequency: &[f32],
        time_domain: &[f32],
        sample_rate: u32,
        now: f64,
    ) -> FeatureFrame {
        if frequency.is_empty() || time_domain.is_empty() || sample_rate == 0 {
            trace!("FeatureExtractor: missing input, emitting silent frame");
            return self.silent_frame();
        }

        let full_scale = if self.config.amplitude_full_scale > 0.0 {
            self.config.amplitude_full_scale
        } else {
            1.0
        };
        let spectrum: Vec<f32> = frequency.iter().map(|a| clamp01(a / full_scale)).collect();
        let nyquist = sample_rate as f32 / 2.0;
        let bin_width = nyquist / spectrum.len() as f32;

        // 1. Bands
        let k = clamp01(self.config.smoothing);
        for band in FrequencyBand::ALL {
            let level = Self::band_level(&spectrum, bin_width, band);
            let i = band.index();
            self.smoothed_bands[i] = clamp01(self.smoothed_bands[i] * k + level * (1.0 - k));
        }

        // 2. Spectral shape
        let spectral_centroid = Self::centroid(&spectrum, bin_width, nyquist);
        let spectral_rolloff =
            Self::rolloff(&spectrum, bin_width, nyquist, self.config.rolloff_fraction);
        let spectral_flux = self.flux(&spectrum);

        // 3. Level
        let rms = self.rms(time_domain);

        // 4. Onsets and tempo
        let (onset, onset_strength) = self.detect_onset(spectral_flux, now);

        self.previous_spectrum = spectrum;
        self.frame_count += 1;

        FeatureFrame {
            bands: self.smoothed_bands,
            spectral_centroid,
            spectral_rolloff,
            spectral_flux,
            rms,
            onset,
            onset_strength,
            bpm: self.bpm,
        }
    }

    /// Average normalized amplitude over the bins covering a band
    fn band_level(spectrum: &[f32], bin_width: f32, band: FrequencyBand) -> f32 {
        if spectrum.is_empty() || bin_width <= 0.0 {
            return 0.0;
        }
        let (low, high) = band.range_hz();
        let min_bin = (low / bin_width) as usize;
        // Exclusive, so a bin starting exactly on an edge belongs to the upper band
        let end_bin = ((high / bin_width).ceil() as usize).min(spectrum.len());

        if end_bin <= min_bin {
            return 0.0;
        }

        let bins = &spectrum[min_bin..end_bin];
        clamp01(bins.iter().sum::<f32>() / bins.len() as f32)
    }

    fn centroid(spectrum: &[f32], bin_width: f32, nyquist: f32) -> f32 {
        let total: f32 = spectrum.iter().sum();
        if total <= 0.0 || nyquist <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(i, a)| i as f32 * bin_width * a)
            .sum();
        clamp01(weighted / total / nyquist)
    }

    fn rolloff(spectrum: &[f32], bin_width: f32, nyquist: f32, fraction: f32) -> f32 {
        let total: f32 = spectrum.iter().map(|a| a * a).sum();
        if total <= 0.0 || nyquist <= 0.0 {
            return 0.0;
        }
        let target = total * clamp01(fraction);
        let mut cumulative = 0.0;
        for (i, a) in spectrum.iter().enumerate() {
            cumulative += a * a;
            if cumulative >= target {
                return clamp01(i as f32 * bin_width / nyquist);
            }
        }
        1.0
    }

    /// Positive spectral change since the previous frame, per bin
    ///
    /// The first frame (or a frame whose bin count changed) reports no flux.
    fn flux(&self, spectrum: &[f32]) -> f32 {
        if self.previous_spectrum.len() != spectrum.len() || spectrum.is_empty() {
            return 0.0;
        }
        let rising: f32 = spectrum
            .iter()
            .zip(&self.previous_spectrum)
            .map(|(now, before)| (now - before).max(0.0))
            .sum();
        clamp01(rising / spectrum.len() as f32)
    }

    fn rms(&self, samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let scale = if self.config.time_domain_full_scale > 0.0 {
            self.config.time_domain_full_scale
        } else {
            1.0
        };
        let center = self.config.time_domain_center;
        let sum: f32 = samples
            .iter()
            .map(|s| {
                let x = if s.is_finite() { (s - center) / scale } else { 0.0 };
                x * x
            })
            .sum();
        clamp01((sum / samples.len() as f32).sqrt())
    }

    fn detect_onset(&mut self, flux: f32, now: f64) -> (bool, f32) {
        let threshold = self.config.onset_threshold;
        if flux <= threshold {
            return (false, 0.0);
        }

        let cooled_down = match self.last_onset {
            Some(last) => now - last >= self.config.min_onset_interval,
            None => true,
        };
        if !cooled_down {
            return (false, 0.0);
        }

        let strength = if threshold > 0.0 {
            (flux / threshold - 1.0).clamp(0.0, 2.0) / 2.0
        } else {
            clamp01(flux)
        };

        self.last_onset = Some(now);
        self.onset_times.push_back(now);
        while self.onset_times.len() > self.config.onset_history.max(1) {
            self.onset_times.pop_front();
        }

        self.bpm = self.estimate_bpm();
        trace!(
            "Onset at {:.3}s: flux={:.4}, strength={:.2}, bpm={:.1}",
            now,
            flux,
            strength,
            self.bpm
        );

        (true, strength)
    }

    /// Tempo from recent onset intervals, always within the configured bounds
    fn estimate_bpm(&self) -> f32 {
        let fallback = self.config.clamp_bpm(self.config.default_bpm);
        if self.onset_times.len() < self.config.min_onsets_for_bpm.max(2) {
            return fallback;
        }

        let mut intervals: Vec<f64> = self
            .onset_times
            .iter()
            .zip(self.onset_times.iter().skip(1))
            .map(|(a, b)| b - a)
            .filter(|i| i.is_finite() && *i > 0.0)
            .collect();
        if intervals.is_empty() {
            return fallback;
        }

        intervals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // Drop outer quartiles when there is enough data
        let valid = if intervals.len() >= 4 {
            let start = intervals.len() / 4;
            &intervals[start..intervals.len() - start]
        } else {
            &intervals[..]
        };

        let avg = valid.iter().sum::<f64>() / valid.len() as f64;
        if avg <= 0.001 {
            return fallback;
        }

        let (lo, hi) = self.config.bpm_bounds();
        let mut bpm = (60.0 / avg) as f32;

        // Half/double-time folding before the hard clamp
        for _ in 0..4 {
            if bpm > hi {
                bpm /= 2.0;
            } else if bpm < lo {
                bpm *= 2.0;
            } else {
                break;
            }
        }

        self.config.clamp_bpm((bpm * 10.0).round() / 10.0)
    }

    /// Reset all analysis state
    pub fn reset(&mut self) {
        self.smoothed_bands = [0.0; BAND_COUNT];
        self.previous_spectrum.clear();
        self.last_onset = None;
        self.onset_times.clear();
        self.bpm = self.config.clamp_bpm(self.config.default_bpm);
        self.frame_count = 0;

        debug!("FeatureExtractor reset");
    }

    /// Replace the configuration, keeping the tempo estimate within the new bounds
    pub fn update_config(&mut self, config: ExtractorConfig) {
        self.bpm = config.clamp_bpm(self.bpm);
        self.config = config;
        debug!("FeatureExtractor config updated");
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}
