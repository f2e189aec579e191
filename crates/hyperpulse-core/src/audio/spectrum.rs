//! Spectrum Analyzer - PCM to frequency/time buffer pair
//!
//! Hosts that capture raw PCM (file playback, a native audio callback) feed
//! samples here and hand the resulting [`AudioBuffers`] to the extractor.

use super::{AudioBuffers, AudioInput};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Configuration for [`SpectrumAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Sample rate of the incoming PCM
    pub sample_rate: u32,
    /// FFT size (power of 2)
    pub fft_size: usize,
    /// Magnitude smoothing between analyses (0 = none)
    pub smoothing: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fft_size: 2048,
            smoothing: 0.0,
        }
    }
}

/// Hann-windowed FFT over the most recent `fft_size` samples
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    config: SpectrumConfig,
    /// Ring buffer of the latest samples
    input_buffer: Vec<f32>,
    /// Write position in ring buffer
    write_pos: usize,
    fft_buffer: Vec<Complex<f32>>,
    scratch_buffer: Vec<Complex<f32>>,
    /// Hann window coefficients
    window: Vec<f32>,
    /// Sum of the window, for amplitude normalization
    window_gain: f32,
    magnitudes: Vec<f32>,
    /// Samples pushed since the last analysis
    latest_samples: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Create a new analyzer
    pub fn new(config: SpectrumConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();
        let window_gain = window.iter().sum::<f32>().max(f32::EPSILON);

        debug!(
            "SpectrumAnalyzer created: sample_rate={}, fft_size={}",
            config.sample_rate, fft_size
        );

        Self {
            fft,
            input_buffer: vec![0.0; fft_size],
            write_pos: 0,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            window,
            window_gain,
            magnitudes: vec![0.0; fft_size / 2],
            latest_samples: Vec::with_capacity(fft_size),
            config: SpectrumConfig { fft_size, ..config },
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &SpectrumConfig {
        &self.config
    }

    /// Append PCM samples; non-finite samples are treated as silence
    pub fn push_samples(&mut self, samples: &[f32]) {
        let fft_size = self.config.fft_size;
        for &sample in samples {
            let sample = if sample.is_finite() { sample } else { 0.0 };
            self.input_buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % fft_size;
            self.latest_samples.push(sample);
        }
        // Keep at most one window of time-domain history
        if self.latest_samples.len() > fft_size {
            let excess = self.latest_samples.len() - fft_size;
            self.latest_samples.drain(..excess);
        }
    }

    /// Run the FFT over the current window and return the buffer pair
    ///
    /// A full-scale sine reads close to 1.0 in its bin; magnitudes are
    /// clamped to [0, 1].
    pub fn analyze(&mut self) -> AudioBuffers {
        let fft_size = self.config.fft_size;

        // Unwrap ring buffer: oldest sample sits at the write position
        for i in 0..fft_size {
            let src = (self.write_pos + i) % fft_size;
            self.fft_buffer[i] = Complex::new(self.input_buffer[src] * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        let norm = 2.0 / self.window_gain;
        let k = self.config.smoothing.clamp(0.0, 0.99);
        for (i, magnitude) in self.magnitudes.iter_mut().enumerate() {
            let value = (self.fft_buffer[i].norm() * norm).clamp(0.0, 1.0);
            *magnitude = *magnitude * k + value * (1.0 - k);
        }

        let time_domain = std::mem::take(&mut self.latest_samples);
        AudioBuffers {
            frequency: self.magnitudes.clone(),
            time_domain,
            sample_rate: self.config.sample_rate,
        }
    }

    /// Clear all buffered audio
    pub fn reset(&mut self) {
        self.input_buffer.fill(0.0);
        self.write_pos = 0;
        self.magnitudes.fill(0.0);
        self.latest_samples.clear();
        debug!("SpectrumAnalyzer reset");
    }
}

/// File-backed audio input: feeds a fixed number of samples per tick
pub struct PcmSource {
    samples: Vec<f32>,
    position: usize,
    samples_per_tick: usize,
    analyzer: SpectrumAnalyzer,
}

impl PcmSource {
    /// Create a source over mono samples, advancing `samples_per_tick` each tick
    pub fn new(samples: Vec<f32>, samples_per_tick: usize, config: SpectrumConfig) -> Self {
        Self {
            samples,
            position: 0,
            samples_per_tick: samples_per_tick.max(1),
            analyzer: SpectrumAnalyzer::new(config),
        }
    }

    /// Source advancing in step with a tick rate
    pub fn for_tick_rate(samples: Vec<f32>, tick_rate_hz: f64, config: SpectrumConfig) -> Self {
        let per_tick = if tick_rate_hz > 0.0 {
            (config.sample_rate as f64 / tick_rate_hz).round() as usize
        } else {
            config.sample_rate as usize
        };
        Self::new(samples, per_tick, config)
    }

    /// All samples have been consumed
    pub fn is_finished(&self) -> bool {
        self.position >= self.samples.len()
    }

    /// Playback position in seconds
    pub fn position_secs(&self) -> f64 {
        let rate = self.analyzer.config().sample_rate.max(1);
        self.position as f64 / rate as f64
    }
}

impl AudioInput for PcmSource {
    fn next_buffers(&mut self, _now: f64) -> Option<AudioBuffers> {
        if self.is_finished() {
            return None;
        }
        let end = (self.position + self.samples_per_tick).min(self.samples.len());
        self.analyzer.push_samples(&self.samples[self.position..end]);
        self.position = end;
        Some(self.analyzer.analyze())
    }
}
