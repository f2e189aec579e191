//! Audio analysis: PCM spectrum front end and per-tick feature extraction

pub mod extractor;
pub mod features;
pub mod spectrum;

pub use extractor::{ExtractorConfig, FeatureExtractor};
pub use features::{FeatureFrame, FrequencyBand, BAND_COUNT};
pub use spectrum::{PcmSource, SpectrumAnalyzer, SpectrumConfig};

/// One tick worth of raw audio handed to the extractor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffers {
    /// Frequency-domain amplitudes, bin 0 = DC, last bin just below Nyquist
    pub frequency: Vec<f32>,
    /// Time-domain samples
    pub time_domain: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Source of audio buffers polled once per tick (microphone, file playback, tests)
pub trait AudioInput {
    /// Buffers for the tick at `now`, or `None` when no audio is available
    fn next_buffers(&mut self, now: f64) -> Option<AudioBuffers>;
}

/// Replays a fixed list of buffers, then reports silence
impl AudioInput for std::collections::VecDeque<AudioBuffers> {
    fn next_buffers(&mut self, _now: f64) -> Option<AudioBuffers> {
        self.pop_front()
    }
}
