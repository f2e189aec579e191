//! Feature frame produced once per tick by the extractor

use serde::{Deserialize, Serialize};

/// Number of tracked frequency bands
pub const BAND_COUNT: usize = 7;

/// Fixed frequency sub-ranges tracked by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyBand {
    /// 20-60 Hz
    SubBass,
    /// 60-250 Hz
    Bass,
    /// 250-500 Hz
    LowMid,
    /// 500-2000 Hz
    Mid,
    /// 2000-4000 Hz
    HighMid,
    /// 4000-8000 Hz
    Presence,
    /// 8000-20000 Hz
    Air,
}

impl FrequencyBand {
    /// All bands in ascending frequency order
    pub const ALL: [FrequencyBand; BAND_COUNT] = [
        FrequencyBand::SubBass,
        FrequencyBand::Bass,
        FrequencyBand::LowMid,
        FrequencyBand::Mid,
        FrequencyBand::HighMid,
        FrequencyBand::Presence,
        FrequencyBand::Air,
    ];

    /// Position in [`FrequencyBand::ALL`] and in `FeatureFrame::bands`
    pub fn index(self) -> usize {
        self as usize
    }

    /// Frequency range in Hz (low, high)
    pub fn range_hz(self) -> (f32, f32) {
        match self {
            FrequencyBand::SubBass => (20.0, 60.0),
            FrequencyBand::Bass => (60.0, 250.0),
            FrequencyBand::LowMid => (250.0, 500.0),
            FrequencyBand::Mid => (500.0, 2000.0),
            FrequencyBand::HighMid => (2000.0, 4000.0),
            FrequencyBand::Presence => (4000.0, 8000.0),
            FrequencyBand::Air => (8000.0, 20000.0),
        }
    }

    /// Canonical snake_case name
    pub fn name(self) -> &'static str {
        match self {
            FrequencyBand::SubBass => "sub_bass",
            FrequencyBand::Bass => "bass",
            FrequencyBand::LowMid => "low_mid",
            FrequencyBand::Mid => "mid",
            FrequencyBand::HighMid => "high_mid",
            FrequencyBand::Presence => "presence",
            FrequencyBand::Air => "air",
        }
    }

    /// Lenient lookup: case, '_' and '-' are ignored ("subBass", "sub-bass", "SUB_BASS")
    pub fn from_name(name: &str) -> Option<Self> {
        let key = normalize_key(name);
        Self::ALL
            .into_iter()
            .find(|band| normalize_key(band.name()) == key)
    }
}

/// Lowercase and strip separators so lookups accept camelCase and snake_case alike
pub(crate) fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized audio features for one tick
///
/// Every field except `bpm` lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Smoothed band levels, indexed by [`FrequencyBand::index`]
    pub bands: [f32; BAND_COUNT],
    /// Amplitude-weighted mean frequency / Nyquist
    pub spectral_centroid: f32,
    /// Frequency below which 85% of the energy lies / Nyquist
    pub spectral_rolloff: f32,
    /// Positive frame-to-frame amplitude change / bin count
    pub spectral_flux: f32,
    /// RMS level of the time-domain samples
    pub rms: f32,
    /// Onset detected this tick
    pub onset: bool,
    /// Onset strength (0 when no onset)
    pub onset_strength: f32,
    /// Tempo estimate in beats per minute
    pub bpm: f32,
}

impl FeatureFrame {
    /// Neutral tempo reported before enough onsets are observed
    pub const DEFAULT_BPM: f32 = 120.0;

    /// Frame with every feature at zero, carrying the given tempo
    pub fn silent(bpm: f32) -> Self {
        Self {
            bands: [0.0; BAND_COUNT],
            spectral_centroid: 0.0,
            spectral_rolloff: 0.0,
            spectral_flux: 0.0,
            rms: 0.0,
            onset: false,
            onset_strength: 0.0,
            bpm,
        }
    }

    /// Level of a single band
    pub fn band(&self, band: FrequencyBand) -> f32 {
        self.bands[band.index()]
    }

    /// Overall energy: mean band level
    pub fn energy(&self) -> f32 {
        self.bands.iter().sum::<f32>() / BAND_COUNT as f32
    }
}

impl Default for FeatureFrame {
    fn default() -> Self {
        Self::silent(Self::DEFAULT_BPM)
    }
}
