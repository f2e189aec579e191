//! WAV decoding for file playback

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Mono PCM decoded from a WAV file
#[derive(Debug, Clone)]
pub struct MonoPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoPcm {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Read a WAV file, scale to [-1, 1] and down-mix to mono
pub fn read_mono(path: &Path) -> Result<MonoPcm> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {:?}", path))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        bail!("WAV file {:?} has no channels or a zero sample rate", path);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .context("Failed to decode float samples")?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<Vec<f32>, _>>()
                .context("Failed to decode integer samples")?
        }
    };

    let channels = spec.channels as usize;
    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(MonoPcm {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_int_is_scaled_and_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..4000 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let pcm = read_mono(&path).unwrap();
        assert_eq!(pcm.sample_rate, 8000);
        assert_eq!(pcm.samples.len(), 4000);
        assert!((pcm.samples[0] - 0.25).abs() < 1e-6);
        assert!((pcm.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_mono(Path::new("/nonexistent/input.wav")).is_err());
    }
}
