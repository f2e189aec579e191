use hyperpulse_core::{
    AudioBuffers, AudioInput, EngineConfig, EngineContext, FeatureExtractor, FrequencyBand,
    MappingPreset, ParameterValue, PcmSource, Scheduler, SpectrumConfig,
};
use std::collections::VecDeque;

fn sine(freq: f32, amplitude: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
    let count = (seconds * sample_rate as f32) as usize;
    (0..count)
        .map(|i| {
            (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * amplitude
        })
        .collect()
}

fn flat(level: f32) -> AudioBuffers {
    AudioBuffers {
        frequency: vec![level; 512],
        time_domain: vec![level; 256],
        sample_rate: 44100,
    }
}

#[test]
fn test_pcm_bass_tone_lands_in_bass_band() {
    let config = SpectrumConfig::default();
    let mut source = PcmSource::for_tick_rate(sine(80.0, 0.8, 1.0, 44100), 60.0, config);
    let mut extractor = FeatureExtractor::default();

    let mut frame = extractor.silent_frame();
    let mut tick = 0;
    while let Some(buffers) = source.next_buffers(tick as f64 / 60.0) {
        frame = extractor.extract(&buffers, tick as f64 / 60.0);
        tick += 1;
    }

    assert_eq!(tick, 60);
    let bass = frame.band(FrequencyBand::Bass);
    let air = frame.band(FrequencyBand::Air);
    assert!(bass > 0.02, "bass={}", bass);
    assert!(air < 0.01, "air={}", air);
    assert!(frame.rms > 0.3, "rms={}", frame.rms);
}

#[test]
fn test_periodic_onsets_set_tempo() {
    let mut extractor = FeatureExtractor::default();
    let mut onsets = 0;

    for i in 0..20 {
        let now = i as f64 * 0.3;
        let level = if i % 2 == 0 { 0.9 } else { 0.0 };
        let frame = extractor.extract(&flat(level), now);
        if frame.onset {
            onsets += 1;
        }
    }

    // The first loud frame has no previous spectrum to compare against
    assert_eq!(onsets, 9);
    assert!((extractor.bpm() - 100.0).abs() < 0.5, "bpm={}", extractor.bpm());
}

#[test]
fn test_unavailable_audio_falls_back_to_range_minimums() {
    let config = EngineConfig {
        preset: Some(MappingPreset::Visualizer),
        ..Default::default()
    };
    let mut scheduler = Scheduler::new(EngineContext::new(config.clone()));
    let mapper = config.build_mapper();

    let snapshot = scheduler.tick(1.0 / 60.0);
    for mapping in mapper.mappings() {
        assert_eq!(
            snapshot.values[&mapping.name],
            ParameterValue::Number(mapping.min),
            "{} should rest at its minimum",
            mapping.name
        );
    }
    assert_eq!(snapshot.features.bpm, 120.0);
}

#[test]
fn test_scheduler_reacts_to_audio() {
    let loud: VecDeque<AudioBuffers> = std::iter::repeat(flat(0.8)).take(40).collect();
    let mut scheduler = Scheduler::new(EngineContext::default()).with_input(loud);

    let quiet = scheduler.tick(0.0).values["chaos"].as_number().unwrap();
    let mut chaos = quiet;
    for _ in 0..40 {
        chaos = scheduler.tick(1.0 / 60.0).values["chaos"].as_number().unwrap();
    }
    assert!(chaos > quiet);
    assert!(chaos <= 0.4 + 1e-6);

    // Input exhausted: values decay back toward the minimum
    for _ in 0..300 {
        chaos = scheduler.tick(1.0 / 60.0).values["chaos"].as_number().unwrap();
    }
    assert!(chaos < 0.01, "chaos={}", chaos);
}
