use hyperpulse_core::choreography::CatalogUpdate;
use hyperpulse_core::{
    AudioBuffers, AudioLinkMode, CandidateRef, ChoreographyTimeline, ColorShiftMode, CoreError,
    CycleDirection, EngineContext, FeatureFrame, FeatureSource, FrequencyBand, GeometryCatalog,
    GeometryDirective, GeometryMode, ParameterDescriptor, ParameterValue, RotationMode, Scheduler,
    Sequence, SequenceAction, SequenceEffects,
};
use std::collections::VecDeque;

fn energetic(level: f32) -> FeatureFrame {
    let mut frame = FeatureFrame::default();
    frame.bands = [level; hyperpulse_core::audio::BAND_COUNT];
    frame
}

fn show() -> ChoreographyTimeline {
    let mut timeline = ChoreographyTimeline::new(GeometryCatalog::visualizer_defaults(), 3);

    let mut intro = SequenceEffects {
        system: Some("faceted".to_string()),
        geometry: Some(GeometryDirective::Named("hypercube".to_string())),
        rotation: Some(RotationMode::Auto),
        chaos: Some(0.25),
        speed: Some(0.5),
        color_shift: Some(ColorShiftMode::Cycle),
        ..Default::default()
    };
    intro.parameters.insert(
        "gridDensity".to_string(),
        ParameterDescriptor::AudioLinked {
            axis: FeatureSource::Band(FrequencyBand::Bass),
            scale: 20.0,
            mode: AudioLinkMode::Add,
            base: 10.0,
        },
    );
    intro.parameters.insert(
        "morphFactor".to_string(),
        ParameterDescriptor::Wave {
            speed: 0.5,
            amplitude: 0.25,
            phase: 0.0,
            offset: 0.5,
        },
    );
    intro
        .parameters
        .insert("palette".to_string(), ParameterDescriptor::NamedLookup("ember".to_string()));
    intro
        .actions
        .push(SequenceAction::new("flash").with_args(serde_json::json!({"ms": 120})));

    let peak = SequenceEffects {
        geometry: Some(GeometryDirective::Mode(GeometryMode::Cycle {
            interval: 2.0,
            candidates: vec![
                CandidateRef::Index(4),
                CandidateRef::Name("sphere".to_string()),
                CandidateRef::Index(6),
            ],
            direction: CycleDirection::Forward,
            start_index: None,
        })),
        rotation: Some(RotationMode::Chaos),
        ..Default::default()
    };

    let breakdown = SequenceEffects {
        geometry: Some(GeometryDirective::Mode(GeometryMode::Random {
            candidates: Vec::new(),
            threshold: Some(0.5),
            min_interval: Some(1.5),
            feature: Some(FeatureSource::Band(FrequencyBand::SubBass)),
        })),
        ..Default::default()
    };

    timeline
        .add_sequence(Sequence::new(0.0, 8.0).with_effects(intro))
        .unwrap();
    timeline
        .add_sequence(Sequence::new(8.0, 10.0).with_effects(peak))
        .unwrap();
    timeline
        .add_sequence(Sequence::new(18.0, 6.0).with_effects(breakdown))
        .unwrap();
    timeline
}

#[test]
fn test_cycle_picks_candidate_by_elapsed_steps() {
    let mut timeline = show();
    let frame = FeatureFrame::default();

    // 5 s into the second sequence: floor(5 / 2) mod 3 = 2
    let out = timeline.evaluate(13.0, &frame);
    assert_eq!(out.active_sequence, Some(1));
    assert_eq!(out.geometry, 6);

    assert_eq!(timeline.evaluate(8.5, &frame).geometry, 4);
    assert_eq!(timeline.evaluate(10.5, &frame).geometry, 2);
}

#[test]
fn test_random_reselect_schedule() {
    let mut timeline = ChoreographyTimeline::new(GeometryCatalog::visualizer_defaults(), 11);
    timeline
        .add_sequence(Sequence::new(0.0, 30.0).with_effects(SequenceEffects {
            geometry: Some(GeometryDirective::Mode(
                GeometryMode::from_keyword("random").unwrap(),
            )),
            ..Default::default()
        }))
        .unwrap();

    timeline.evaluate(0.0, &energetic(0.8));
    assert_eq!(
        timeline.resolver().state().last_random_change_time,
        Some(0.0)
    );

    timeline.evaluate(0.5, &energetic(0.9));
    assert_eq!(
        timeline.resolver().state().last_random_change_time,
        Some(0.0)
    );

    timeline.evaluate(1.0, &energetic(0.9));
    assert_eq!(
        timeline.resolver().state().last_random_change_time,
        Some(1.0)
    );
}

#[test]
fn test_resolved_geometry_follows_catalog_changes() {
    let mut timeline = show();
    let tx = timeline.resolver_mut().catalog_channel();
    let frame = FeatureFrame::default();

    assert_eq!(timeline.evaluate(13.0, &frame).geometry, 6);

    tx.send(CatalogUpdate::Replace(GeometryCatalog::new(["a", "b", "sphere", "d"])))
        .unwrap();
    // Candidate 6 wraps into the smaller catalog
    assert_eq!(timeline.evaluate(13.0, &frame).geometry, 2);

    tx.send(CatalogUpdate::Replace(GeometryCatalog::default()))
        .unwrap();
    assert_eq!(timeline.evaluate(13.0, &frame).geometry, 0);
}

#[test]
fn test_export_import_round_trip() {
    let timeline = show();
    let json = timeline.export_json().unwrap();

    let mut restored = ChoreographyTimeline::new(GeometryCatalog::visualizer_defaults(), 3);
    let report = restored.import_json(&json).unwrap();

    assert_eq!(report.imported, 3);
    assert_eq!(report.rejected, 0);
    assert_eq!(restored.sequences(), timeline.sequences());
}

#[test]
fn test_file_round_trip() {
    let timeline = show();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("show.json");
    timeline.save_to_path(&path).unwrap();

    let mut restored = ChoreographyTimeline::new(GeometryCatalog::visualizer_defaults(), 3);
    restored.load_from_path(&path).unwrap();
    assert_eq!(restored.sequences(), timeline.sequences());

    assert!(matches!(
        restored.load_from_path(dir.path().join("missing.json")),
        Err(CoreError::Io(_))
    ));
}

#[test]
fn test_import_rejects_non_array_and_preserves_list() {
    let mut timeline = show();
    let before = timeline.sequences().to_vec();

    for document in [
        r#"{"sequences": []}"#,
        r#""intro""#,
        "42",
        "[{\"time\": 0",
    ] {
        assert!(timeline.import_json(document).is_err(), "{}", document);
        assert_eq!(timeline.sequences(), &before[..]);
    }
}

#[test]
fn test_exchange_format_field_names() {
    let json: serde_json::Value = serde_json::from_str(&show().export_json().unwrap()).unwrap();
    let intro = &json[0];
    assert_eq!(intro["time"], 0.0);
    assert_eq!(intro["duration"], 8.0);
    assert_eq!(intro["effects"]["geometry"], "hypercube");
    assert_eq!(intro["effects"]["colorShift"], "cycle");
    assert_eq!(intro["effects"]["actions"][0]["type"], "flash");
    assert_eq!(json[1]["effects"]["geometry"]["mode"], "cycle");
    assert_eq!(json[1]["effects"]["geometry"]["candidates"][1], "sphere");
}

#[test]
fn test_descriptors_resolve_into_base_values() {
    let mut timeline = show();
    let mut frame = FeatureFrame::default();
    frame.bands[FrequencyBand::Bass.index()] = 0.5;

    let out = timeline.evaluate(0.5, &frame);
    assert_eq!(out.base_values["gridDensity"], ParameterValue::Number(20.0));
    assert_eq!(out.base_values["palette"].as_text(), Some("ember"));
    assert_eq!(out.base_values["hueShift"], ParameterValue::Number(1.0));
    assert_eq!(out.geometry, 1);

    let wave = out.base_values["morphFactor"].as_number().unwrap();
    assert!((wave - 0.75).abs() < 1e-5, "wave={}", wave);
}

#[test]
fn test_minimal_rotation_and_zero_chaos_still_react() {
    let buffers = AudioBuffers {
        frequency: vec![0.7; 1024],
        time_domain: vec![0.3; 512],
        sample_rate: 48000,
    };
    let input: VecDeque<AudioBuffers> = std::iter::repeat(buffers).take(20).collect();
    let mut scheduler = Scheduler::new(EngineContext::default()).with_input(input);
    scheduler
        .timeline_mut()
        .add_sequence(Sequence::new(0.0, 60.0).with_effects(SequenceEffects {
            rotation: Some(RotationMode::Minimal),
            color_shift: Some(ColorShiftMode::Freeze),
            chaos: Some(0.0),
            ..Default::default()
        }))
        .unwrap();

    for _ in 0..20 {
        let snapshot = scheduler.tick(1.0 / 60.0);
        let chaos = snapshot.values["chaos"].as_number().unwrap();
        assert!(chaos > 0.0, "tick {} chaos={}", snapshot.tick, chaos);

        let rotation = snapshot.values["rot4dXW"].as_number().unwrap();
        assert!(rotation > 0.0);
        assert_eq!(snapshot.values["rotationMode"].as_text(), Some("minimal"));
    }
}
