use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{Rgb, RgbImage};
use shotweave_core::{
    export::{export_to_path, write_cube, ExportFormat},
    matching::{ColorLut, PortalMatch},
    EngineConfig, EngineError, PacingOptions, SequenceReport, TransitionEngine,
};
use tempfile::TempDir;

/// Writes a small sequence of synthetic stills and returns their paths.
fn write_shots(dir: &Path) -> Vec<PathBuf> {
    let frames = [
        RgbImage::from_fn(160, 120, |x, y| {
            if (x as f32 - 70.0).hypot(y as f32 - 60.0) < 32.0 {
                Rgb([20, 20, 30])
            } else {
                Rgb([210, 190, 160])
            }
        }),
        RgbImage::from_fn(160, 120, |x, y| {
            if (x as f32 - 90.0).hypot(y as f32 - 60.0) < 32.0 {
                Rgb([25, 20, 35])
            } else {
                Rgb([200, 185, 170])
            }
        }),
        RgbImage::from_fn(160, 120, |x, y| Rgb([(x + y) as u8, 60, 255 - x as u8])),
    ];
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let path = dir.join(format!("shot_{i}.png"));
            frame.save(&path).expect("write test frame");
            path
        })
        .collect()
}

fn engine() -> TransitionEngine {
    let mut config = EngineConfig::default();
    config.workers.threads = 2;
    TransitionEngine::new(config).expect("engine")
}

#[test]
fn missing_shots_do_not_abort_the_sequence() {
    let dir = TempDir::new().unwrap();
    let mut paths = write_shots(dir.path());
    paths.insert(1, dir.path().join("missing.png"));
    fs::write(dir.path().join("corrupt.png"), b"not a png").unwrap();
    paths.push(dir.path().join("corrupt.png"));

    let report = engine().analyze_sequence(&paths, &PacingOptions::default()).unwrap();

    assert_eq!(report.shots.len(), 3);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].index, 1);
    assert!(report.failures[0].error.contains("missing.png"));
    assert_eq!(report.failures[1].index, 4);
    assert_eq!(report.pairs.len(), 2);
    assert_eq!(report.pacing.shots.len(), 3);
    assert_eq!(report.timeline.events.len(), 3);
    assert_eq!(report.shots[0].shot_id.as_str(), "shot_0");
    assert_eq!(report.shots[1].shot_id.as_str(), "shot_1");
    assert!(report.shots.iter().all(|s| s.source.is_some()));
}

#[test]
fn single_shot_load_errors_are_explicit() {
    let dir = TempDir::new().unwrap();
    let err = engine().analyze_shot(dir.path().join("nope.jpg")).unwrap_err();
    assert!(matches!(err, EngineError::ImageLoad { .. }));
    assert!(err.is_shot_local());
}

#[test]
fn music_options_shape_the_plan() {
    let dir = TempDir::new().unwrap();
    let paths = write_shots(dir.path());
    let options = PacingOptions {
        target_total_duration: Some(9.0),
        music_energy_curve: Some(vec![0.1, 0.9, 0.5, 0.2]),
        beat_timestamps: Some((1..=40).map(|i| i as f32 * 0.5).collect()),
        ..Default::default()
    };
    let report = engine().analyze_sequence(&paths, &options).unwrap();

    assert!((report.pacing.total_duration - 9.0).abs() < 0.1);
    let music = report.music.as_ref().expect("music sync");
    assert_eq!(music.per_shot_match.len(), 3);
    assert!((0.0..=1.0).contains(&music.average_match));
    for event in &report.timeline.events {
        let beats = event.end_seconds / 0.5;
        assert!((beats - beats.round()).abs() < 1e-3);
    }
    assert!((report.timeline.total_duration - music.plan.total_duration).abs() < 1e-4);
}

#[test]
fn reports_export_and_round_trip() {
    let dir = TempDir::new().unwrap();
    let paths = write_shots(dir.path());
    let report = engine()
        .analyze_sequence(
            &paths,
            &PacingOptions {
                tempo_bpm: Some(96.0),
                ..Default::default()
            },
        )
        .unwrap();

    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    for format in [ExportFormat::Json, ExportFormat::Csv, ExportFormat::Edl] {
        export_to_path(&report, format, out.join(format!("report.{}", format.extension()))).unwrap();
    }

    let json = fs::read_to_string(out.join("report.json")).unwrap();
    let parsed: SequenceReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, report);

    let csv = fs::read_to_string(out.join("report.csv")).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.starts_with("index,shot_id,hold_duration"));

    let edl = fs::read_to_string(out.join("report.edl")).unwrap();
    assert!(edl.starts_with("TITLE: sequence report"));
    assert_eq!(edl.matches("* FROM CLIP NAME:").count(), 3);

    export_to_path(&report.pairs, ExportFormat::Csv, out.join("pairs.csv")).unwrap();
    let pairs = fs::read_to_string(out.join("pairs.csv")).unwrap();
    assert!(pairs.starts_with("source,target,rank,transition_type,duration,confidence,notes"));
}

#[test]
fn masks_and_luts_are_written_as_files() {
    let dir = TempDir::new().unwrap();
    let engine = engine();
    let paths = write_shots(dir.path());
    let a = engine.analyze_shot(&paths[0]).unwrap();
    let b = engine.analyze_shot(&paths[1]).unwrap();

    let config = engine.config();
    let portal = shotweave_core::matching::match_portals(&a.portals, &b.portals, &config.portal_match)
        .into_iter()
        .next()
        .expect("portal pair");
    let mask = PortalMatch::mask(&portal, &config.portal_match);
    let mask_path = dir.path().join("portal_mask.png");
    mask.save_png(&mask_path).unwrap();
    let reopened = image::open(&mask_path).unwrap().to_luma8();
    assert_eq!(reopened.dimensions(), (320, 180));

    let lut = ColorLut::transfer(&a.channel_stats, &b.channel_stats, 16);
    let cube_path = dir.path().join("grade.cube");
    write_cube(&lut, "shot_0 -> shot_1", &cube_path).unwrap();
    let cube = fs::read_to_string(&cube_path).unwrap();
    assert!(cube.contains("LUT_1D_SIZE 16"));
    assert_eq!(cube.lines().filter(|l| l.starts_with('0') || l.starts_with('1')).count(), 16);
}

#[test]
fn config_files_load_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{ "workers": { "threads": 1 }, "pacing": { "base_hold": 3.0 } }"#).unwrap();
    let config = EngineConfig::from_path(&path).unwrap();
    assert_eq!(config.workers.threads, 1);
    assert_eq!(config.pacing.base_hold, 3.0);
    assert_eq!(config.match_cut.window, 4);
    assert_eq!(TransitionEngine::new(config).unwrap().threads(), 1);
}
