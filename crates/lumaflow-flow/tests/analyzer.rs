use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use glam::Vec2;
use lumaflow_flow::{FlowAnalyzer, FlowCapture, FlowConfig, FlowError, VideoChunk, VideoFormat};
use rand::{rngs::StdRng, SeedableRng};

fn texture(x: f32, y: f32) -> f32 {
    128.0 + 60.0 * (x * 0.35).sin() * (y * 0.27).cos() + 40.0 * ((x + y) * 0.19).sin()
}

// 96x96 decimated field images
fn analyzer(config: FlowConfig) -> Result<FlowAnalyzer<StdRng>, FlowError> {
    FlowAnalyzer::with_rng(
        FlowConfig {
            decimate: 2,
            ..config
        },
        VideoFormat::new(192, 96),
        StdRng::seed_from_u64(1234),
    )
}

fn line_bytes(format: &VideoFormat, decimate: usize, y: usize, shift: Vec2) -> Vec<u8> {
    (0..format.pixels_per_line)
        .flat_map(|x| {
            let u = x as f32 / decimate as f32;
            let luma = texture(u - shift.x, y as f32 - shift.y).round().clamp(0.0, 255.0);
            [0x80, luma as u8]
        })
        .collect()
}

// one field of the texture translated by `shift`, two chunks per line
fn send_field(
    analyzer: &mut FlowAnalyzer<StdRng>,
    field: usize,
    shift: Vec2,
) -> Result<(), FlowError> {
    let format = *analyzer.format();
    let decimate = analyzer.config().decimate;
    for y in 0..format.lines_per_field {
        let line = line_bytes(&format, decimate, y, shift);
        let split = line.len() / 2 + 3;
        analyzer.process(&VideoChunk::new(field, y, 0, &line[..split]))?;
        analyzer.process(&VideoChunk::new(field, y, split, &line[split..]))?;
    }
    Ok(())
}

#[test]
fn static_scene_adds_no_flow() -> Result<(), FlowError> {
    let mut analyzer = analyzer(FlowConfig {
        max_points: 1,
        ..Default::default()
    })?;
    let mut flow = FlowCapture::new(analyzer.source());

    send_field(&mut analyzer, 0, Vec2::ZERO)?;
    send_field(&mut analyzer, 0, Vec2::ZERO)?;

    flow.capture(1.0);
    assert!(analyzer.points(0).is_empty());
    assert_eq!(flow.pixels, Vec2::ZERO);
    assert_eq!(flow.motion_length, 0.0);

    Ok(())
}

#[test]
fn horizontal_motion_is_measured() -> Result<(), FlowError> {
    let mut analyzer = analyzer(FlowConfig::default())?;
    let mut flow = FlowCapture::new(analyzer.source());

    for k in 0..40 {
        let shift = Vec2::new(0.5 * k as f32, 0.0);
        send_field(&mut analyzer, 0, shift)?;
        send_field(&mut analyzer, 1, shift)?;
    }

    flow.capture(1.0);
    assert!(!analyzer.points(0).is_empty());
    assert!(!analyzer.points(1).is_empty());
    assert!(
        flow.pixels.x > 4.0 && flow.pixels.x < 41.0,
        "pixels {:?}",
        flow.pixels
    );
    assert!(flow.pixels.y.abs() < 2.0, "pixels {:?}", flow.pixels);
    assert!(flow.motion_length > 0.0);
    assert_eq!(flow.model.y, 0.0);
    assert_eq!(flow.model.z, -flow.pixels.y);

    Ok(())
}

#[test]
fn unit_velocity_adds_one_pixel_per_field() -> Result<(), FlowError> {
    let mut analyzer = analyzer(FlowConfig::default())?;
    let source = analyzer.source();
    let settle = analyzer.config().point_trial_period as usize + 3;

    let mut last = source.snapshot();
    for k in 0..30 {
        send_field(&mut analyzer, 0, Vec2::new(k as f32, 0.0))?;

        let now = source.snapshot();
        let delta = now.displacement_since(&last);
        last = now;

        if k >= settle {
            assert!((delta.x - 1.0).abs() < 0.01, "field {k}: delta {delta:?}");
            assert!(delta.y.abs() < 0.01, "field {k}: delta {delta:?}");
        }
    }
    assert!(analyzer.points(1).is_empty());

    Ok(())
}

#[test]
fn invalid_chunks_leave_state_untouched() -> Result<(), FlowError> {
    let mut analyzer = analyzer(FlowConfig::default())?;
    for k in 0..3 {
        send_field(&mut analyzer, 0, Vec2::new(k as f32, 0.0))?;
    }
    let points = analyzer.points(0).to_vec();
    let snapshot = analyzer.source().snapshot();

    let bytes = [255u8; 64];
    assert!(analyzer.process(&VideoChunk::new(0, 96, 0, &bytes)).is_err());
    assert!(analyzer.process(&VideoChunk::new(0, 95, 380, &bytes)).is_err());

    assert_eq!(analyzer.points(0), points.as_slice());
    assert_eq!(analyzer.source().snapshot(), snapshot);

    Ok(())
}

#[test]
fn out_of_order_lines_are_accepted() -> Result<(), FlowError> {
    let mut analyzer = analyzer(FlowConfig::default())?;
    let format = *analyzer.format();

    // bottom line first, the field completes on the last line's final chunk
    let last = format.lines_per_field - 1;
    for y in (0..last).rev() {
        let line = line_bytes(&format, 2, y, Vec2::ZERO);
        analyzer.process(&VideoChunk::new(1, y, 0, &line))?;
    }
    let line = line_bytes(&format, 2, last, Vec2::ZERO);
    analyzer.process(&VideoChunk::new(1, last, 0, &line))?;

    // the completed field became the previous image: an identical field
    // brings nothing new to discover
    send_field(&mut analyzer, 1, Vec2::ZERO)?;
    assert!(analyzer.points(1).is_empty());

    Ok(())
}

#[test]
fn random_eviction_keeps_population_small() -> Result<(), FlowError> {
    let mut analyzer = analyzer(FlowConfig {
        delete_point_probability: 1.0,
        ..Default::default()
    })?;

    for k in 0..10 {
        send_field(&mut analyzer, 0, Vec2::new(0.5 * k as f32, 0.0))?;
        assert!(analyzer.points(0).len() <= 1);
    }

    Ok(())
}

#[test]
fn debug_images_written_on_interval() -> Result<(), FlowError> {
    let dir = tempfile::tempdir()?;
    let mut analyzer = analyzer(FlowConfig {
        debug: true,
        debug_frame_interval: 2,
        debug_path: Some(dir.path().to_path_buf()),
        ..Default::default()
    })?;

    for k in 0..5 {
        send_field(&mut analyzer, k % 2, Vec2::ZERO)?;
    }

    let written = std::fs::read_dir(dir.path())?.count();
    assert_eq!(written, 2);

    Ok(())
}

#[test]
fn debug_images_default_to_working_directory() -> Result<(), FlowError> {
    let dir = tempfile::tempdir()?;
    let cwd = std::env::current_dir()?;
    std::env::set_current_dir(dir.path())?;

    let result = analyzer(FlowConfig {
        debug: true,
        ..Default::default()
    })
    .and_then(|mut analyzer| {
        (0..3).try_for_each(|k| send_field(&mut analyzer, 0, Vec2::new(k as f32, 0.0)))
    });
    std::env::set_current_dir(cwd)?;
    result?;

    let written = std::fs::read_dir(dir.path())?.count();
    assert_eq!(written, 3);

    Ok(())
}

#[test]
fn captures_read_while_analyzer_runs() -> Result<(), FlowError> {
    let mut analyzer = analyzer(FlowConfig::default())?;
    let source = analyzer.source();
    let done = Arc::new(AtomicBool::new(false));
    let mut smooth = FlowCapture::new(source.clone());
    let mut raw = FlowCapture::new(source.clone());

    let ingest = {
        let done = done.clone();
        std::thread::spawn(move || {
            let result = (0..30).try_for_each(|k| {
                let shift = Vec2::new(0.0, 0.4 * k as f32);
                send_field(&mut analyzer, 0, shift)?;
                send_field(&mut analyzer, 1, shift)
            });
            done.store(true, Ordering::Release);
            result
        })
    };

    while !done.load(Ordering::Acquire) {
        smooth.capture(0.2);
        raw.capture(1.0);
        assert!(raw.pixels.is_finite());
        std::thread::yield_now();
    }

    let result = ingest.join();
    assert!(matches!(result, Ok(Ok(()))));

    raw.capture(1.0);
    let total = source.snapshot().displacement_since(&Default::default());
    assert_eq!(raw.pixels, total);
    assert!(raw.pixels.y > 4.0, "pixels {:?}", raw.pixels);

    Ok(())
}
