use argh::FromArgs;
use glam::Vec2;
use lumaflow::flow::{FlowAnalyzer, FlowCapture, FlowConfig, VideoChunk, VideoFormat};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(FromArgs, Debug)]
/// Run the flow analyzer on a synthetic interlaced camera and print the
/// captured flow.
struct Args {
    /// path to a JSON flow configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
    /// number of fields to generate
    #[argh(option, short = 'n', default = "600")]
    fields: usize,
    /// video fields per second
    #[argh(option, short = 'r', default = "60")]
    rate: u64,
    /// peak motion of the synthetic scene, in decimated pixels per field
    #[argh(option, short = 's', default = "1.5")]
    speed: f32,
    /// filter rate of the smoothed capture
    #[argh(option, short = 'f', default = "0.1")]
    filter: f32,
    /// write annotated field images to this directory
    #[argh(option)]
    debug_dir: Option<PathBuf>,
}

fn texture(x: f32, y: f32) -> f32 {
    128.0 + 60.0 * (x * 0.21).sin() * (y * 0.17).cos() + 40.0 * ((x + 2.0 * y) * 0.09).sin()
}

// the scene drifts on a slow Lissajous path
fn scene_offset(field: usize, speed: f32) -> Vec2 {
    let t = field as f32;
    Vec2::new(
        speed * 40.0 * (t * 0.025).sin(),
        speed * 20.0 * (t * 0.04).cos(),
    )
}

/// Emit one field as scan lines split in two chunks each.
fn send_field(
    analyzer: &mut FlowAnalyzer,
    format: &VideoFormat,
    field: usize,
    offset: Vec2,
    line: &mut Vec<u8>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let decimate = analyzer.config().decimate.max(1) as f32;
    for y in 0..format.lines_per_field {
        line.clear();
        line.extend((0..format.pixels_per_line).flat_map(|x| {
            let luma = texture(x as f32 / decimate - offset.x, y as f32 - offset.y);
            [0x80, luma.clamp(0.0, 255.0) as u8]
        }));
        let split = line.len() / 2;
        analyzer.process(&VideoChunk::new(field, y, 0, &line[..split]))?;
        analyzer.process(&VideoChunk::new(field, y, split, &line[split..]))?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => FlowConfig::from_json_file(path)?,
        None => FlowConfig::default(),
    };
    if let Some(dir) = &args.debug_dir {
        std::fs::create_dir_all(dir)?;
        config.debug = true;
        config.debug_path = Some(dir.clone());
    }

    let format = VideoFormat::default();
    let mut analyzer = FlowAnalyzer::new(config, format)?;

    // two independent consumers: a smoothed position and a per-report delta
    let mut smooth = FlowCapture::new(analyzer.source());
    let mut delta = FlowCapture::new(analyzer.source());

    let cancel_token = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let cancel_token = cancel_token.clone();
        move || {
            println!("Received Ctrl-C signal. Sending cancel signal !!");
            cancel_token.store(true, Ordering::SeqCst);
        }
    })?;

    let field_period = Duration::from_micros(1_000_000 / args.rate.max(1));
    let ingest = std::thread::spawn({
        let cancel_token = cancel_token.clone();
        let (fields, speed) = (args.fields, args.speed);
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let mut line = Vec::with_capacity(format.bytes_per_line);
            for n in 0..fields {
                if cancel_token.load(Ordering::SeqCst) {
                    break;
                }
                // fields of one frame share the scene position
                let offset = scene_offset(n / 2, speed);
                send_field(&mut analyzer, &format, n % 2, offset, &mut line)?;
                std::thread::sleep(field_period);
            }
            log::info!("generated {fields} fields");
            cancel_token.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    while !cancel_token.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(250));

        smooth.capture(args.filter);
        delta.capture(1.0);
        println!(
            "smooth pixels ({:8.2}, {:8.2})  model ({:8.2}, {:8.2}, {:8.2})  delta ({:6.2}, {:6.2})  motion {:8.2}",
            smooth.pixels.x,
            smooth.pixels.y,
            smooth.model.x,
            smooth.model.y,
            smooth.model.z,
            delta.pixels.x,
            delta.pixels.y,
            delta.motion_length,
        );
        delta.origin();
    }

    match ingest.join() {
        Ok(result) => result.map_err(|e| e as Box<dyn std::error::Error>)?,
        Err(_) => return Err("ingestion thread panicked".into()),
    }

    Ok(())
}
