//! Label a frame sequence with the threshold detector and link the results.
//!
//! Usage: label_and_link [FRAMES_DIR] [SESSION_JSON] [DETECTOR]
//!
//! Without a directory a short synthetic settling sequence is generated.

use anyhow::Context;
use floc_labeler::{CancelToken, DetectorKind, FrameSource, ImageSequenceSource, MemorySource, Session, SessionConfig};
use floctrack::ObjectSelection;
use image::{GrayImage, Luma};
use std::env;

fn synthetic_frames(n: u32) -> Vec<GrayImage> {
    (0..n)
        .map(|f| {
            let mut img = GrayImage::from_pixel(320, 240, Luma([220]));
            // (x, y, size, fall speed)
            for (x0, y0, size, speed) in [(40u32, 10u32, 6u32, 2u32), (150, 30, 10, 4), (260, 5, 4, 1)] {
                let y_start = y0 + speed * f;
                for y in y_start..(y_start + size).min(240) {
                    for x in x0..x0 + size {
                        img.put_pixel(x, y, Luma([30]));
                    }
                }
            }
            img
        })
        .collect()
}

fn run<S: FrameSource<Frame = GrayImage>>(session: &mut Session, source: &mut S) -> anyhow::Result<()> {
    let n_frames = source.frame_count() as u32;
    anyhow::ensure!(n_frames > 0, "no frames to label");

    let progress = |done: usize, total: usize| {
        if done == total {
            eprintln!("  labeled {}/{} frames", done, total);
        }
    };
    let report = session.label_with(source, 0, n_frames - 1, &CancelToken::new(), Some(&progress))?;
    eprintln!(
        "Pooled {} objects over {} frames ({} failed)",
        report.objects,
        report.frames,
        report.failures.len()
    );

    let summary = session.link(0, n_frames);
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);

    let store = session.store();
    for track_idx in store.track_ids() {
        let entries: Vec<_> = store.track(track_idx).collect();
        let (first, head) = entries[0];
        let (last, tail) = entries[entries.len() - 1];
        let frames = (last - first).max(1) as f64;
        println!(
            "track {:>3}: frames {:>3}..={:<3} area {:>4} velocity ({:+.2}, {:+.2}) px/frame",
            track_idx,
            first,
            last,
            head.area,
            (tail.centroid.x - head.centroid.x) / frames,
            (tail.centroid.y - head.centroid.y) / frames,
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let mut config = match args.get(2) {
        Some(path) => SessionConfig::from_file(path).with_context(|| format!("loading {}", path))?,
        None => SessionConfig::default(),
    };
    if let Some(name) = args.get(3) {
        config.detector = DetectorKind::from_name(name)?;
    }
    config.linker.auto_select = ObjectSelection::Auto;
    let mut session = Session::new(config)?;

    match args.get(1) {
        Some(dir) => {
            let mut source = ImageSequenceSource::open(dir).with_context(|| format!("opening {}", dir))?;
            run(&mut session, &mut source)
        }
        None => {
            eprintln!("No frame directory given, using a synthetic sequence");
            let mut source = MemorySource::new(synthetic_frames(30));
            run(&mut session, &mut source)
        }
    }
}
