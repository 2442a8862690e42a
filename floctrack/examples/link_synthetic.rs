use floctrack::{
    BoundingBox, Linker, LinkerConfig, LinkerKind, Object, ObjectSelection, Point, TrackStore,
};

fn particle(frame: u32, idx: u32, x: f64, y: f64, area: u32) -> (u32, Object) {
    let (xi, yi) = (x as i32, y as i32);
    let contour = vec![(xi - 3, yi - 3), (xi + 3, yi - 3), (xi + 3, yi + 3), (xi - 3, yi + 3)];
    let obj = Object::new(
        frame,
        idx,
        Point::new(x, y),
        area,
        contour,
        BoundingBox::new(xi - 3, yi - 3, 7, 7),
    );
    (idx, obj)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Linking synthetic settling particles...");

    // Three flocs sinking at different speeds; the middle one is lost at frame 6
    let mut store = TrackStore::new();
    for f in 0..10u32 {
        let t = f as f64;
        let mut objs = vec![
            particle(f, 1, 100.0, 20.0 + 3.0 * t, 40),
            particle(f, 2, 300.0, 20.0 + 6.0 * t, 120),
        ];
        if f != 6 {
            objs.push(particle(f, 3, 500.0, 20.0 + 1.5 * t, 15));
        }
        store.insert_frame(f, objs.into_iter().collect())?;
    }

    let linker = LinkerKind::LinearFlocs.create(LinkerConfig {
        auto_select: ObjectSelection::Auto,
        ..LinkerConfig::default()
    });

    // Found tracks on frame 0 only, then link without creating new ones
    linker.link(&mut store, 0, 1);
    let follow = LinkerKind::LinearFlocs.create(LinkerConfig::default());
    let summary = follow.link(&mut store, 1, 9);
    println!("{:?}", summary);

    for track_idx in store.track_ids() {
        let entries: Vec<_> = store.track(track_idx).collect();
        let (first, last) = (entries[0].0, entries[entries.len() - 1].0);
        let mean_error: f64 = entries.iter().skip(1).map(|(_, o)| o.match_error).sum::<f64>()
            / (entries.len().max(2) - 1) as f64;
        println!(
            "  Track {}: frames {}..={} ({} entries), mean match error {:.2}",
            track_idx,
            first,
            last,
            entries.len(),
            mean_error
        );
    }
    println!("Objects left in pool: {}", store.num_pooled());

    Ok(())
}
