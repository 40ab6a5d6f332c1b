use std::time::{Duration, Instant};
use tileview::{
    constants::DEFAULT_TICK_INTERVAL_MS,
    core::geo::{LatLng, Point},
    MapConfig, MapView,
};

/// How long to wait for one screenful of tiles before moving on.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives a map the way a GUI shell would: load the view, pan around, zoom,
/// and tick on a timer in between, logging what the grid and cache do.
///
/// Usage: `tileview-app [config.json]`
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => MapConfig::from_json_file(path)?,
        None => MapConfig {
            center: LatLng::new(56.451127, 84.964496),
            zoom: 15.0,
            ..MapConfig::default()
        },
    };

    let mut map = MapView::new(config, Point::new(800.0, 600.0))?;
    settle(&mut map, "initial view");

    for (dx, dy) in [(256.0, 0.0), (0.0, 256.0), (-512.0, -128.0)] {
        let stats = map.pan(dx, dy);
        log::info!("pan by ({dx}, {dy}): {stats:?}");
        settle(&mut map, "after pan");
    }

    let stats = map.set_zoom(f64::from(map.zoom()) + 1.0, 0.25, 0.25);
    log::info!("zoom in around the upper-left quarter: {stats:?}");
    settle(&mut map, "after zoom");

    let center = map.position();
    println!(
        "centre {:.6}, {:.6} at zoom {} on '{}'; {} tiles cached",
        center.lat,
        center.lng,
        map.zoom(),
        map.tile_server(),
        map.cache().len()
    );
    Ok(())
}

fn settle(map: &mut MapView, label: &str) {
    let started = Instant::now();
    let tick = Duration::from_millis(DEFAULT_TICK_INTERVAL_MS);
    while map.grid().pending_slots() > 0 && started.elapsed() < SETTLE_TIMEOUT {
        map.tick();
        std::thread::sleep(tick);
    }

    let (columns, rows) = map.grid().dimensions();
    let loaded = map.grid().slots().filter(|s| s.image.is_loaded()).count();
    log::info!(
        "{label}: {loaded}/{} tiles of a {columns}x{rows} grid in {:?}, {} still queued",
        columns * rows,
        started.elapsed(),
        map.pending_tiles()
    );
}
