mod common;

use common::{png_tile, settle, RecordingFetcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tileview::core::config::{LoaderConfig, StorageConfig};
use tileview::tiles::grid::SlotId;
use tileview::tiles::loader::TileTask;
use tileview::tiles::store::{SqliteTileStore, TileStore};
use tileview::{LatLng, MapConfig, MapView, Point, ServerId, TileCache, TileCoord, TileKey, TileLoader, TileServer};

#[cfg(test)]
mod loader_pipeline_tests {
    use super::*;

    fn task(x: i64, y: i64, z: u8, server: &Arc<TileServer>) -> TileTask {
        TileTask::new(
            TileKey::new(TileCoord::new(x, y, z), server.id),
            SlotId((x * 1_000 + y) as u64),
            Arc::clone(server),
        )
    }

    fn drain(loader: &TileLoader, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut received = 0;
        while received < expected {
            assert!(Instant::now() < deadline, "only {received} of {expected} results arrived");
            received += loader.try_recv_results().len();
            std::thread::sleep(Duration::from_millis(2));
        }
        received
    }

    #[test]
    fn test_fifty_tasks_drain_completely() {
        let fetcher = Arc::new(RecordingFetcher::serving_tiles());
        let cache = TileCache::new(1_000);
        let loader = TileLoader::new(&LoaderConfig::default(), &StorageConfig::None, cache.clone(), fetcher.clone());
        let server = Arc::new(TileServer::openstreetmap());

        loader.submit_batch((0..50).map(|i| task(i, 7, 12, &server)));
        assert_eq!(drain(&loader, 50), 50);

        assert_eq!(loader.pending_count(), 0);
        assert_eq!(fetcher.calls(), 50);
        assert_eq!(cache.len(), 50);
    }

    #[test]
    fn test_cached_tiles_are_never_fetched() {
        let fetcher = Arc::new(RecordingFetcher::serving_tiles());
        let cache = TileCache::new(100);
        let server = Arc::new(TileServer::openstreetmap());
        let image = Arc::new(image::RgbaImage::new(256, 256));
        for x in 0..10 {
            cache.put(TileKey::new(TileCoord::new(x, 0, 5), ServerId::default()), Arc::clone(&image));
        }

        let loader = TileLoader::new(&LoaderConfig::for_testing(), &StorageConfig::None, cache, fetcher.clone());
        loader.submit_batch((0..10).map(|x| task(x, 0, 5, &server)));
        drain(&loader, 10);
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn test_offline_map_reads_from_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");
        let server = TileServer::openstreetmap();

        // seed every tile the initial view needs
        let store = SqliteTileStore::create(&path).unwrap();
        for x in 96469..=96472 {
            for y in 40518..=40521 {
                store.save(&server, TileCoord::new(x, y, 17), &png_tile(64)).unwrap();
            }
        }
        drop(store);

        let fetcher = Arc::new(RecordingFetcher::serving_tiles());
        let config = MapConfig {
            center: LatLng::new(56.451127, 84.964496),
            zoom: 17.0,
            loader: LoaderConfig {
                offline_only: true,
                ..LoaderConfig::for_testing()
            },
            storage: StorageConfig::Database { path: path.clone() },
            ..MapConfig::for_testing()
        };
        let mut map = MapView::with_fetcher(config, Point::new(300.0, 200.0), fetcher.clone()).unwrap();
        settle(&mut map);

        assert_eq!(fetcher.calls(), 0);
        assert!(map.grid().slots().all(|s| s.image.is_loaded()));

        // the map recorded the server it reads tiles for
        let servers = SqliteTileStore::open(&path).unwrap().servers().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].1, 19);
    }

    #[test]
    fn test_fetched_tiles_land_in_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(RecordingFetcher::serving_tiles());
        let config = MapConfig {
            center: LatLng::new(56.451127, 84.964496),
            zoom: 17.0,
            loader: LoaderConfig {
                persist_fetched: true,
                ..LoaderConfig::for_testing()
            },
            storage: StorageConfig::Files {
                root: dir.path().to_path_buf(),
            },
            ..MapConfig::for_testing()
        };
        let mut map = MapView::with_fetcher(config, Point::new(300.0, 200.0), fetcher.clone()).unwrap();
        settle(&mut map);
        assert_eq!(fetcher.calls(), 6);

        let center = map.viewport().center_tile();
        let path = dir
            .path()
            .join("OpenStreetMap")
            .join("17")
            .join(center.x.to_string())
            .join(format!("{}.png", center.y));
        assert_eq!(std::fs::read(path).unwrap(), png_tile(128));
    }

    #[test]
    fn test_stale_results_are_dropped_after_zoom() {
        let fetcher = Arc::new(RecordingFetcher::serving_tiles());
        let config = MapConfig {
            center: LatLng::new(56.451127, 84.964496),
            zoom: 17.0,
            ..MapConfig::for_testing()
        };
        let mut map = MapView::with_fetcher(config, Point::new(300.0, 200.0), fetcher).unwrap();

        // zoom away before a single tick: every result of zoom 17 is stale
        map.set_zoom(10.0, 0.5, 0.5);
        settle(&mut map);
        assert_eq!(map.zoom(), 10);
        assert!(map.grid().slots().all(|s| s.coord.z == 10 && s.image.is_loaded()));
    }
}
