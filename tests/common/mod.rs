#![allow(dead_code)]

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tileview::tiles::fetch::{FetchError, TileFetcher};
use tileview::MapView;

/// A solid 256px PNG
pub fn png_tile(shade: u8) -> Vec<u8> {
    let image = RgbaImage::from_pixel(256, 256, Rgba([shade, shade, shade, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Fetcher that records every URL it is asked for
pub struct RecordingFetcher {
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
    fail_with: Option<u16>,
}

impl RecordingFetcher {
    pub fn serving_tiles() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    pub fn failing_with_status(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::serving_tiles()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl TileFetcher for RecordingFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        match self.fail_with {
            Some(status) => Err(FetchError::Status(status)),
            None => Ok(png_tile(128)),
        }
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Ticks until no slot waits for an image
pub fn settle(map: &mut MapView) {
    init_logging();
    let deadline = Instant::now() + Duration::from_secs(10);
    while map.pending_tiles() > 0 || map.grid().pending_slots() > 0 {
        assert!(Instant::now() < deadline, "tiles never arrived");
        map.tick();
        std::thread::sleep(Duration::from_millis(2));
    }
    map.tick();
}
