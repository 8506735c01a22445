//! Asynchronous tile loading on a fixed worker-thread pool.
//!
//! Fetching happens off the render thread; results travel back over a
//! channel and are applied to tile state by the owning source once per
//! frame. The render thread therefore never observes a tile changing state
//! mid-frame.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread;

use crate::core::geo::TileCoord;
use crate::prelude::Arc;
use crate::tiles::tile::TileImage;
use crate::{Error, Result};

/// Blocking fetch of a single tile's raster payload.
///
/// Implementations run on loader worker threads. Returning
/// [`Error::TileNotFound`] marks the coordinate as empty rather than failed;
/// any other error is retried and eventually surfaces as a tile error.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, coord: TileCoord) -> Result<TileImage>;
}

/// Result of a tile loading operation
#[derive(Debug)]
pub struct TileResult {
    pub coord: TileCoord,
    pub data: Result<TileImage>,
}

/// Configuration for the tile loader
#[derive(Debug, Clone)]
pub struct TileLoaderConfig {
    /// Number of worker threads; zero makes the loader inert (jobs are
    /// accepted and dropped), which tests use to freeze tiles mid-load
    pub workers: usize,
    /// Maximum number of retry attempts per tile
    pub max_retries: u32,
    /// Delay between retry attempts
    pub retry_delay: std::time::Duration,
}

impl Default for TileLoaderConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 2,
            retry_delay: std::time::Duration::from_millis(100),
        }
    }
}

impl TileLoaderConfig {
    pub fn low_resource() -> Self {
        Self {
            workers: 1,
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(250),
        }
    }

    /// Inert loader: enqueued tiles stay in the loading state forever
    pub fn for_testing() -> Self {
        Self {
            workers: 0,
            max_retries: 0,
            retry_delay: std::time::Duration::from_millis(0),
        }
    }
}

/// Tile loader that fetches tiles on background threads and reports results
/// over a channel drained by the render thread
pub struct TileLoader {
    job_tx: Sender<TileCoord>,
    result_rx: Receiver<TileResult>,
    config: TileLoaderConfig,
}

impl TileLoader {
    pub fn new(fetcher: Arc<dyn TileFetcher>, config: TileLoaderConfig) -> Self {
        let (job_tx, job_rx) = unbounded::<TileCoord>();
        let (result_tx, result_rx) = unbounded::<TileResult>();

        for index in 0..config.workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let fetcher = fetcher.clone();
            let worker_config = config.clone();
            thread::Builder::new()
                .name(format!("tile-loader-{index}"))
                .spawn(move || {
                    Self::run_worker(&job_rx, &result_tx, fetcher.as_ref(), &worker_config);
                })
                .expect("failed to spawn tile loader worker");
        }

        Self {
            job_tx,
            result_rx,
            config,
        }
    }

    fn run_worker(
        job_rx: &Receiver<TileCoord>,
        result_tx: &Sender<TileResult>,
        fetcher: &dyn TileFetcher,
        config: &TileLoaderConfig,
    ) {
        while let Ok(coord) = job_rx.recv() {
            let mut attempt = 0;
            let data = loop {
                match fetcher.fetch(coord) {
                    Ok(image) => break Ok(image),
                    // absence is a terminal answer, not a failure
                    Err(Error::TileNotFound) => break Err(Error::TileNotFound),
                    Err(error) => {
                        if attempt >= config.max_retries {
                            log::warn!("giving up on tile {}: {}", coord, error);
                            break Err(error);
                        }
                        attempt += 1;
                        log::debug!("tile {} failed on attempt {}: {}", coord, attempt, error);
                        thread::sleep(config.retry_delay);
                    }
                }
            };
            if result_tx.send(TileResult { coord, data }).is_err() {
                // loader dropped; nobody is listening anymore
                break;
            }
        }
    }

    /// Hand a tile to the worker pool. Safe to call from the render thread.
    pub fn enqueue(&self, coord: TileCoord) {
        if self.job_tx.send(coord).is_err() {
            log::debug!("tile {} dropped: loader has no workers", coord);
        }
    }

    /// Collect all finished results without blocking
    pub fn drain(&self) -> Vec<TileResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            results.push(result);
        }
        results
    }

    pub fn config(&self) -> &TileLoaderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SolidFetcher;

    impl TileFetcher for SolidFetcher {
        fn fetch(&self, coord: TileCoord) -> Result<TileImage> {
            if coord.z == 0 {
                return Err(Error::TileNotFound);
            }
            Ok(TileImage::solid(4, 4, [coord.x as u8, coord.y as u8, coord.z, 255]))
        }
    }

    #[test]
    fn test_loader_round_trip() {
        let loader = TileLoader::new(Arc::new(SolidFetcher), TileLoaderConfig::default());
        loader.enqueue(TileCoord::new(1, 2, 3));

        let mut results = Vec::new();
        for _ in 0..100 {
            results.extend(loader.drain());
            if !results.is_empty() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].coord, TileCoord::new(1, 2, 3));
        let image = results[0].data.as_ref().unwrap();
        assert_eq!(image.pixel(0, 0), Some([1, 2, 3, 255]));
    }

    #[test]
    fn test_not_found_is_reported_verbatim() {
        let loader = TileLoader::new(Arc::new(SolidFetcher), TileLoaderConfig::default());
        loader.enqueue(TileCoord::new(0, 0, 0));

        let mut results = Vec::new();
        for _ in 0..100 {
            results.extend(loader.drain());
            if !results.is_empty() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(matches!(results[0].data, Err(Error::TileNotFound)));
    }

    #[test]
    fn test_inert_loader_never_answers() {
        let loader = TileLoader::new(Arc::new(SolidFetcher), TileLoaderConfig::for_testing());
        loader.enqueue(TileCoord::new(1, 1, 1));
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(loader.drain().is_empty());
    }
}
