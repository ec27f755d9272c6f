//! Block streaming engine: tile-by-tile read, transform and write of every
//! band, with progress after each tile and cancellation between tiles.
use std::num::NonZeroUsize;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, trace};

use crate::core::progress::{CancelToken, MonotonicProgress, ProgressSink};
use crate::core::tiles::TileGrid;
use crate::core::transform::TileTransform;
use crate::error::{Error, Result};
use crate::io::backend::{DestinationRaster, SourceRaster};
use crate::types::{BandBuffer, PixelType, RasterDescriptor, Tile};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    Cancelled,
}

pub struct BlockStreamer<'t> {
    tile_size: usize,
    workers: usize,
    transform: &'t dyn TileTransform,
    pool: ThreadPool,
}

impl<'t> BlockStreamer<'t> {
    pub fn new(
        tile_size: usize,
        workers: NonZeroUsize,
        transform: &'t dyn TileTransform,
    ) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::InvalidArgument {
                arg: "tile_size",
                value: tile_size.to_string(),
            });
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.get())
            .thread_name(|i| format!("rasterconv-tile-{}", i))
            .build()
            .map_err(Error::external)?;
        Ok(Self {
            tile_size,
            workers: workers.get(),
            transform,
            pool,
        })
    }

    /// Stream every tile of `source` into `destination`.
    ///
    /// Both rasters must share the geometry in `descriptor`. Progress is
    /// `completed / total` after each written tile, then a final 1.0.
    pub fn stream<S, D>(
        &self,
        source: &S,
        destination: &mut D,
        descriptor: &RasterDescriptor,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<StreamStatus>
    where
        S: SourceRaster + ?Sized,
        D: DestinationRaster + ?Sized,
    {
        let grid = TileGrid::new(descriptor.width, descriptor.height, self.tile_size)?;
        let total = grid.total();
        sink.on_log(&format!(
            "Starting block processing using {} core(s)...",
            self.workers
        ));
        info!(
            "Streaming {}x{} raster, {} band(s), as {} tile(s) of {}px",
            descriptor.width,
            descriptor.height,
            descriptor.band_count(),
            total,
            self.tile_size
        );

        let mut progress = MonotonicProgress::new(sink);
        for (done, tile) in grid.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancelled before tile ({}, {})", tile.x, tile.y);
                return Ok(StreamStatus::Cancelled);
            }

            let mut bands = self.read_tile(source, descriptor, &tile)?;
            self.transform_tile(&tile, &mut bands)?;
            for buffer in &bands {
                destination.write_block(&tile, buffer)?;
            }
            trace!("Tile ({}, {}) {}x{} written", tile.x, tile.y, tile.width, tile.height);

            if cancel.is_cancelled() {
                info!("Cancelled after tile ({}, {})", tile.x, tile.y);
                return Ok(StreamStatus::Cancelled);
            }
            progress.report((done + 1) as f64 / total as f64);
        }

        progress.finish();
        debug!("Block streaming finished");
        Ok(StreamStatus::Completed)
    }

    fn read_tile<S: SourceRaster + ?Sized>(
        &self,
        source: &S,
        descriptor: &RasterDescriptor,
        tile: &Tile,
    ) -> Result<Vec<BandBuffer>> {
        descriptor
            .band_types
            .iter()
            .enumerate()
            .map(|(i, &pixel_type)| {
                let mut buffer = BandBuffer::zeroed(i + 1, pixel_type, tile);
                source.read_block(tile, &mut buffer)?;
                Ok(buffer)
            })
            .collect()
    }

    // Runs on the pool so parallel iterators inside the transform use its
    // workers; it returns before any band of the tile is written
    fn transform_tile(&self, tile: &Tile, bands: &mut [BandBuffer]) -> Result<()> {
        let before: Vec<(usize, PixelType)> = bands.iter().map(|b| (b.band, b.pixel_type)).collect();
        let transform = self.transform;
        self.pool.install(|| transform.apply(tile, bands))?;

        let failure = |band: usize, message: String| Error::Transform {
            band,
            x: tile.x,
            y: tile.y,
            message,
        };
        if bands.len() != before.len() {
            return Err(failure(
                0,
                format!("band count changed from {} to {}", before.len(), bands.len()),
            ));
        }
        for (buffer, &(band, pixel_type)) in bands.iter().zip(&before) {
            if buffer.band != band || buffer.pixel_type != pixel_type {
                return Err(failure(
                    band,
                    format!(
                        "buffer changed from band {} {} to band {} {}",
                        band, pixel_type, buffer.band, buffer.pixel_type
                    ),
                ));
            }
            let expected = tile.buffer_len(pixel_type);
            if buffer.data.len() != expected {
                return Err(failure(
                    band,
                    format!(
                        "buffer resized from {} to {} bytes",
                        expected,
                        buffer.data.len()
                    ),
                ));
            }
        }
        Ok(())
    }
}
