//! Conversion orchestrator: opens the source, picks the explicit-create or
//! direct-copy path from the output driver's capabilities, and turns the
//! result into a single `ConversionOutcome`.
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::engine::{BlockStreamer, StreamStatus};
use crate::core::params::ConversionRequest;
use crate::core::progress::{CancelToken, MonotonicProgress, ProgressSink};
use crate::core::tiles::DEFAULT_TILE_SIZE;
use crate::core::transform::{Passthrough, TileTransform};
use crate::error::{Error, Result};
use crate::io::backend::{CreateSpec, DestinationRaster, RasterBackend, SourceRaster};
use crate::types::{ConversionOutcome, ProcessingMode};

#[derive(Clone)]
pub struct Converter<B: RasterBackend> {
    backend: B,
    transform: Arc<dyn TileTransform>,
    tile_size: usize,
}

impl<B: RasterBackend> Converter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            transform: Arc::new(Passthrough),
            tile_size: DEFAULT_TILE_SIZE,
        }
    }

    /// Per-tile processing applied on the explicit-create path
    pub fn with_transform(mut self, transform: Arc<dyn TileTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_tile_size(mut self, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::InvalidArgument {
                arg: "tile_size",
                value: tile_size.to_string(),
            });
        }
        self.tile_size = tile_size;
        Ok(self)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Run `request` to completion on the calling thread.
    ///
    /// `sink` receives progress and log lines as the run goes; the returned
    /// outcome is the only terminal report.
    pub fn convert(
        &self,
        request: &ConversionRequest,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> ConversionOutcome {
        let outcome = match self.run(request, cancel, sink) {
            Ok(StreamStatus::Completed) => ConversionOutcome::Success {
                output: request.output.clone(),
            },
            Ok(StreamStatus::Cancelled) => ConversionOutcome::Cancelled,
            Err(e) => ConversionOutcome::Failure(e),
        };
        match &outcome {
            ConversionOutcome::Success { output } => info!("Converted {:?} -> {:?}", request.input, output),
            ConversionOutcome::Cancelled => warn!("Conversion of {:?} cancelled", request.input),
            ConversionOutcome::Failure(e) => error!("Conversion of {:?} failed: {}", request.input, e),
        }
        outcome
    }

    fn run(
        &self,
        request: &ConversionRequest,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<StreamStatus> {
        sink.on_log("Starting GDAL conversion...");

        if request.mode != ProcessingMode::Cpu {
            sink.on_log(&format!("Processing mode: {}", request.mode));
            return Err(Error::UnimplementedMode { mode: request.mode });
        }

        let source = self
            .backend
            .open(&request.input, request.input_driver.as_deref())?;
        sink.on_log("Input file opened successfully.");

        let capabilities = self.backend.capabilities(&request.output_driver)?;
        sink.on_log(&format!("Output driver found: {}", request.output_driver));

        for (key, value) in &request.options {
            sink.on_log(&format!("Setting GDAL option: {} = {}", key, value));
        }
        sink.on_log(&format!("Processing mode: {}", request.mode));

        let status = if capabilities.create {
            self.create_and_stream(request, &source, cancel, sink)?
        } else if capabilities.create_copy {
            self.copy_whole(request, &source, cancel, sink)?
        } else {
            return Err(Error::UnsupportedDriver {
                name: request.output_driver.clone(),
            });
        };

        if status == StreamStatus::Completed {
            sink.on_log("Conversion process completed successfully.");
        }
        Ok(status)
    }

    fn create_and_stream(
        &self,
        request: &ConversionRequest,
        source: &B::Source,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<StreamStatus> {
        sink.on_log("Using Create method.");

        let descriptor = source.descriptor()?;
        let Some(&pixel_type) = descriptor.band_types.first() else {
            return Err(Error::EmptyRaster);
        };
        let spec = CreateSpec {
            width: descriptor.width,
            height: descriptor.height,
            bands: descriptor.band_count(),
            pixel_type,
        };
        let mut destination = self.backend.create(
            &request.output_driver,
            &request.output,
            &spec,
            &request.options,
        )?;

        if let Some(wkt) = descriptor.projection.as_deref() {
            if let Err(e) = destination.set_projection(wkt) {
                warn!("Could not copy projection: {}", e);
                sink.on_log(&format!("Warning: could not copy projection: {}", e));
            }
        }
        if let Some(geo_transform) = descriptor.geo_transform.as_ref() {
            if let Err(e) = destination.set_geo_transform(geo_transform) {
                warn!("Could not copy geotransform: {}", e);
                sink.on_log(&format!("Warning: could not copy geotransform: {}", e));
            }
        }

        let streamer = BlockStreamer::new(
            self.tile_size,
            request.parallelism,
            self.transform.as_ref(),
        )?;
        streamer.stream(source, &mut destination, &descriptor, cancel, sink)
    }

    fn copy_whole(
        &self,
        request: &ConversionRequest,
        source: &B::Source,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<StreamStatus> {
        sink.on_log("Using CreateCopy method.");

        let mut progress = MonotonicProgress::new(sink);
        let result = self.backend.create_copy(
            &request.output_driver,
            &request.output,
            source,
            &request.options,
            &mut |fraction: f64| {
                if cancel.is_cancelled() {
                    return false;
                }
                progress.report(fraction);
                true
            },
        );

        match result {
            Ok(()) => {
                progress.finish();
                Ok(StreamStatus::Completed)
            }
            Err(_) if cancel.is_cancelled() => Ok(StreamStatus::Cancelled),
            Err(e) => Err(e),
        }
    }
}
