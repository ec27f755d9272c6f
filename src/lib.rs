#![doc = r#"
rasterconv: block-streaming raster format conversion on top of GDAL.

This crate converts a raster dataset from any format GDAL can read into any format
GDAL can write. GDAL handles format parsing, CRS handling and compression; rasterconv
owns the orchestration around it: choosing between a driver's explicit-create and
whole-dataset copy paths, streaming pixels tile by tile, reporting progress and
honouring cancellation. It powers the `rasterconv` CLI and can be embedded in your own
Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: convert a file
---------------------------
```rust,no_run
use rasterconv::{CancelToken, ConversionRequest, Converter, GdalBackend, NullSink};

fn main() {
    let request = ConversionRequest::new("/data/scene.tif", "/out/scene.img", "HFA")
        .with_option("COMPRESSED", "YES");

    let outcome = Converter::new(GdalBackend::new()).convert(
        &request,
        &CancelToken::new(),
        &NullSink,
    );
    println!("{}", outcome.message());
}
```

Run in the background with progress and cancellation
----------------------------------------------------
```rust,no_run
use rasterconv::{ConversionJob, ConversionRequest, Converter, GdalBackend, JobEvent};

fn main() -> rasterconv::Result<()> {
    let request = ConversionRequest::new("/data/scene.tif", "/out/scene.png", "PNG");
    let job = ConversionJob::spawn(Converter::new(GdalBackend::new()), request)?;

    // `job.cancel()` (or `job.cancel_token()` shared with another thread) stops it early
    let outcome = job.finish(|event| match event {
        JobEvent::Progress(p) => println!("{:>5.1}%", p.fraction * 100.0),
        JobEvent::Log(line) => println!("{line}"),
        JobEvent::Finished(_) => {}
    });
    println!("{}", outcome.message());
    Ok(())
}
```

Custom per-tile processing
--------------------------
Drivers that support explicit creation are filled block by block (256×256 by default).
A `TileTransform` receives all bands of each tile between read and write and
runs on a pool of `parallelism` workers. `PerBand` wraps a single-band step and
processes the bands of a tile in parallel:

```rust,no_run
use std::sync::Arc;
use rasterconv::{BandBuffer, Converter, GdalBackend, PerBand, Tile};

fn build() -> rasterconv::Result<Converter<GdalBackend>> {
    let invert = PerBand(|_: &Tile, band: &mut BandBuffer| -> rasterconv::Result<()> {
        band.data.iter_mut().for_each(|b| *b = !*b);
        Ok(())
    });
    Converter::new(GdalBackend::new())
        .with_transform(Arc::new(invert))
        .with_tile_size(512)
}
```

A plain closure over `&mut [BandBuffer]` can combine bands, e.g. keep the
brighter of two Byte bands in band 1:

```rust,no_run
use std::sync::Arc;
use rasterconv::{BandBuffer, Converter, GdalBackend, Tile};

fn build() -> Converter<GdalBackend> {
    let brighter = |_: &Tile, bands: &mut [BandBuffer]| -> rasterconv::Result<()> {
        if let [first, second, ..] = bands {
            for (a, b) in first.data.iter_mut().zip(&second.data) {
                *a = (*a).max(*b);
            }
        }
        Ok(())
    };
    Converter::new(GdalBackend::new()).with_transform(Arc::new(brighter))
}
```

Testing without GDAL files
--------------------------
`io::memory::MemoryBackend` implements the same raster boundary in process, with
drivers declared explicitly:

```rust
use std::path::Path;
use rasterconv::io::memory::{MemoryBackend, MemoryRaster};
use rasterconv::{CancelToken, ConversionRequest, Converter, DriverCapabilities, NullSink, PixelType};

let backend = MemoryBackend::new()
    .with_driver("OUT", DriverCapabilities { create: true, create_copy: false });
backend.insert("/in", MemoryRaster::new(300, 300, &[PixelType::UInt16]));

let outcome = Converter::new(backend.clone()).convert(
    &ConversionRequest::new("/in", "/out", "OUT"),
    &CancelToken::new(),
    &NullSink,
);
assert!(outcome.is_success());
assert_eq!(backend.get(Path::new("/out")).unwrap().width, 300);
```

Error handling
--------------
Conversions never panic on bad input: every failure is reported as
`ConversionOutcome::Failure(rasterconv::Error)`, with GDAL's own error text embedded
where the library produced one. Cancellation is `ConversionOutcome::Cancelled`, not an
error.

Useful modules
--------------
- [`core`]: orchestrator, block engine, progress/cancel plumbing, background job.
- [`io`]: raster boundary traits, the GDAL and in-memory backends, driver catalog.
- [`types`]: pixel types, tiles, capabilities and outcomes.
- [`error`]: crate-level `Error` and `Result`.
"#]

pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
pub use error::{Error, Result};
pub use types::{
    BandBuffer, ConversionOutcome, DriverCapabilities, PixelType, ProcessingMode,
    RasterDescriptor, Tile,
};

pub use crate::core::engine::{BlockStreamer, StreamStatus};
pub use crate::core::job::{ChannelSink, ConversionJob, JobEvent};
pub use crate::core::orchestrator::Converter;
pub use crate::core::params::{ConversionPreset, ConversionRequest, CreationOptions};
pub use crate::core::progress::{CancelToken, NullSink, ProgressEvent, ProgressSink};
pub use crate::core::tiles::{DEFAULT_TILE_SIZE, TileGrid};
pub use crate::core::transform::{Passthrough, PerBand, TileTransform};

pub use crate::io::backend::{CreateSpec, DestinationRaster, RasterBackend, SourceRaster};
pub use crate::io::drivers::{DriverInfo, output_drivers, raster_drivers, suggest_output_path};
pub use crate::io::gdal::GdalBackend;
pub use crate::io::options::{OptionKind, OptionSpec, schema_defaults};
