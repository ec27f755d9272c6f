//! The raster-library boundary the conversion core is written against.
//!
//! `GdalBackend` is the production implementation; `MemoryBackend` keeps
//! rasters in process for tests and for embedding without touching disk.
use std::path::Path;

use crate::core::params::CreationOptions;
use crate::error::Result;
use crate::types::{BandBuffer, DriverCapabilities, PixelType, RasterDescriptor, Tile};

/// Geometry of a dataset to be created with the explicit-create path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateSpec {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub pixel_type: PixelType,
}

/// A read-only opened raster
pub trait SourceRaster {
    fn descriptor(&self) -> Result<RasterDescriptor>;

    /// Fill `buffer` with `tile` pixels of `buffer.band`, in `buffer.pixel_type`
    fn read_block(&self, tile: &Tile, buffer: &mut BandBuffer) -> Result<()>;
}

/// A writable raster created by the explicit-create path
pub trait DestinationRaster {
    fn set_projection(&mut self, wkt: &str) -> Result<()>;

    fn set_geo_transform(&mut self, geo_transform: &[f64; 6]) -> Result<()>;

    /// Store `buffer` at `tile` of `buffer.band`
    fn write_block(&mut self, tile: &Tile, buffer: &BandBuffer) -> Result<()>;
}

/// Driver registry plus dataset factory
pub trait RasterBackend {
    type Source: SourceRaster;
    type Destination: DestinationRaster;

    /// Open `path` read-only, optionally restricted to `driver`
    fn open(&self, path: &Path, driver: Option<&str>) -> Result<Self::Source>;

    /// Capabilities of the named output driver, `Error::UnknownDriver` when absent
    fn capabilities(&self, driver: &str) -> Result<DriverCapabilities>;

    fn create(
        &self,
        driver: &str,
        path: &Path,
        spec: &CreateSpec,
        options: &CreationOptions,
    ) -> Result<Self::Destination>;

    /// Whole-dataset copy. `progress` receives the completed fraction and
    /// returns `false` to abort the copy.
    fn create_copy(
        &self,
        driver: &str,
        path: &Path,
        source: &Self::Source,
        options: &CreationOptions,
        progress: &mut dyn FnMut(f64) -> bool,
    ) -> Result<()>;
}
