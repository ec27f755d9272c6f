//! I/O layer: the raster boundary the core is written against, its GDAL and
//! in-memory implementations, and driver/creation-option introspection.
pub mod backend;
pub mod drivers;
pub mod gdal;
pub mod memory;
pub mod options;

pub use backend::{CreateSpec, DestinationRaster, RasterBackend, SourceRaster};
pub use gdal::GdalBackend;
pub use memory::{MemoryBackend, MemoryRaster};
