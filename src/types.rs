//! Shared types used across rasterconv.
//! Includes `ProcessingMode`, `PixelType`, `DriverCapabilities`, `RasterDescriptor`,
//! the `Tile`/`BandBuffer` units the engine moves around, and `ConversionOutcome`.
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum ProcessingMode {
    Cpu,
    Gpu, // Declared, not implemented
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Cpu => write!(f, "CPU"),
            ProcessingMode::Gpu => write!(f, "GPU"),
        }
    }
}

/// Per-band pixel data type, mirroring the GDAL data types the engine can stream.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum PixelType {
    Byte,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
    CInt16,
    CInt32,
    CFloat32,
    CFloat64,
}

impl PixelType {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::Byte => 1,
            PixelType::UInt16 | PixelType::Int16 => 2,
            PixelType::UInt32 | PixelType::Int32 | PixelType::Float32 | PixelType::CInt16 => 4,
            PixelType::Float64 | PixelType::CInt32 | PixelType::CFloat32 => 8,
            PixelType::CFloat64 => 16,
        }
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PixelType::Byte => "Byte",
            PixelType::UInt16 => "UInt16",
            PixelType::Int16 => "Int16",
            PixelType::UInt32 => "UInt32",
            PixelType::Int32 => "Int32",
            PixelType::Float32 => "Float32",
            PixelType::Float64 => "Float64",
            PixelType::CInt16 => "CInt16",
            PixelType::CInt32 => "CInt32",
            PixelType::CFloat32 => "CFloat32",
            PixelType::CFloat64 => "CFloat64",
        };
        write!(f, "{}", s)
    }
}

/// What an output driver declares it can do
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct DriverCapabilities {
    /// `DCAP_CREATE`: empty dataset creation followed by band writes
    pub create: bool,
    /// `DCAP_CREATECOPY`: whole-dataset copy in a single call
    pub create_copy: bool,
}

impl DriverCapabilities {
    pub fn can_write(&self) -> bool {
        self.create || self.create_copy
    }
}

/// Geometry, band layout and georeferencing of an opened raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDescriptor {
    /// Width (pixels) of the raster
    pub width: usize,
    /// Height (lines) of the raster
    pub height: usize,
    /// Pixel type of each band, band 1 first
    pub band_types: Vec<PixelType>,
    /// Projection in WKT format, `None` when the source has none
    pub projection: Option<String>,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geo_transform: Option<[f64; 6]>,
}

impl RasterDescriptor {
    pub fn band_count(&self) -> usize {
        self.band_types.len()
    }
}

/// A rectangular window of the raster grid, always inside the raster bounds
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Tile {
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn buffer_len(&self, pixel_type: PixelType) -> usize {
        pixel_type.bytes_per_pixel() * self.pixel_count()
    }
}

/// Raw pixels of one band over one tile, row-major, native endianness
#[derive(Debug, Clone, PartialEq)]
pub struct BandBuffer {
    /// 1-based band index
    pub band: usize,
    pub pixel_type: PixelType,
    pub data: Vec<u8>,
}

impl BandBuffer {
    pub fn zeroed(band: usize, pixel_type: PixelType, tile: &Tile) -> Self {
        Self {
            band,
            pixel_type,
            data: vec![0u8; tile.buffer_len(pixel_type)],
        }
    }
}

/// Terminal result of one conversion request
#[derive(Debug)]
pub enum ConversionOutcome {
    Success { output: PathBuf },
    Failure(Error),
    Cancelled,
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }

    /// Human-readable message suitable for a status line or dialog
    pub fn message(&self) -> String {
        match self {
            ConversionOutcome::Success { output } => {
                format!("Conversion completed successfully: {}", output.display())
            }
            ConversionOutcome::Failure(e) => e.to_string(),
            ConversionOutcome::Cancelled => "Conversion cancelled by user.".to_string(),
        }
    }
}
