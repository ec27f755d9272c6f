//! In-process raster backend.
//!
//! Rasters live in a shared path-keyed store, so a conversion can be run and
//! its output inspected without GDAL or a filesystem. Drivers are declared
//! explicitly with the capabilities they should advertise. Block reads and
//! writes convert between the buffer's and the band's pixel types.
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::params::CreationOptions;
use crate::error::{Error, Result};
use crate::io::backend::{CreateSpec, DestinationRaster, RasterBackend, SourceRaster};
use crate::types::{BandBuffer, DriverCapabilities, PixelType, RasterDescriptor, Tile};

/// Driver name given to rasters inserted directly into the store
pub const MEMORY_DRIVER: &str = "MEM";

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBand {
    pub pixel_type: PixelType,
    /// Row-major pixels, native endianness
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRaster {
    pub width: usize,
    pub height: usize,
    pub bands: Vec<MemoryBand>,
    pub projection: Option<String>,
    pub geo_transform: Option<[f64; 6]>,
}

impl MemoryRaster {
    /// Zero-filled raster with one band per entry of `band_types`
    pub fn new(width: usize, height: usize, band_types: &[PixelType]) -> Self {
        let bands = band_types
            .iter()
            .map(|&pixel_type| MemoryBand {
                pixel_type,
                data: vec![0u8; width * height * pixel_type.bytes_per_pixel()],
            })
            .collect();
        Self {
            width,
            height,
            bands,
            projection: None,
            geo_transform: None,
        }
    }

    pub fn with_projection(mut self, wkt: impl Into<String>) -> Self {
        self.projection = Some(wkt.into());
        self
    }

    pub fn with_geo_transform(mut self, geo_transform: [f64; 6]) -> Self {
        self.geo_transform = Some(geo_transform);
        self
    }

    /// Bytes of band `band` (1-based)
    pub fn band_data(&self, band: usize) -> Option<&[u8]> {
        band.checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .map(|b| b.data.as_slice())
    }

    pub fn band_data_mut(&mut self, band: usize) -> Option<&mut Vec<u8>> {
        band.checked_sub(1)
            .and_then(|i| self.bands.get_mut(i))
            .map(|b| &mut b.data)
    }

    pub fn descriptor(&self) -> RasterDescriptor {
        RasterDescriptor {
            width: self.width,
            height: self.height,
            band_types: self.bands.iter().map(|b| b.pixel_type).collect(),
            projection: self.projection.clone(),
            geo_transform: self.geo_transform,
        }
    }

    fn check_window(&self, tile: &Tile, buffer: &BandBuffer) -> std::result::Result<&MemoryBand, String> {
        if tile.x + tile.width > self.width || tile.y + tile.height > self.height {
            return Err(format!(
                "window {}x{}+{}+{} outside {}x{} raster",
                tile.width, tile.height, tile.x, tile.y, self.width, self.height
            ));
        }
        if buffer.data.len() != tile.buffer_len(buffer.pixel_type) {
            return Err(format!(
                "buffer holds {} bytes, tile needs {}",
                buffer.data.len(),
                tile.buffer_len(buffer.pixel_type)
            ));
        }
        buffer
            .band
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or_else(|| format!("band {} does not exist", buffer.band))
    }

    fn read_tile(&self, tile: &Tile, buffer: &mut BandBuffer) -> std::result::Result<(), String> {
        let band = self.check_window(tile, buffer)?;
        let band_bpp = band.pixel_type.bytes_per_pixel();
        let buffer_bpp = buffer.pixel_type.bytes_per_pixel();
        for row in 0..tile.height {
            let start = ((tile.y + row) * self.width + tile.x) * band_bpp;
            let dst = row * tile.width * buffer_bpp;
            convert_pixels(
                band.pixel_type,
                &band.data[start..start + tile.width * band_bpp],
                buffer.pixel_type,
                &mut buffer.data[dst..dst + tile.width * buffer_bpp],
            );
        }
        Ok(())
    }

    fn write_tile(&mut self, tile: &Tile, buffer: &BandBuffer) -> std::result::Result<(), String> {
        self.check_window(tile, buffer)?;
        let width = self.width;
        let band = &mut self.bands[buffer.band - 1];
        let band_bpp = band.pixel_type.bytes_per_pixel();
        let buffer_bpp = buffer.pixel_type.bytes_per_pixel();
        for row in 0..tile.height {
            let start = ((tile.y + row) * width + tile.x) * band_bpp;
            let src = row * tile.width * buffer_bpp;
            convert_pixels(
                buffer.pixel_type,
                &buffer.data[src..src + tile.width * buffer_bpp],
                band.pixel_type,
                &mut band.data[start..start + tile.width * band_bpp],
            );
        }
        Ok(())
    }
}

fn ne<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// One pixel as (real, imaginary)
fn decode(pixel_type: PixelType, b: &[u8]) -> (f64, f64) {
    match pixel_type {
        PixelType::Byte => (b[0] as f64, 0.0),
        PixelType::UInt16 => (u16::from_ne_bytes(ne(b)) as f64, 0.0),
        PixelType::Int16 => (i16::from_ne_bytes(ne(b)) as f64, 0.0),
        PixelType::UInt32 => (u32::from_ne_bytes(ne(b)) as f64, 0.0),
        PixelType::Int32 => (i32::from_ne_bytes(ne(b)) as f64, 0.0),
        PixelType::Float32 => (f32::from_ne_bytes(ne(b)) as f64, 0.0),
        PixelType::Float64 => (f64::from_ne_bytes(ne(b)), 0.0),
        PixelType::CInt16 => (
            i16::from_ne_bytes(ne(b)) as f64,
            i16::from_ne_bytes(ne(&b[2..])) as f64,
        ),
        PixelType::CInt32 => (
            i32::from_ne_bytes(ne(b)) as f64,
            i32::from_ne_bytes(ne(&b[4..])) as f64,
        ),
        PixelType::CFloat32 => (
            f32::from_ne_bytes(ne(b)) as f64,
            f32::from_ne_bytes(ne(&b[4..])) as f64,
        ),
        PixelType::CFloat64 => (f64::from_ne_bytes(ne(b)), f64::from_ne_bytes(ne(&b[8..]))),
    }
}

// Round to nearest and saturate, NaN becomes 0
fn saturate(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.round().clamp(min, max)
    }
}

fn encode(pixel_type: PixelType, (re, im): (f64, f64), out: &mut [u8]) {
    match pixel_type {
        PixelType::Byte => out[0] = saturate(re, 0.0, u8::MAX as f64) as u8,
        PixelType::UInt16 => {
            out.copy_from_slice(&(saturate(re, 0.0, u16::MAX as f64) as u16).to_ne_bytes())
        }
        PixelType::Int16 => out.copy_from_slice(
            &(saturate(re, i16::MIN as f64, i16::MAX as f64) as i16).to_ne_bytes(),
        ),
        PixelType::UInt32 => {
            out.copy_from_slice(&(saturate(re, 0.0, u32::MAX as f64) as u32).to_ne_bytes())
        }
        PixelType::Int32 => out.copy_from_slice(
            &(saturate(re, i32::MIN as f64, i32::MAX as f64) as i32).to_ne_bytes(),
        ),
        PixelType::Float32 => out.copy_from_slice(&(re as f32).to_ne_bytes()),
        PixelType::Float64 => out.copy_from_slice(&re.to_ne_bytes()),
        PixelType::CInt16 => {
            let (lo, hi) = (i16::MIN as f64, i16::MAX as f64);
            out[..2].copy_from_slice(&(saturate(re, lo, hi) as i16).to_ne_bytes());
            out[2..].copy_from_slice(&(saturate(im, lo, hi) as i16).to_ne_bytes());
        }
        PixelType::CInt32 => {
            let (lo, hi) = (i32::MIN as f64, i32::MAX as f64);
            out[..4].copy_from_slice(&(saturate(re, lo, hi) as i32).to_ne_bytes());
            out[4..].copy_from_slice(&(saturate(im, lo, hi) as i32).to_ne_bytes());
        }
        PixelType::CFloat32 => {
            out[..4].copy_from_slice(&(re as f32).to_ne_bytes());
            out[4..].copy_from_slice(&(im as f32).to_ne_bytes());
        }
        PixelType::CFloat64 => {
            out[..8].copy_from_slice(&re.to_ne_bytes());
            out[8..].copy_from_slice(&im.to_ne_bytes());
        }
    }
}

/// Copy a run of pixels, converting between types the way GDAL's RasterIO
/// does: integers are rounded and saturated, the imaginary part is dropped
/// for real targets.
fn convert_pixels(from: PixelType, src: &[u8], to: PixelType, dst: &mut [u8]) {
    if from == to {
        dst.copy_from_slice(src);
        return;
    }
    for (s, d) in src
        .chunks_exact(from.bytes_per_pixel())
        .zip(dst.chunks_exact_mut(to.bytes_per_pixel()))
    {
        encode(to, decode(from, s), d);
    }
}

#[derive(Debug, Clone)]
struct StoredRaster {
    driver: String,
    raster: MemoryRaster,
}

#[derive(Debug, Default)]
struct Store {
    drivers: BTreeMap<String, DriverCapabilities>,
    files: HashMap<PathBuf, StoredRaster>,
    opens: usize,
    options: HashMap<PathBuf, CreationOptions>,
}

/// Shared in-memory driver registry and file store; clones share state
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or replace) an output driver
    pub fn with_driver(self, name: &str, capabilities: DriverCapabilities) -> Self {
        self.store().drivers.insert(name.to_string(), capabilities);
        self
    }

    /// Place a raster at `path`, as if written by the `MEM` driver
    pub fn insert(&self, path: impl Into<PathBuf>, raster: MemoryRaster) {
        self.store().files.insert(
            path.into(),
            StoredRaster {
                driver: MEMORY_DRIVER.to_string(),
                raster,
            },
        );
    }

    pub fn get(&self, path: &Path) -> Option<MemoryRaster> {
        self.store().files.get(path).map(|f| f.raster.clone())
    }

    /// Driver that produced the raster at `path`
    pub fn driver_of(&self, path: &Path) -> Option<String> {
        self.store().files.get(path).map(|f| f.driver.clone())
    }

    /// Creation options the raster at `path` was created with
    pub fn creation_options(&self, path: &Path) -> Option<CreationOptions> {
        self.store().options.get(path).cloned()
    }

    /// Number of `open` calls served so far
    pub fn open_count(&self) -> usize {
        self.store().opens
    }
}

pub struct MemorySource {
    raster: MemoryRaster,
}

impl SourceRaster for MemorySource {
    fn descriptor(&self) -> Result<RasterDescriptor> {
        Ok(self.raster.descriptor())
    }

    fn read_block(&self, tile: &Tile, buffer: &mut BandBuffer) -> Result<()> {
        self.raster
            .read_tile(tile, buffer)
            .map_err(|message| Error::Read {
                band: buffer.band,
                x: tile.x,
                y: tile.y,
                message,
            })
    }
}

/// Handle onto a raster in the store; writes land in the store immediately
pub struct MemoryDestination {
    path: PathBuf,
    store: Arc<Mutex<Store>>,
}

impl MemoryDestination {
    fn with_raster<T>(
        &self,
        f: impl FnOnce(&mut MemoryRaster) -> std::result::Result<T, String>,
    ) -> std::result::Result<T, String> {
        let mut store = self
            .store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let file = store
            .files
            .get_mut(&self.path)
            .ok_or_else(|| format!("{} was removed", self.path.display()))?;
        f(&mut file.raster)
    }
}

impl DestinationRaster for MemoryDestination {
    fn set_projection(&mut self, wkt: &str) -> Result<()> {
        self.with_raster(|r| {
            r.projection = Some(wkt.to_string());
            Ok(())
        })
        .map_err(Error::External)
    }

    fn set_geo_transform(&mut self, geo_transform: &[f64; 6]) -> Result<()> {
        self.with_raster(|r| {
            r.geo_transform = Some(*geo_transform);
            Ok(())
        })
        .map_err(Error::External)
    }

    fn write_block(&mut self, tile: &Tile, buffer: &BandBuffer) -> Result<()> {
        self.with_raster(|r| r.write_tile(tile, buffer))
            .map_err(|message| Error::Write {
                band: buffer.band,
                x: tile.x,
                y: tile.y,
                message,
            })
    }
}

impl RasterBackend for MemoryBackend {
    type Source = MemorySource;
    type Destination = MemoryDestination;

    fn open(&self, path: &Path, driver: Option<&str>) -> Result<MemorySource> {
        let mut store = self.store();
        store.opens += 1;
        let open_error = |message: String| Error::Open {
            path: path.to_path_buf(),
            message,
        };
        let file = store.files.get(path).ok_or_else(|| {
            open_error(format!(
                "{}: No such file or directory",
                path.display()
            ))
        })?;
        if let Some(driver) = driver {
            if !file.driver.eq_ignore_ascii_case(driver) {
                return Err(open_error(format!(
                    "`{}' not recognized as being in a supported file format by {}.",
                    path.display(),
                    driver
                )));
            }
        }
        Ok(MemorySource {
            raster: file.raster.clone(),
        })
    }

    fn capabilities(&self, driver: &str) -> Result<DriverCapabilities> {
        self.store()
            .drivers
            .get(driver)
            .copied()
            .ok_or_else(|| Error::UnknownDriver {
                name: driver.to_string(),
            })
    }

    fn create(
        &self,
        driver: &str,
        path: &Path,
        spec: &CreateSpec,
        options: &CreationOptions,
    ) -> Result<MemoryDestination> {
        let mut store = self.store();
        if !store.drivers.get(driver).is_some_and(|c| c.create) {
            return Err(Error::Create {
                path: path.to_path_buf(),
                message: format!("{} does not support Create", driver),
            });
        }
        let raster = MemoryRaster::new(
            spec.width,
            spec.height,
            &vec![spec.pixel_type; spec.bands],
        );
        store.files.insert(
            path.to_path_buf(),
            StoredRaster {
                driver: driver.to_string(),
                raster,
            },
        );
        store.options.insert(path.to_path_buf(), options.clone());
        Ok(MemoryDestination {
            path: path.to_path_buf(),
            store: Arc::clone(&self.store),
        })
    }

    fn create_copy(
        &self,
        driver: &str,
        path: &Path,
        source: &MemorySource,
        options: &CreationOptions,
        progress: &mut dyn FnMut(f64) -> bool,
    ) -> Result<()> {
        if !self.store().drivers.get(driver).is_some_and(|c| c.create_copy) {
            return Err(Error::Copy {
                path: path.to_path_buf(),
                message: format!("{} does not support CreateCopy", driver),
            });
        }
        // Report once per scanline, like GDAL's default copy loop
        let height = source.raster.height;
        for row in 0..height {
            if !progress(row as f64 / height as f64) {
                return Err(Error::Copy {
                    path: path.to_path_buf(),
                    message: "User terminated CreateCopy()".to_string(),
                });
            }
        }
        if !progress(1.0) {
            return Err(Error::Copy {
                path: path.to_path_buf(),
                message: "User terminated CreateCopy()".to_string(),
            });
        }
        let mut store = self.store();
        store.files.insert(
            path.to_path_buf(),
            StoredRaster {
                driver: driver.to_string(),
                raster: source.raster.clone(),
            },
        );
        store.options.insert(path.to_path_buf(), options.clone());
        Ok(())
    }
}
