//! GDAL implementation of the raster boundary.
//!
//! Dataset and driver lookup go through the `gdal` crate. Creation with a
//! pixel type only known at runtime, whole-dataset copy with a progress
//! callback and untyped block I/O go through `gdal-sys` directly.
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};

use gdal::cpl::CslStringList;
use gdal::errors::GdalError;
use gdal::{Dataset, DatasetOptions, Driver, DriverManager, GdalOpenFlags, Metadata};
use gdal_sys::{CPLErr, GDALDataType, GDALRWFlag};
use tracing::debug;

use crate::core::params::CreationOptions;
use crate::error::{Error, Result};
use crate::io::backend::{CreateSpec, DestinationRaster, RasterBackend, SourceRaster};
use crate::types::{BandBuffer, DriverCapabilities, PixelType, RasterDescriptor, Tile};

/// Text of the most recent CPL error on this thread, empty when none
pub fn last_error_message() -> String {
    let msg = unsafe { gdal_sys::CPLGetLastErrorMsg() };
    if msg.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
}

fn reset_last_error() {
    unsafe { gdal_sys::CPLErrorReset() };
}

// Prefer the CPL message; the crate error is a fallback for failures raised before GDAL ran
fn library_message(fallback: &GdalError) -> String {
    let msg = last_error_message();
    if msg.is_empty() {
        fallback.to_string()
    } else {
        msg
    }
}

fn last_error_or(default: &str) -> String {
    let msg = last_error_message();
    if msg.is_empty() { default.to_string() } else { msg }
}

pub fn pixel_type_from_gdal(data_type: GDALDataType::Type) -> Result<PixelType> {
    match data_type {
        GDALDataType::GDT_Byte => Ok(PixelType::Byte),
        GDALDataType::GDT_UInt16 => Ok(PixelType::UInt16),
        GDALDataType::GDT_Int16 => Ok(PixelType::Int16),
        GDALDataType::GDT_UInt32 => Ok(PixelType::UInt32),
        GDALDataType::GDT_Int32 => Ok(PixelType::Int32),
        GDALDataType::GDT_Float32 => Ok(PixelType::Float32),
        GDALDataType::GDT_Float64 => Ok(PixelType::Float64),
        GDALDataType::GDT_CInt16 => Ok(PixelType::CInt16),
        GDALDataType::GDT_CInt32 => Ok(PixelType::CInt32),
        GDALDataType::GDT_CFloat32 => Ok(PixelType::CFloat32),
        GDALDataType::GDT_CFloat64 => Ok(PixelType::CFloat64),
        other => {
            let name = unsafe { gdal_sys::GDALGetDataTypeName(other) };
            let name = if name.is_null() {
                format!("GDAL type {}", other)
            } else {
                unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
            };
            Err(Error::UnsupportedPixelType(name))
        }
    }
}

pub fn pixel_type_to_gdal(pixel_type: PixelType) -> GDALDataType::Type {
    match pixel_type {
        PixelType::Byte => GDALDataType::GDT_Byte,
        PixelType::UInt16 => GDALDataType::GDT_UInt16,
        PixelType::Int16 => GDALDataType::GDT_Int16,
        PixelType::UInt32 => GDALDataType::GDT_UInt32,
        PixelType::Int32 => GDALDataType::GDT_Int32,
        PixelType::Float32 => GDALDataType::GDT_Float32,
        PixelType::Float64 => GDALDataType::GDT_Float64,
        PixelType::CInt16 => GDALDataType::GDT_CInt16,
        PixelType::CInt32 => GDALDataType::GDT_CInt32,
        PixelType::CFloat32 => GDALDataType::GDT_CFloat32,
        PixelType::CFloat64 => GDALDataType::GDT_CFloat64,
    }
}

/// Capability flags as advertised in the driver metadata
pub fn driver_capabilities(driver: &Driver) -> DriverCapabilities {
    DriverCapabilities {
        create: driver.metadata_item("DCAP_CREATE", "").is_some(),
        create_copy: driver.metadata_item("DCAP_CREATECOPY", "").is_some(),
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.to_string_lossy().as_bytes()).map_err(|_| Error::InvalidArgument {
        arg: "path",
        value: path.display().to_string(),
    })
}

fn option_list(options: &CreationOptions) -> Result<CslStringList> {
    let mut list = CslStringList::new();
    for (key, value) in options {
        list.set_name_value(key, value)?;
    }
    Ok(list)
}

fn checked_dim(value: usize, arg: &'static str) -> Result<c_int> {
    c_int::try_from(value).map_err(|_| Error::InvalidArgument {
        arg,
        value: value.to_string(),
    })
}

/// Run one `GDALRasterIO` over `tile` of `band` using the buffer's own pixel type
fn raster_io(
    dataset: &Dataset,
    flag: GDALRWFlag::Type,
    tile: &Tile,
    band: usize,
    pixel_type: PixelType,
    data: *mut c_void,
) -> std::result::Result<(), String> {
    let band_index = c_int::try_from(band).map_err(|_| format!("band index {} out of range", band))?;
    let (x, y, w, h) = (
        c_int::try_from(tile.x).map_err(|e| e.to_string())?,
        c_int::try_from(tile.y).map_err(|e| e.to_string())?,
        c_int::try_from(tile.width).map_err(|e| e.to_string())?,
        c_int::try_from(tile.height).map_err(|e| e.to_string())?,
    );
    reset_last_error();
    unsafe {
        let c_band = gdal_sys::GDALGetRasterBand(dataset.c_dataset(), band_index);
        if c_band.is_null() {
            return Err(last_error_or("band does not exist"));
        }
        let err = gdal_sys::GDALRasterIO(
            c_band,
            flag,
            x,
            y,
            w,
            h,
            data,
            w,
            h,
            pixel_type_to_gdal(pixel_type),
            0,
            0,
        );
        if err != CPLErr::CE_None {
            return Err(last_error_or("RasterIO failed"));
        }
    }
    Ok(())
}

/// Read-only dataset opened through GDAL
pub struct GdalSource {
    dataset: Dataset,
    path: PathBuf,
}

impl GdalSource {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceRaster for GdalSource {
    fn descriptor(&self) -> Result<RasterDescriptor> {
        let (width, height) = self.dataset.raster_size();
        let bands = self.dataset.raster_count() as usize;
        let mut band_types = Vec::with_capacity(bands);
        for index in 1..=bands {
            let band_index = checked_dim(index, "band")?;
            let data_type = unsafe {
                let c_band = gdal_sys::GDALGetRasterBand(self.dataset.c_dataset(), band_index);
                if c_band.is_null() {
                    return Err(Error::Read {
                        band: index,
                        x: 0,
                        y: 0,
                        message: last_error_or("band does not exist"),
                    });
                }
                gdal_sys::GDALGetRasterDataType(c_band)
            };
            band_types.push(pixel_type_from_gdal(data_type)?);
        }
        let projection = self.dataset.projection();
        Ok(RasterDescriptor {
            width,
            height,
            band_types,
            projection: if projection.is_empty() {
                None
            } else {
                Some(projection)
            },
            geo_transform: self.dataset.geo_transform().ok(),
        })
    }

    fn read_block(&self, tile: &Tile, buffer: &mut BandBuffer) -> Result<()> {
        let read_error = |message: String| Error::Read {
            band: buffer.band,
            x: tile.x,
            y: tile.y,
            message,
        };
        if buffer.data.len() != tile.buffer_len(buffer.pixel_type) {
            return Err(read_error(format!(
                "buffer holds {} bytes, tile needs {}",
                buffer.data.len(),
                tile.buffer_len(buffer.pixel_type)
            )));
        }
        let data = buffer.data.as_mut_ptr() as *mut c_void;
        raster_io(
            &self.dataset,
            GDALRWFlag::GF_Read,
            tile,
            buffer.band,
            buffer.pixel_type,
            data,
        )
        .map_err(read_error)
    }
}

/// Dataset created through `GDALCreate`; closed (and flushed) on drop
pub struct GdalDestination {
    dataset: Dataset,
}

impl GdalDestination {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

impl DestinationRaster for GdalDestination {
    fn set_projection(&mut self, wkt: &str) -> Result<()> {
        self.dataset.set_projection(wkt)?;
        Ok(())
    }

    fn set_geo_transform(&mut self, geo_transform: &[f64; 6]) -> Result<()> {
        self.dataset.set_geo_transform(geo_transform)?;
        Ok(())
    }

    fn write_block(&mut self, tile: &Tile, buffer: &BandBuffer) -> Result<()> {
        let write_error = |message: String| Error::Write {
            band: buffer.band,
            x: tile.x,
            y: tile.y,
            message,
        };
        if buffer.data.len() != tile.buffer_len(buffer.pixel_type) {
            return Err(write_error(format!(
                "buffer holds {} bytes, tile needs {}",
                buffer.data.len(),
                tile.buffer_len(buffer.pixel_type)
            )));
        }
        // GF_Write only reads from the buffer
        let data = buffer.data.as_ptr() as *mut c_void;
        raster_io(
            &self.dataset,
            GDALRWFlag::GF_Write,
            tile,
            buffer.band,
            buffer.pixel_type,
            data,
        )
        .map_err(write_error)
    }
}

unsafe extern "C" fn copy_progress(
    complete: f64,
    _message: *const c_char,
    progress_arg: *mut c_void,
) -> c_int {
    let callback = unsafe { &mut *(progress_arg as *mut &mut dyn FnMut(f64) -> bool) };
    if callback(complete) { 1 } else { 0 }
}

/// Raster backend over the process-wide GDAL driver registry
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalBackend;

impl GdalBackend {
    pub fn new() -> Self {
        Self
    }

    fn driver(&self, name: &str) -> Result<Driver> {
        raster_driver(name)
    }
}

/// Registered driver `name`, provided it handles rasters
pub fn raster_driver(name: &str) -> Result<Driver> {
    let unknown = || Error::UnknownDriver {
        name: name.to_string(),
    };
    let driver = DriverManager::get_driver_by_name(name).map_err(|_| unknown())?;
    if driver.metadata_item("DCAP_RASTER", "").is_none() {
        debug!("Driver {} has no raster support", name);
        return Err(unknown());
    }
    Ok(driver)
}

impl RasterBackend for GdalBackend {
    type Source = GdalSource;
    type Destination = GdalDestination;

    fn open(&self, path: &Path, driver: Option<&str>) -> Result<GdalSource> {
        let allowed: Vec<&str> = driver.into_iter().collect();
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_RASTER,
            allowed_drivers: if allowed.is_empty() {
                None
            } else {
                Some(allowed.as_slice())
            },
            ..Default::default()
        };
        reset_last_error();
        let dataset = Dataset::open_ex(path, options).map_err(|e| Error::Open {
            path: path.to_path_buf(),
            message: library_message(&e),
        })?;
        debug!("Opened {:?} with GDAL", path);
        Ok(GdalSource {
            dataset,
            path: path.to_path_buf(),
        })
    }

    fn capabilities(&self, driver: &str) -> Result<DriverCapabilities> {
        Ok(driver_capabilities(&self.driver(driver)?))
    }

    fn create(
        &self,
        driver: &str,
        path: &Path,
        spec: &CreateSpec,
        options: &CreationOptions,
    ) -> Result<GdalDestination> {
        let driver = self.driver(driver)?;
        let c_path = path_to_cstring(path)?;
        let list = option_list(options)?;
        let width = checked_dim(spec.width, "width")?;
        let height = checked_dim(spec.height, "height")?;
        let bands = checked_dim(spec.bands, "bands")?;
        reset_last_error();
        let c_dataset = unsafe {
            gdal_sys::GDALCreate(
                driver.c_driver(),
                c_path.as_ptr(),
                width,
                height,
                bands,
                pixel_type_to_gdal(spec.pixel_type),
                list.as_ptr(),
            )
        };
        if c_dataset.is_null() {
            return Err(Error::Create {
                path: path.to_path_buf(),
                message: last_error_or("GDALCreate returned no dataset"),
            });
        }
        Ok(GdalDestination {
            dataset: unsafe { Dataset::from_c_dataset(c_dataset) },
        })
    }

    fn create_copy(
        &self,
        driver: &str,
        path: &Path,
        source: &GdalSource,
        options: &CreationOptions,
        progress: &mut dyn FnMut(f64) -> bool,
    ) -> Result<()> {
        let driver = self.driver(driver)?;
        let c_path = path_to_cstring(path)?;
        let list = option_list(options)?;
        let mut callback: &mut dyn FnMut(f64) -> bool = progress;
        let progress_arg = &mut callback as *mut &mut dyn FnMut(f64) -> bool as *mut c_void;
        reset_last_error();
        let c_dataset = unsafe {
            gdal_sys::GDALCreateCopy(
                driver.c_driver(),
                c_path.as_ptr(),
                source.dataset.c_dataset(),
                0,
                list.as_ptr(),
                Some(copy_progress),
                progress_arg,
            )
        };
        if c_dataset.is_null() {
            return Err(Error::Copy {
                path: path.to_path_buf(),
                message: last_error_or("GDALCreateCopy returned no dataset"),
            });
        }
        // Closing flushes the copy to disk
        drop(unsafe { Dataset::from_c_dataset(c_dataset) });
        Ok(())
    }
}
