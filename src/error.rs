//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Every conversion failure maps to one semantic variant; variants that stem from
//! the raster library carry its last error text so callers can surface it.
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ProcessingMode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open input file: {path}\nGDAL Error: {message}")]
    Open { path: PathBuf, message: String },

    #[error("Output driver not available: {name}")]
    UnknownDriver { name: String },

    #[error("Output driver {name} does not support Create or CreateCopy methods.")]
    UnsupportedDriver { name: String },

    #[error("Input dataset has no raster bands.")]
    EmptyRaster,

    #[error("Failed to create output dataset: {path}\nGDAL Error: {message}")]
    Create { path: PathBuf, message: String },

    #[error("Failed to create output dataset using CreateCopy: {path}\nGDAL Error: {message}")]
    Copy { path: PathBuf, message: String },

    #[error("Failed to read band {band} at ({x}, {y}) from input dataset.\nGDAL Error: {message}")]
    Read {
        band: usize,
        x: usize,
        y: usize,
        message: String,
    },

    #[error("Failed to write band {band} at ({x}, {y}) to output dataset.\nGDAL Error: {message}")]
    Write {
        band: usize,
        x: usize,
        y: usize,
        message: String,
    },

    #[error("Tile transform failed on band {band} at ({x}, {y}): {message}")]
    Transform {
        band: usize,
        x: usize,
        y: usize,
        message: String,
    },

    #[error("{mode} processing is not yet implemented.")]
    UnimplementedMode { mode: ProcessingMode },

    #[error("Unsupported pixel data type: {0}")]
    UnsupportedPixelType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }
}
