//! Raster driver catalog: names, extensions and write capabilities of the
//! drivers registered with GDAL, plus output file name suggestions.
use std::path::{Path, PathBuf};

use gdal::{Driver, DriverManager, Metadata};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::io::gdal::{driver_capabilities, raster_driver};
use crate::io::options::{OptionSpec, parse_creation_options};
use crate::types::DriverCapabilities;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverInfo {
    pub short_name: String,
    pub long_name: String,
    /// Known file extensions without the leading dot, preferred first
    pub extensions: Vec<String>,
    pub capabilities: DriverCapabilities,
}

impl DriverInfo {
    fn from_driver(driver: &Driver) -> Self {
        Self {
            short_name: driver.short_name(),
            long_name: driver.long_name(),
            extensions: parse_extensions(
                driver.metadata_item("DMD_EXTENSIONS", "").as_deref(),
                driver.metadata_item("DMD_EXTENSION", "").as_deref(),
            ),
            capabilities: driver_capabilities(driver),
        }
    }

    /// `Long Name (SHORT)`, as shown in a driver picker
    pub fn label(&self) -> String {
        format!("{} ({})", self.long_name, self.short_name)
    }

    /// File-dialog style filter, e.g. `GeoTIFF (*.tif *.tiff)`
    pub fn file_filter(&self) -> String {
        if self.extensions.is_empty() {
            format!("{} (*)", self.long_name)
        } else {
            let patterns: Vec<String> = self.extensions.iter().map(|e| format!("*.{}", e)).collect();
            format!("{} ({})", self.long_name, patterns.join(" "))
        }
    }

    pub fn default_extension(&self) -> Option<&str> {
        self.extensions.first().map(String::as_str)
    }
}

/// Split a `DMD_EXTENSIONS` list, falling back to the single `DMD_EXTENSION`
pub fn parse_extensions(extensions: Option<&str>, extension: Option<&str>) -> Vec<String> {
    match extensions {
        Some(list) => list.split_whitespace().map(str::to_string).collect(),
        None => extension
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| vec![e.to_string()])
            .unwrap_or_default(),
    }
}

/// Every registered driver that handles raster data
pub fn raster_drivers() -> Result<Vec<DriverInfo>> {
    let count = DriverManager::count();
    let mut drivers = Vec::with_capacity(count);
    for index in 0..count {
        let driver = DriverManager::get_driver(index)?;
        if driver.metadata_item("DCAP_RASTER", "").is_none() {
            continue;
        }
        drivers.push(DriverInfo::from_driver(&driver));
    }
    debug!("{} raster drivers registered", drivers.len());
    Ok(drivers)
}

/// Raster drivers able to write, through either Create or CreateCopy
pub fn output_drivers() -> Result<Vec<DriverInfo>> {
    Ok(raster_drivers()?
        .into_iter()
        .filter(|d| d.capabilities.can_write())
        .collect())
}

pub fn find_driver(name: &str) -> Result<DriverInfo> {
    Ok(DriverInfo::from_driver(&raster_driver(name)?))
}

/// Creation options advertised by `name`; empty when it publishes none
pub fn creation_option_specs(name: &str) -> Result<Vec<OptionSpec>> {
    let driver = raster_driver(name)?;
    match driver.metadata_item("DMD_CREATIONOPTIONLIST", "") {
        Some(xml) => parse_creation_options(&xml),
        None => Ok(Vec::new()),
    }
}

/// Output path to propose after picking a driver with `extension`.
///
/// With no current output the input's directory and stem are reused. An
/// existing output keeps its stem and gets its extension replaced unless it
/// already matches (case-insensitively). `None` when nothing can be
/// suggested.
pub fn suggest_output_path(input: &Path, current: Option<&Path>, extension: &str) -> Option<PathBuf> {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return None;
    }
    match current.filter(|p| !p.as_os_str().is_empty()) {
        None => {
            let stem = input.file_stem()?;
            Some(input.with_file_name(format!("{}.{}", stem.to_string_lossy(), extension)))
        }
        Some(output) => {
            let matches = output
                .extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(extension));
            if matches {
                Some(output.to_path_buf())
            } else {
                Some(output.with_extension(extension))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn extensions_prefer_list_over_single() {
        assert_eq!(parse_extensions(Some("tif tiff"), Some("tif")), ["tif", "tiff"]);
        assert_eq!(parse_extensions(None, Some("img")), ["img"]);
        assert!(parse_extensions(None, None).is_empty());
        assert!(parse_extensions(Some("  "), None).is_empty());
    }

    #[test]
    fn suggestion_from_input_when_output_empty() {
        let input = Path::new("/data/scene.v2.tif");
        assert_eq!(
            suggest_output_path(input, None, "png"),
            Some(PathBuf::from("/data/scene.v2.png"))
        );
        assert_eq!(
            suggest_output_path(input, Some(Path::new("")), "png"),
            Some(PathBuf::from("/data/scene.v2.png"))
        );
    }

    #[test]
    fn suggestion_replaces_or_keeps_extension() {
        let input = Path::new("/data/in.tif");
        assert_eq!(
            suggest_output_path(input, Some(Path::new("/out/result.tif")), "img"),
            Some(PathBuf::from("/out/result.img"))
        );
        assert_eq!(
            suggest_output_path(input, Some(Path::new("/out/result.TIF")), "tif"),
            Some(PathBuf::from("/out/result.TIF"))
        );
        assert_eq!(suggest_output_path(input, None, ""), None);
    }

    #[test]
    fn gtiff_is_listed_as_writable() {
        let drivers = output_drivers().unwrap();
        let gtiff = drivers.iter().find(|d| d.short_name == "GTiff").unwrap();
        assert!(gtiff.capabilities.create);
        assert_eq!(gtiff.default_extension(), Some("tif"));
        assert_eq!(gtiff.file_filter(), "GeoTIFF (*.tif *.tiff)");
        assert!(drivers.iter().all(|d| d.capabilities.can_write()));
    }

    #[test]
    fn gtiff_publishes_compress_option() {
        let specs = creation_option_specs("GTiff").unwrap();
        assert!(specs.iter().any(|s| s.name == "COMPRESS"));
    }

    #[test]
    fn unknown_driver_lookup_fails() {
        assert!(matches!(
            find_driver("NoSuchFormat"),
            Err(Error::UnknownDriver { .. })
        ));
        assert!(matches!(
            find_driver("ESRI Shapefile"),
            Err(Error::UnknownDriver { .. })
        ));
    }
}
