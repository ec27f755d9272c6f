use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::tiles::DEFAULT_TILE_SIZE;
use crate::error::{Error, Result};
use crate::types::ProcessingMode;

/// Creation options passed verbatim to the output driver (`KEY=VALUE`)
pub type CreationOptions = BTreeMap<String, String>;

/// Number of workers used when the caller does not pick one
pub fn default_parallelism() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// One conversion job. Owned by the run it spawns and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Restrict which driver may open the input; None lets GDAL probe
    #[serde(default)]
    pub input_driver: Option<String>,
    /// Short name of the output driver, e.g. "GTiff"
    pub output_driver: String,
    #[serde(default)]
    pub options: CreationOptions,
    pub mode: ProcessingMode,
    pub parallelism: NonZeroUsize,
}

impl ConversionRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        output_driver: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            input_driver: None,
            output_driver: output_driver.into(),
            options: CreationOptions::new(),
            mode: ProcessingMode::Cpu,
            parallelism: default_parallelism(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_parallelism(mut self, parallelism: NonZeroUsize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_input_driver(mut self, driver: impl Into<String>) -> Self {
        self.input_driver = Some(driver.into());
        self
    }
}

fn default_tile_size() -> usize {
    DEFAULT_TILE_SIZE
}

/// Reusable conversion settings. Input/output paths are deliberately left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionPreset {
    pub output_driver: String,
    #[serde(default)]
    pub options: CreationOptions,
    pub mode: ProcessingMode,
    pub parallelism: NonZeroUsize,
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,
}

impl Default for ConversionPreset {
    fn default() -> Self {
        Self {
            output_driver: "GTiff".to_string(),
            options: CreationOptions::new(),
            mode: ProcessingMode::Cpu,
            parallelism: default_parallelism(),
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl ConversionPreset {
    /// Build a request for the given paths from these settings
    pub fn request(&self, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> ConversionRequest {
        ConversionRequest {
            input: input.into(),
            output: output.into(),
            input_driver: None,
            output_driver: self.output_driver.clone(),
            options: self.options.clone(),
            mode: self.mode,
            parallelism: self.parallelism,
        }
    }

    /// Serialize to the preset file format: a commented header followed by JSON
    pub fn to_preset_string(&self) -> Result<String> {
        let mut content = String::new();
        content.push_str("// ==========================================\n");
        content.push_str("// rasterconv Conversion Preset\n");
        content.push_str("// ==========================================\n");
        content.push_str(&format!("// Version: {}\n", env!("CARGO_PKG_VERSION")));
        content.push_str(&format!("// Generated: {}\n", chrono::Utc::now().to_rfc3339()));
        content.push_str("// Note: Input/Output paths are not included in presets\n");
        content.push_str("// ==========================================\n\n");
        content.push_str(&serde_json::to_string_pretty(self)?);
        content.push('\n');
        Ok(content)
    }

    /// Parse a preset file body, skipping the comment header
    pub fn from_preset_str(content: &str) -> Result<Self> {
        let json_start = content.find('{').ok_or_else(|| Error::InvalidArgument {
            arg: "preset",
            value: "no JSON content found".to_string(),
        })?;
        let preset: ConversionPreset = serde_json::from_str(&content[json_start..])?;
        if preset.tile_size == 0 {
            return Err(Error::InvalidArgument {
                arg: "tile_size",
                value: "0".to_string(),
            });
        }
        Ok(preset)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_preset_string()?)?;
        tracing::info!("Preset saved to: {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_preset_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_collects_options() {
        let request = ConversionRequest::new("in.tif", "out.img", "HFA")
            .with_option("COMPRESSED", "YES")
            .with_option("COMPRESSED", "NO")
            .with_parallelism(NonZeroUsize::new(3).unwrap());
        assert_eq!(request.options.len(), 1);
        assert_eq!(request.options["COMPRESSED"], "NO");
        assert_eq!(request.parallelism.get(), 3);
        assert_eq!(request.mode, ProcessingMode::Cpu);
    }

    #[test]
    fn preset_survives_header_and_json() {
        let mut preset = ConversionPreset::default();
        preset.options.insert("COMPRESS".into(), "LZW".into());
        preset.mode = ProcessingMode::Gpu;
        let text = preset.to_preset_string().unwrap();
        assert!(text.starts_with("// ===="));
        let loaded = ConversionPreset::from_preset_str(&text).unwrap();
        assert_eq!(loaded, preset);
    }

    #[test]
    fn preset_without_tile_size_gets_default() {
        let json = r#"{"output_driver":"PNG","mode":"Cpu","parallelism":2}"#;
        let preset = ConversionPreset::from_preset_str(json).unwrap();
        assert_eq!(preset.tile_size, DEFAULT_TILE_SIZE);
        assert!(preset.options.is_empty());
    }

    #[test]
    fn preset_rejects_missing_json_and_zero_tiles() {
        assert!(ConversionPreset::from_preset_str("// nothing here").is_err());
        let json = r#"{"output_driver":"PNG","mode":"Cpu","parallelism":2,"tile_size":0}"#;
        assert!(matches!(
            ConversionPreset::from_preset_str(json),
            Err(Error::InvalidArgument { arg: "tile_size", .. })
        ));
    }

    #[test]
    fn preset_file_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.rasterconv");
        let preset = ConversionPreset {
            output_driver: "HFA".into(),
            tile_size: 512,
            ..ConversionPreset::default()
        };
        preset.save(&path).unwrap();
        assert_eq!(ConversionPreset::load(&path).unwrap(), preset);
        let request = preset.request("a.tif", "b.img");
        assert_eq!(request.output_driver, "HFA");
        assert_eq!(request.input, PathBuf::from("a.tif"));
    }
}
