//! Creation-option schema parsing.
//!
//! Drivers publish their accepted creation options as the
//! `DMD_CREATIONOPTIONLIST` XML document. This module turns it into typed
//! specs a front end can render or fill with defaults. The conversion core
//! never validates options against it.
use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::params::CreationOptions;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionKind {
    Boolean,
    Int,
    Float,
    String,
    Enum(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    pub default: Option<String>,
    pub description: Option<String>,
}

impl OptionSpec {
    /// Value a form would submit untouched: booleans as YES/NO, enums as
    /// their default when it is one of the values and otherwise the first
    /// value, others verbatim
    pub fn default_value(&self) -> Option<String> {
        let default = self.default.as_deref().map(str::trim).filter(|d| !d.is_empty());
        match &self.kind {
            OptionKind::Boolean => Some(if default.is_some_and(is_truthy) {
                "YES".to_string()
            } else {
                "NO".to_string()
            }),
            OptionKind::Enum(values) => default
                .and_then(|d| values.iter().find(|v| v.as_str() == d))
                .or_else(|| values.first())
                .filter(|v| !v.is_empty())
                .cloned(),
            _ => default.map(str::to_string),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_uppercase().as_str(), "YES" | "TRUE" | "ON" | "1")
}

fn kind_from_type(type_name: &str) -> OptionKind {
    match type_name.trim().to_ascii_lowercase().as_str() {
        "boolean" => OptionKind::Boolean,
        "int" | "integer" | "uint" | "unsigned int" => OptionKind::Int,
        "float" | "double" => OptionKind::Float,
        _ => OptionKind::String,
    }
}

// Partially built <Option>; enum values are collected from <Value> children
struct PendingOption {
    spec: OptionSpec,
    values: Vec<String>,
}

fn start_option(e: &BytesStart<'_>) -> Result<PendingOption> {
    let mut name = String::new();
    let mut kind = OptionKind::String;
    let mut default = None;
    let mut description = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"name" => name = value,
            b"type" => kind = kind_from_type(&value),
            b"default" => default = Some(value),
            b"description" => description = Some(value),
            _ => {}
        }
    }
    Ok(PendingOption {
        spec: OptionSpec {
            name,
            kind,
            default,
            description,
        },
        values: Vec::new(),
    })
}

fn finish_option(pending: PendingOption, specs: &mut Vec<OptionSpec>) {
    let PendingOption { mut spec, values } = pending;
    if spec.name.is_empty() {
        debug!("Skipping creation option without a name");
        return;
    }
    if !values.is_empty() {
        spec.kind = OptionKind::Enum(values);
    }
    specs.push(spec);
}

/// Parse a `<CreationOptionList>` document, preserving option order
pub fn parse_creation_options(xml: &str) -> Result<Vec<OptionSpec>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut specs = Vec::new();
    let mut current: Option<PendingOption> = None;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"Option" => current = Some(start_option(&e)?),
                b"Value" => in_value = current.is_some(),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"Option" {
                    finish_option(start_option(&e)?, &mut specs);
                }
            }
            Ok(Event::Text(e)) => {
                if in_value {
                    if let Some(pending) = current.as_mut() {
                        pending.values.push(e.unescape()?.into_owned());
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"Option" => {
                    if let Some(pending) = current.take() {
                        finish_option(pending, &mut specs);
                    }
                }
                b"Value" => in_value = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(specs)
}

/// Flat option map as a form prefilled from the schema would submit it
pub fn schema_defaults(specs: &[OptionSpec]) -> CreationOptions {
    specs
        .iter()
        .filter_map(|spec| spec.default_value().map(|v| (spec.name.clone(), v)))
        .collect::<BTreeMap<_, _>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GTIFF_SUBSET: &str = r#"<CreationOptionList>
   <Option name='COMPRESS' type='string-select' default='NONE' description='Compression method'>
       <Value>NONE</Value>
       <Value>LZW</Value>
       <Value alias='DEFLATE'>ZIP</Value>
   </Option>
   <Option name='TILED' type='boolean' description='Switch to tiled format'/>
   <Option name='SPARSE_OK' type='boolean' default='TRUE'/>
   <Option name='BLOCKXSIZE' type='int' description='Tile Width'/>
   <Option name='MAX_Z_ERROR' type='float' default='0'/>
   <Option name='PROFILE' type='string' default='GDALGeoTIFF'/>
   <Option name='NBITS' type='unsigned int'/>
   <Option name='COPYRIGHT' type='string' description='&lt;c&gt; notice'/>
</CreationOptionList>"#;

    #[test]
    fn parses_kinds_defaults_and_enum_values() {
        let specs = parse_creation_options(GTIFF_SUBSET).unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "COMPRESS",
                "TILED",
                "SPARSE_OK",
                "BLOCKXSIZE",
                "MAX_Z_ERROR",
                "PROFILE",
                "NBITS",
                "COPYRIGHT"
            ]
        );
        assert_eq!(
            specs[0].kind,
            OptionKind::Enum(vec!["NONE".into(), "LZW".into(), "ZIP".into()])
        );
        assert_eq!(specs[0].default.as_deref(), Some("NONE"));
        assert_eq!(specs[1].kind, OptionKind::Boolean);
        assert_eq!(specs[3].kind, OptionKind::Int);
        assert_eq!(specs[4].kind, OptionKind::Float);
        assert_eq!(specs[6].kind, OptionKind::Int);
        assert_eq!(specs[7].description.as_deref(), Some("<c> notice"));
    }

    #[test]
    fn defaults_map_booleans_and_skip_empty() {
        let specs = parse_creation_options(GTIFF_SUBSET).unwrap();
        let defaults = schema_defaults(&specs);
        assert_eq!(defaults["COMPRESS"], "NONE");
        assert_eq!(defaults["TILED"], "NO");
        assert_eq!(defaults["SPARSE_OK"], "YES");
        assert_eq!(defaults["MAX_Z_ERROR"], "0");
        assert!(!defaults.contains_key("BLOCKXSIZE"));
        assert!(!defaults.contains_key("COPYRIGHT"));
    }

    #[test]
    fn enum_without_default_submits_first_value() {
        let specs = parse_creation_options(
            r#"<CreationOptionList>
   <Option name='INTERLEAVE' type='string-select'>
       <Value>BAND</Value>
       <Value>PIXEL</Value>
   </Option>
   <Option name='PREDICTOR' type='string-select' default='9'>
       <Value>1</Value>
       <Value>2</Value>
   </Option>
   <Option name='RESAMPLING' type='string-select' default='CUBIC'>
       <Value>NEAREST</Value>
       <Value>CUBIC</Value>
   </Option>
   <Option name='EMPTY' type='string-select'/>
</CreationOptionList>"#,
        )
        .unwrap();
        let defaults = schema_defaults(&specs);
        assert_eq!(defaults["INTERLEAVE"], "BAND");
        assert_eq!(defaults["PREDICTOR"], "1");
        assert_eq!(defaults["RESAMPLING"], "CUBIC");
        assert!(!defaults.contains_key("EMPTY"));
    }

    #[test]
    fn empty_document_has_no_options() {
        assert!(parse_creation_options("<CreationOptionList/>").unwrap().is_empty());
        assert!(parse_creation_options("").unwrap().is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_creation_options("<CreationOptionList><Option name='A'></Value>").is_err());
    }
}
