//! Apk build descriptors (`output-metadata.json`)

use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::{Error, Result};

/// The only descriptor format version understood
pub const SUPPORTED_VERSION: u32 = 3;

#[derive(Debug, Deserialize)]
struct OutputMetadata {
    version: u32,
    elements: Vec<OutputElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputElement {
    version_code: i64,
    version_name: String,
    output_file: String,
}

/// Apk metadata read from a build descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApkDescriptor {
    pub version_code: i64,
    pub version_name: String,
    /// The apk binary, resolved against the descriptor's directory
    pub output_file: PathBuf,
}

/// Parse descriptor JSON; `output_file` is joined onto `base_dir`
pub fn parse_apk_descriptor(json: &str, base_dir: &Path) -> Result<ApkDescriptor> {
    let metadata: OutputMetadata = serde_json::from_str(json)
        .map_err(|e| Error::InputValidation(format!("malformed build descriptor: {}", e)))?;

    if metadata.version != SUPPORTED_VERSION {
        return Err(Error::InputValidation(format!(
            "unsupported descriptor version {} (expected {})",
            metadata.version, SUPPORTED_VERSION
        )));
    }

    let mut elements = metadata.elements.into_iter();
    let (Some(element), None) = (elements.next(), elements.next()) else {
        return Err(Error::InputValidation(
            "build descriptor must contain exactly one element".to_string(),
        ));
    };

    Ok(ApkDescriptor {
        version_code: element.version_code,
        version_name: element.version_name,
        output_file: base_dir.join(element.output_file),
    })
}

/// Read and validate a descriptor file; the apk it names must exist
pub fn read_apk_descriptor(path: &Path) -> Result<ApkDescriptor> {
    if !path.is_file() {
        return Err(Error::InputValidation(format!(
            "specified file ({}) does not exist",
            path.display()
        )));
    }
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(Error::InputValidation(format!(
            "{} is not a build descriptor (expected a .json)",
            path.display()
        )));
    }

    let json = std::fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let descriptor = parse_apk_descriptor(&json, base_dir)?;

    if !descriptor.output_file.is_file() {
        return Err(Error::InputValidation(format!(
            "apk {} named by the descriptor does not exist",
            descriptor.output_file.display()
        )));
    }
    Ok(descriptor)
}
