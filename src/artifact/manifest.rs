//! Pack jar manifests

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;
use crate::{Error, Result};

pub const CLASSES_DEX: &str = "classes.dex";
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Manifest attributes every pack must declare
pub const REQUIRED_ATTRIBUTES: [&str; 7] = [
    "Flavor",
    "Development",
    "PackVersion",
    "PackVersionCode",
    "MinApkVersionCode",
    "PackImplClass",
    "ScVersion",
];

/// Pack metadata read from a jar manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackManifest {
    pub flavor: String,
    pub development: String,
    pub pack_version: String,
    pub pack_v_code: i64,
    pub min_apk_v_code: i64,
    pub pack_impl_class: String,
    pub sc_version: String,
}

impl PackManifest {
    /// Attribute/value pairs in manifest order, for display
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Flavor", self.flavor.clone()),
            ("Development", self.development.clone()),
            ("PackVersion", self.pack_version.clone()),
            ("PackVersionCode", self.pack_v_code.to_string()),
            ("MinApkVersionCode", self.min_apk_v_code.to_string()),
            ("PackImplClass", self.pack_impl_class.clone()),
            ("ScVersion", self.sc_version.clone()),
        ]
    }
}

/// Parse manifest text.
///
/// Lines are `Key: Value`; a line starting with a single space continues the
/// previous value. Every attribute in [`REQUIRED_ATTRIBUTES`] must be present
/// and the two version codes must be integers. `ScVersion` names exported
/// files, so it may not contain path separators or `..`.
pub fn parse_manifest(text: &str) -> Result<PackManifest> {
    let mut attrs: HashMap<String, String> = HashMap::new();
    let mut last_key: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(value) = last_key.as_ref().and_then(|k| attrs.get_mut(k)) {
                value.push_str(continuation);
            }
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => {
                let key = key.trim().to_string();
                attrs.insert(key.clone(), value.trim().to_string());
                last_key = Some(key);
            }
            None => last_key = None,
        }
    }

    let missing: Vec<_> = REQUIRED_ATTRIBUTES
        .iter()
        .filter(|name| !attrs.contains_key(**name))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(Error::InputValidation(format!(
            "missing attribute(s) in manifest: {}",
            missing.join(", ")
        )));
    }

    let mut take = |name: &str| attrs.remove(name).unwrap_or_default();
    let code = |name: &str, raw: String| -> Result<i64> {
        raw.parse().map_err(|_| {
            Error::InputValidation(format!("manifest attribute {} is not an integer: '{}'", name, raw))
        })
    };

    let sc_version = take("ScVersion");
    if sc_version.is_empty() || sc_version.contains(['/', '\\']) || sc_version.contains("..") {
        return Err(Error::InputValidation(format!(
            "manifest attribute ScVersion is not usable in a file name: '{}'",
            sc_version
        )));
    }

    Ok(PackManifest {
        flavor: take("Flavor"),
        development: take("Development"),
        pack_version: take("PackVersion"),
        pack_v_code: code("PackVersionCode", take("PackVersionCode"))?,
        min_apk_v_code: code("MinApkVersionCode", take("MinApkVersionCode"))?,
        pack_impl_class: take("PackImplClass"),
        sc_version,
    })
}

/// Validate a pack jar and read its manifest
pub fn read_pack_jar(path: &Path) -> Result<PackManifest> {
    if !path.is_file() {
        return Err(Error::InputValidation(format!(
            "specified file ({}) does not exist",
            path.display()
        )));
    }
    if path.extension().and_then(|e| e.to_str()) != Some("jar") {
        return Err(Error::InputValidation(format!(
            "{} is an invalid name for a pack (expected a .jar)",
            path.display()
        )));
    }

    let mut archive = zip::ZipArchive::new(File::open(path)?).map_err(|e| {
        Error::InputValidation(format!("{} is not a readable jar: {}", path.display(), e))
    })?;

    let has_dex = archive.file_names().any(|name| name == CLASSES_DEX);
    if !has_dex {
        return Err(Error::InputValidation(format!(
            "{} was not found in pack, invalid pack",
            CLASSES_DEX
        )));
    }
    let has_manifest = archive.file_names().any(|name| name == MANIFEST_PATH);
    if !has_manifest {
        return Err(Error::InputValidation(format!(
            "{} was not found in jar file, invalid pack",
            MANIFEST_PATH
        )));
    }

    let mut text = String::new();
    archive.by_name(MANIFEST_PATH)?.read_to_string(&mut text)?;
    debug!("Read {} bytes of manifest from {}", text.len(), path.display());
    parse_manifest(&text)
}
