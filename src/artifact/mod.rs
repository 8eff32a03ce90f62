//! Artifact inputs - what an operator hands over when registering a release
//!
//! - `.jar` packs carrying a `META-INF/MANIFEST.MF` with the pack metadata
//! - `output-metadata.json` build descriptors pointing at an apk
//! - the file store the binaries are copied into

pub mod manifest;
pub mod descriptor;
pub mod files;

pub use manifest::{PackManifest, read_pack_jar};
pub use descriptor::{ApkDescriptor, read_apk_descriptor};
pub use files::FileStore;
