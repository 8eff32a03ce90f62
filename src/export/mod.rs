//! Export Layer - JSON snapshots for the delivery server
//!
//! Documents are built from already-fetched records by the functions in
//! [`documents`] and written under an [`ExportLayout`] root:
//! - `Packs/Info/Updates/Latest_Sc_v{sc}.json`
//! - `Packs/Info/History/History_Sc_v{sc}.json`
//! - `Packs/Info/KnownBugs/KnownBugs_Sc_v{sc}.json`
//! - `Packs/Info/ServerPacks.json`
//! - `Apks/Info/ServerApks.json`
//!
//! Every write replaces the target file whole.

pub mod documents;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::Serialize;
use tracing::{debug, info};
use crate::Result;
use crate::model::{Apk, KnownBug, Pack};
use crate::storage::ReleaseStore;

pub use documents::{
    HistoryEntry, KnownBugEntry, LatestPackDoc, ServerApkDoc, ServerPackEntry,
};

/// Paths of every exported document below one root directory
#[derive(Debug, Clone)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pack_info_dir(&self) -> PathBuf {
        self.root.join("Packs").join("Info")
    }

    pub fn apk_info_dir(&self) -> PathBuf {
        self.root.join("Apks").join("Info")
    }

    pub fn latest_pack_path(&self, sc_version: &str) -> PathBuf {
        self.pack_info_dir()
            .join("Updates")
            .join(format!("Latest_Sc_v{}.json", sc_version))
    }

    pub fn history_path(&self, sc_version: &str) -> PathBuf {
        self.pack_info_dir()
            .join("History")
            .join(format!("History_Sc_v{}.json", sc_version))
    }

    pub fn known_bugs_path(&self, sc_version: &str) -> PathBuf {
        self.pack_info_dir()
            .join("KnownBugs")
            .join(format!("KnownBugs_Sc_v{}.json", sc_version))
    }

    pub fn server_packs_path(&self) -> PathBuf {
        self.pack_info_dir().join("ServerPacks.json")
    }

    pub fn server_apk_path(&self) -> PathBuf {
        self.apk_info_dir().join("ServerApks.json")
    }
}

/// What one export pass wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub lineages: usize,
    pub files_written: Vec<PathBuf>,
    pub apk_written: bool,
}

impl std::fmt::Display for ExportReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Export Summary:")?;
        writeln!(f, "  Lineages: {}", self.lineages)?;
        writeln!(f, "  Files written: {}", self.files_written.len())?;
        write!(f, "  Server apk: {}", if self.apk_written { "written" } else { "skipped (no apk)" })
    }
}

/// Serialize `value` to `path`, creating parent directories and replacing
/// any previous file.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec(value)?;
    std::fs::write(path, bytes)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Write the latest-pack file of the pack's lineage
pub fn write_latest_pack(layout: &ExportLayout, pack: &Pack) -> Result<PathBuf> {
    let path = layout.latest_pack_path(&pack.sc_version);
    write_json(&path, &documents::latest_pack(pack))?;
    Ok(path)
}

/// Write the history file of one lineage
pub fn write_history(layout: &ExportLayout, sc_version: &str, packs: &[Pack]) -> Result<PathBuf> {
    let path = layout.history_path(sc_version);
    write_json(&path, &documents::history(packs))?;
    Ok(path)
}

/// Write the known-bugs file of one lineage
pub fn write_known_bugs(
    layout: &ExportLayout,
    sc_version: &str,
    bugs_by_pack_version: &BTreeMap<String, Vec<KnownBug>>,
) -> Result<PathBuf> {
    let path = layout.known_bugs_path(sc_version);
    write_json(&path, &documents::known_bugs(bugs_by_pack_version))?;
    Ok(path)
}

/// Write the global index of latest packs
pub fn write_server_packs(layout: &ExportLayout, latest: &[Pack]) -> Result<PathBuf> {
    let path = layout.server_packs_path();
    write_json(&path, &documents::server_packs(latest))?;
    Ok(path)
}

/// Write the server apk file; nothing is written without an apk
pub fn write_server_apk(layout: &ExportLayout, apk: Option<&Apk>) -> Result<Option<PathBuf>> {
    let Some(apk) = apk else {
        debug!("No apk registered, skipping {}", layout.server_apk_path().display());
        return Ok(None);
    };
    let path = layout.server_apk_path();
    write_json(&path, &documents::server_apk(apk))?;
    Ok(Some(path))
}

/// Regenerate every exported document from the store's current state
pub fn export_all(store: &ReleaseStore, layout: &ExportLayout) -> Result<ExportReport> {
    let mut report = ExportReport::default();

    let latest = store.get_latest_packs()?;
    report.files_written.push(write_server_packs(layout, &latest)?);
    for pack in &latest {
        report.files_written.push(write_latest_pack(layout, pack)?);
    }

    for sc_version in store.get_sc_versions()? {
        let packs = store.get_packs_for_sc(&sc_version)?;
        report.files_written.push(write_history(layout, &sc_version, &packs)?);

        // Oldest first so the newest pack owns a shared pack_version
        let mut bugs = BTreeMap::new();
        for pack in packs.iter().rev() {
            bugs.insert(pack.pack_version.clone(), store.get_active_bugs(pack.id)?);
        }
        report.files_written.push(write_known_bugs(layout, &sc_version, &bugs)?);
        report.lineages += 1;
    }

    if let Some(path) = write_server_apk(layout, store.get_latest_apk()?.as_ref())? {
        report.files_written.push(path);
        report.apk_written = true;
    }

    info!(
        lineages = report.lineages,
        files = report.files_written.len(),
        root = %layout.root().display(),
        "Export complete"
    );
    Ok(report)
}
