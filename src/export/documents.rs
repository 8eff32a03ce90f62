//! Exported document shapes
//!
//! Field names and the `-1` date sentinel are read by the delivery server
//! and must not change.

use std::collections::BTreeMap;
use serde::Serialize;
use crate::model::{Apk, KnownBug, Pack, epoch_millis};

/// `Updates/Latest_Sc_v{sc}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestPackDoc<'a> {
    pub name: &'a str,
    pub pack_version: &'a str,
    pub pack_v_code: i64,
    pub changelog: &'a str,
}

/// One element of `History/History_Sc_v{sc}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry<'a> {
    pub name: &'a str,
    pub pack_version: &'a str,
    pub pack_v_code: i64,
    pub min_apk_v_code: i64,
    pub created_at: i64,
}

/// One bug in `KnownBugs/KnownBugs_Sc_v{sc}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownBugEntry<'a> {
    pub filed_on: i64,
    pub description: &'a str,
    pub category: &'a str,
    pub fixed_on: i64,
}

/// One element of `ServerPacks.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerPackEntry<'a> {
    pub sc_version: &'a str,
    pub name: &'a str,
    pub pack_version: &'a str,
    pub pack_v_code: i64,
    pub min_apk_v_code: i64,
    pub changelog: &'a str,
}

/// `ServerApks.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerApkDoc<'a> {
    pub name: &'a str,
    pub apk_v_code: i64,
    pub apk_v_name: &'a str,
    pub created_at: i64,
}

pub fn latest_pack(pack: &Pack) -> LatestPackDoc<'_> {
    LatestPackDoc {
        name: &pack.name,
        pack_version: &pack.pack_version,
        pack_v_code: pack.pack_v_code,
        changelog: &pack.changelog,
    }
}

/// History entries in the order the packs are given
pub fn history(packs: &[Pack]) -> Vec<HistoryEntry<'_>> {
    packs
        .iter()
        .map(|pack| HistoryEntry {
            name: &pack.name,
            pack_version: &pack.pack_version,
            pack_v_code: pack.pack_v_code,
            min_apk_v_code: pack.min_apk_v_code,
            created_at: epoch_millis(Some(&pack.created_at)),
        })
        .collect()
}

pub fn known_bugs(
    bugs_by_pack_version: &BTreeMap<String, Vec<KnownBug>>,
) -> BTreeMap<&str, Vec<KnownBugEntry<'_>>> {
    bugs_by_pack_version
        .iter()
        .map(|(pack_version, bugs)| {
            let entries = bugs
                .iter()
                .map(|bug| KnownBugEntry {
                    filed_on: epoch_millis(Some(&bug.filed_on)),
                    description: &bug.description,
                    category: &bug.category,
                    fixed_on: epoch_millis(bug.fixed_on.as_ref()),
                })
                .collect();
            (pack_version.as_str(), entries)
        })
        .collect()
}

pub fn server_packs(latest: &[Pack]) -> Vec<ServerPackEntry<'_>> {
    latest
        .iter()
        .map(|pack| ServerPackEntry {
            sc_version: &pack.sc_version,
            name: &pack.name,
            pack_version: &pack.pack_version,
            pack_v_code: pack.pack_v_code,
            min_apk_v_code: pack.min_apk_v_code,
            changelog: &pack.changelog,
        })
        .collect()
}

pub fn server_apk(apk: &Apk) -> ServerApkDoc<'_> {
    ServerApkDoc {
        name: &apk.name,
        apk_v_code: apk.apk_v_code,
        apk_v_name: &apk.apk_v_name,
        created_at: epoch_millis(Some(&apk.created_at)),
    }
}
