//! Release registration
//!
//! Registering is split in two: `collect_*_plan` validates the artifact and
//! asks the operator everything up front, `apply_*_plan` writes the result
//! in one transaction. Nothing reaches the database before every question
//! is answered, and a failed apply leaves no partial release behind.

use std::path::{Path, PathBuf};
use tracing::info;
use crate::{Error, Result};
use crate::artifact::{ApkDescriptor, FileStore, PackManifest, read_apk_descriptor, read_pack_jar};
use crate::artifact::files::artifact_name;
use crate::model::{KnownBug, NewApk, NewPack, Pack};
use crate::prompt::Prompter;
use crate::storage::{InheritScope, ReleaseStore};

/// A bug filed while registering a pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBugReport {
    pub category: String,
    pub description: String,
}

/// Everything decided for a new pack before it is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackPlan {
    pub source: PathBuf,
    pub name: String,
    pub manifest: PackManifest,
    pub release_notes: Vec<String>,
    /// Pack whose active bugs the new pack starts with
    pub inherit_from: Option<i64>,
    /// Inherited bugs that are fixed in the new pack
    pub bugs_to_fix: Vec<i64>,
    pub new_bugs: Vec<NewBugReport>,
}

impl PackPlan {
    pub fn to_new_pack(&self) -> NewPack {
        NewPack {
            name: self.name.clone(),
            sc_version: self.manifest.sc_version.clone(),
            pack_version: self.manifest.pack_version.clone(),
            pack_v_code: self.manifest.pack_v_code,
            min_apk_v_code: self.manifest.min_apk_v_code,
            changelog: self.release_notes.join("\n"),
        }
    }
}

/// Everything decided for a new apk before it is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApkPlan {
    pub name: String,
    pub descriptor: ApkDescriptor,
    pub release_notes: Vec<String>,
}

impl ApkPlan {
    pub fn to_new_apk(&self) -> NewApk {
        NewApk {
            name: self.name.clone(),
            apk_v_code: self.descriptor.version_code,
            apk_v_name: self.descriptor.version_name.clone(),
            changelog: self.release_notes.join("\n"),
        }
    }
}

/// Validate a pack jar and walk the operator through its registration
pub fn collect_pack_plan(
    store: &ReleaseStore,
    prompter: &mut dyn Prompter,
    jar: &Path,
    name_override: Option<&str>,
) -> Result<PackPlan> {
    let manifest = read_pack_jar(jar)?;
    let name = artifact_name(jar, name_override)?;
    if store.get_pack_by_name(&name)?.is_some() {
        return Err(Error::DuplicateName(name));
    }

    prompter.say("Supplied the following (relevant) key-value pairs in the manifest attributes")?;
    for (attr, value) in manifest.attributes() {
        prompter.say(&format!("  {} - {}", attr, value))?;
    }

    prompter.say("Input Changelog / Release Notes (leave empty to continue)")?;
    let release_notes = prompter.read_lines("Next: ")?;

    let inherit_from = choose_inherit_source(store, prompter)?;

    let mut bugs_to_fix = Vec::new();
    let mut new_bugs = Vec::new();
    if prompter.confirm("Do you want to edit associated bugs?")? {
        if let Some(source) = inherit_from {
            let inherited = store.get_active_bugs(source)?;
            bugs_to_fix = choose_fixed_bugs(prompter, &inherited)?;
        }
        new_bugs = prompt_new_bugs(store, prompter)?;
    }

    Ok(PackPlan {
        source: jar.to_path_buf(),
        name,
        manifest,
        release_notes,
        inherit_from,
        bugs_to_fix,
        new_bugs,
    })
}

/// Ask which existing pack the new one inherits its known bugs from.
///
/// The operator picks a lineage, then a pack within it; a lineage with a
/// single pack needs no second question.
pub fn choose_inherit_source(store: &ReleaseStore, prompter: &mut dyn Prompter) -> Result<Option<i64>> {
    let sc_versions = store.get_sc_versions()?;
    if sc_versions.is_empty() || !prompter.confirm("Should the pack inherit Known Bugs?")? {
        return Ok(None);
    }

    let sc_idx = prompter.select_one("Choose the ScVersion to inherit Known Bugs from", &sc_versions)?;
    let packs = store.get_packs_for_sc(&sc_versions[sc_idx])?;
    let pack: &Pack = match packs.as_slice() {
        [only] => only,
        _ => {
            let labels: Vec<String> = packs.iter().map(ToString::to_string).collect();
            &packs[prompter.select_one("Choose a pack that supports this ScVersion", &labels)?]
        }
    };
    prompter.say(&format!("Inheriting bugs from {}", pack))?;
    Ok(Some(pack.id))
}

fn choose_fixed_bugs(prompter: &mut dyn Prompter, inherited: &[KnownBug]) -> Result<Vec<i64>> {
    let labels: Vec<String> = inherited.iter().map(ToString::to_string).collect();
    let picked = prompter.select_many("Choose the bugs fixed in the new pack", &labels)?;
    Ok(picked.into_iter().map(|idx| inherited[idx].id).collect())
}

fn prompt_new_bugs(store: &ReleaseStore, prompter: &mut dyn Prompter) -> Result<Vec<NewBugReport>> {
    prompter.say("Input new Known Bugs (empty category to finish)")?;
    let categories = store.get_bug_categories()?;
    if !categories.is_empty() {
        prompter.say(&format!("Existing categories: {}", categories.join(", ")))?;
    }

    let mut reports = Vec::new();
    loop {
        let category = prompter.read_line("Input the new report's category: ")?;
        if category.trim().is_empty() {
            return Ok(reports);
        }
        let description = prompter.read_line("Input the new report's description: ")?;
        reports.push(NewBugReport {
            category: category.trim().to_string(),
            description: description.trim().to_string(),
        });
    }
}

/// Write a pack plan in one transaction, returning the new pack id.
///
/// Bugs fixed in the new pack are closed globally too if nobody closed them
/// yet, then closed for the new pack.
pub fn apply_pack_plan(store: &mut ReleaseStore, plan: &PackPlan) -> Result<i64> {
    store.in_transaction(|s| {
        let pack_id = s.insert_pack(&plan.to_new_pack())?;

        if let Some(source) = plan.inherit_from {
            s.inherit_bugs_from(source, pack_id, InheritScope::Active)?;
        }

        for &bug_id in &plan.bugs_to_fix {
            let bug = s
                .get_bug(bug_id)?
                .ok_or_else(|| Error::NotFound(format!("known bug {}", bug_id)))?;
            if !bug.is_fixed() {
                s.mark_bug_fixed(bug_id, false)?;
            }
            if s.fix_bug_for_pack(bug_id, pack_id)? == 0 {
                return Err(Error::NotFound(format!(
                    "known bug {} is not linked to pack {}",
                    bug_id, plan.name
                )));
            }
        }

        for report in &plan.new_bugs {
            let bug_id = s.insert_bug(&report.category, &report.description)?;
            s.link_bug(bug_id, pack_id)?;
        }

        info!(
            pack_id,
            name = %plan.name,
            fixed = plan.bugs_to_fix.len(),
            filed = plan.new_bugs.len(),
            "Registered pack"
        );
        Ok(pack_id)
    })
}

/// Validate an apk descriptor and ask for its release notes
pub fn collect_apk_plan(
    store: &ReleaseStore,
    prompter: &mut dyn Prompter,
    descriptor_path: &Path,
    name_override: Option<&str>,
) -> Result<ApkPlan> {
    let descriptor = read_apk_descriptor(descriptor_path)?;
    let name = artifact_name(&descriptor.output_file, name_override)?;
    if store.get_apk_by_v_name(&descriptor.version_name)?.is_some() {
        return Err(Error::DuplicateVersionName(descriptor.version_name));
    }

    prompter.say(&format!(
        "Apk {} - version {} (code {})",
        name, descriptor.version_name, descriptor.version_code
    ))?;
    prompter.say("Input Changelog / Release Notes (leave empty to continue)")?;
    let release_notes = prompter.read_lines("Next: ")?;

    Ok(ApkPlan { name, descriptor, release_notes })
}

/// Write an apk plan, returning the new apk id
pub fn apply_apk_plan(store: &mut ReleaseStore, plan: &ApkPlan) -> Result<i64> {
    store.in_transaction(|s| s.insert_apk(&plan.to_new_apk()))
}

/// Collect, copy the jar into the file store, then write
pub fn register_pack(
    store: &mut ReleaseStore,
    files: &FileStore,
    prompter: &mut dyn Prompter,
    jar: &Path,
    name_override: Option<&str>,
) -> Result<i64> {
    let plan = collect_pack_plan(store, prompter, jar, name_override)?;
    let stored = files.store_pack(&plan.source, &plan.name)?;
    prompter.say(&format!("Copied file to {}", stored.display()))?;
    apply_pack_plan(store, &plan)
}

/// Collect, copy the apk into the file store, then write
pub fn register_apk(
    store: &mut ReleaseStore,
    files: &FileStore,
    prompter: &mut dyn Prompter,
    descriptor_path: &Path,
    name_override: Option<&str>,
) -> Result<i64> {
    let plan = collect_apk_plan(store, prompter, descriptor_path, name_override)?;
    let stored = files.store_apk(&plan.descriptor.output_file, &plan.name)?;
    prompter.say(&format!("Copied file to {}", stored.display()))?;
    apply_apk_plan(store, &plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::descriptor::tests::{RELEASE_ELEMENT, descriptor_json};
    use crate::artifact::manifest::tests::{SAMPLE_MANIFEST, write_jar};
    use crate::artifact::manifest::{CLASSES_DEX, MANIFEST_PATH};
    use crate::prompt::ScriptedPrompter;

    fn pack_in_lineage(store: &ReleaseStore, name: &str, code: i64) -> i64 {
        store
            .insert_pack(&NewPack {
                name: name.to_string(),
                sc_version: "10.48.5.0".to_string(),
                pack_version: format!("1.2.{}", code),
                pack_v_code: code,
                min_apk_v_code: 1,
                changelog: String::new(),
            })
            .unwrap()
    }

    fn jar_in(dir: &Path) -> PathBuf {
        let jar = dir.join("Pack_v2.jar");
        write_jar(&jar, &[(CLASSES_DEX, "dex"), (MANIFEST_PATH, SAMPLE_MANIFEST)]);
        jar
    }

    #[test]
    fn test_register_pack_inherits_fixes_and_files_bugs() {
        let dir = tempfile::tempdir().unwrap();
        let jar = jar_in(dir.path());
        let mut store = ReleaseStore::open_in_memory().unwrap();
        let a = pack_in_lineage(&store, "Pack_v1.jar", 10);
        let saving = store.insert_bug("Saving", "Currently does not work").unwrap();
        let camera = store.insert_bug("Camera", "Black preview").unwrap();
        store.link_bug(saving, a).unwrap();
        store.link_bug(camera, a).unwrap();

        let mut prompter = ScriptedPrompter::new([
            "Fixed Saving", "", // release notes
            "y", "0",           // inherit from the only lineage (single pack)
            "y", "0", "",       // edit bugs: Saving fixed
            "UI", "Button misaligned", "",
        ]);
        let files = FileStore::new(dir.path().join("root"));
        let b = register_pack(&mut store, &files, &mut prompter, &jar, None).unwrap();
        assert_eq!(prompter.remaining(), 0);
        assert!(files.packs_dir().join("Pack_v2.jar").is_file());

        let pack = store.get_pack(b).unwrap().unwrap();
        assert_eq!(pack.name, "Pack_v2.jar");
        assert_eq!(pack.pack_v_code, 11);
        assert_eq!(pack.changelog, "Fixed Saving");

        let active: Vec<_> = store
            .get_active_bugs(b)
            .unwrap()
            .into_iter()
            .map(|bug| bug.category)
            .collect();
        assert_eq!(active, vec!["Camera", "UI"]);

        // Fixed globally, but still open for the pack it was never ported to
        assert!(store.get_bug(saving).unwrap().unwrap().is_fixed());
        assert_eq!(store.get_active_bugs(a).unwrap().len(), 2);
        let linked = store.get_linked_bugs(b).unwrap();
        assert!(linked.iter().any(|l| l.bug.id == saving && !l.link.is_active()));
    }

    #[test]
    fn test_register_pack_without_history_asks_no_inherit_question() {
        let dir = tempfile::tempdir().unwrap();
        let jar = jar_in(dir.path());
        let mut store = ReleaseStore::open_in_memory().unwrap();

        let mut prompter = ScriptedPrompter::new(["", "n"]);
        let files = FileStore::new(dir.path());
        let id = register_pack(&mut store, &files, &mut prompter, &jar, Some("First.jar")).unwrap();
        assert_eq!(store.get_pack(id).unwrap().unwrap().name, "First.jar");
        assert!(store.get_active_bugs(id).unwrap().is_empty());
    }

    #[test]
    fn test_choose_inherit_source_picks_within_lineage() {
        let store = ReleaseStore::open_in_memory().unwrap();
        pack_in_lineage(&store, "old.jar", 10);
        let newer = pack_in_lineage(&store, "new.jar", 11);

        // Packs are listed most recent first
        let mut prompter = ScriptedPrompter::new(["y", "0", "0"]);
        assert_eq!(choose_inherit_source(&store, &mut prompter).unwrap(), Some(newer));

        let mut declined = ScriptedPrompter::new(["n"]);
        assert_eq!(choose_inherit_source(&store, &mut declined).unwrap(), None);
    }

    #[test]
    fn test_duplicate_pack_rejected_before_prompting() {
        let dir = tempfile::tempdir().unwrap();
        let jar = jar_in(dir.path());
        let store = ReleaseStore::open_in_memory().unwrap();
        pack_in_lineage(&store, "Pack_v2.jar", 10);

        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        let err = collect_pack_plan(&store, &mut prompter, &jar, None).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "Pack_v2.jar"));
        assert!(prompter.transcript.is_empty());
    }

    #[test]
    fn test_apply_pack_plan_is_atomic() {
        let mut store = ReleaseStore::open_in_memory().unwrap();
        let plan = PackPlan {
            source: PathBuf::from("Pack_v2.jar"),
            name: "Pack_v2.jar".to_string(),
            manifest: crate::artifact::manifest::parse_manifest(SAMPLE_MANIFEST).unwrap(),
            release_notes: vec!["notes".to_string()],
            inherit_from: None,
            bugs_to_fix: vec![99],
            new_bugs: vec![],
        };
        assert!(matches!(apply_pack_plan(&mut store, &plan), Err(Error::NotFound(_))));
        assert!(store.get_pack_by_name("Pack_v2.jar").unwrap().is_none());
    }

    #[test]
    fn test_register_apk() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = dir.path().join("output-metadata.json");
        std::fs::write(&descriptor, descriptor_json(3, RELEASE_ELEMENT)).unwrap();
        std::fs::write(dir.path().join("app-release.apk"), b"apk bytes").unwrap();

        let mut store = ReleaseStore::open_in_memory().unwrap();
        let files = FileStore::new(dir.path().join("root"));
        let mut prompter = ScriptedPrompter::new(["New camera", "Bug fixes", ""]);
        register_apk(&mut store, &files, &mut prompter, &descriptor, None).unwrap();

        let apk = store.get_latest_apk().unwrap().unwrap();
        assert_eq!(apk.name, "app-release.apk");
        assert_eq!(apk.apk_v_code, 42);
        assert_eq!(apk.changelog, "New camera\nBug fixes");
        assert!(files.apks_dir().join("app-release.apk").is_file());

        let mut again = ScriptedPrompter::new(Vec::<String>::new());
        let err = collect_apk_plan(&store, &mut again, &descriptor, None).unwrap_err();
        assert!(matches!(err, Error::DuplicateVersionName(v) if v == "4.2.0"));
    }
}
