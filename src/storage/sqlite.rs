//! SQLite storage implementation

use std::path::Path;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};
use crate::{Error, Result};
use crate::clock::{Clock, SystemClock};
use crate::model::{Apk, KnownBug, LinkedBug, NewApk, NewPack, Pack, PackBugLink};
use super::schema;

const PACK_COLUMNS: &str =
    "id, name, sc_version, pack_version, pack_v_code, min_apk_v_code, changelog, created_at";
const APK_COLUMNS: &str = "id, name, apk_v_code, apk_v_name, changelog, created_at";

/// Which links of the source pack `inherit_bugs_from` copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InheritScope {
    /// Only links still active for the source pack.
    #[default]
    Active,
    /// Every link row of the source, including ones already closed there.
    All,
}

/// SQLite-backed release store.
///
/// The handle owns its connection; dropping it closes the database.
/// All timestamps are taken from the store's [`Clock`].
pub struct ReleaseStore {
    conn: Connection,
    clock: Box<dyn Clock>,
}

impl ReleaseStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        debug!("Opened release database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn, clock: Box::new(SystemClock) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", true)?;

        let version: i64 = self.conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > schema::SCHEMA_VERSION {
            return Err(Error::Schema(format!(
                "database schema version {} is newer than supported version {}",
                version,
                schema::SCHEMA_VERSION
            )));
        }

        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        self.conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)?;
        Ok(())
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    // ========== Pack Operations ==========

    /// Insert a pack, returning its id
    pub fn insert_pack(&self, pack: &NewPack) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO packs (name, sc_version, pack_version, pack_v_code, min_apk_v_code, changelog, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    pack.name,
                    pack.sc_version,
                    pack.pack_version,
                    pack.pack_v_code,
                    pack.min_apk_v_code,
                    pack.changelog,
                    self.now_millis(),
                ],
            )
            .map_err(|e| match constraint_code(&e) {
                Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => Error::DuplicateName(pack.name.clone()),
                _ => e.into(),
            })?;

        let id = self.conn.last_insert_rowid();
        info!(id, name = %pack.name, sc_version = %pack.sc_version, "Inserted pack");
        Ok(id)
    }

    /// Get a pack by id
    pub fn get_pack(&self, id: i64) -> Result<Option<Pack>> {
        self.conn
            .query_row(
                &format!("SELECT {PACK_COLUMNS} FROM packs WHERE id = ?1"),
                [id],
                row_to_pack,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a pack by its unique name
    pub fn get_pack_by_name(&self, name: &str) -> Result<Option<Pack>> {
        self.conn
            .query_row(
                &format!("SELECT {PACK_COLUMNS} FROM packs WHERE name = ?1"),
                [name],
                row_to_pack,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Distinct sc_versions, newest-looking first (plain string order)
    pub fn get_sc_versions(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT sc_version FROM packs ORDER BY sc_version DESC")?;
        let versions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(versions)
    }

    /// All packs of one lineage, most recently created first
    pub fn get_packs_for_sc(&self, sc_version: &str) -> Result<Vec<Pack>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PACK_COLUMNS} FROM packs WHERE sc_version = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let packs = stmt
            .query_map([sc_version], row_to_pack)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packs)
    }

    /// The latest pack of every lineage.
    ///
    /// Latest means the highest `pack_v_code`; equal codes resolve to the
    /// highest id (the later insert). Lineages are returned in
    /// `sc_version` descending order.
    pub fn get_latest_packs(&self) -> Result<Vec<Pack>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {PACK_COLUMNS} FROM packs p
            WHERE p.id = (
                SELECT q.id FROM packs q
                WHERE q.sc_version = p.sc_version
                ORDER BY q.pack_v_code DESC, q.id DESC
                LIMIT 1
            )
            ORDER BY p.sc_version DESC
            "#
        ))?;
        let packs = stmt
            .query_map([], row_to_pack)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packs)
    }

    // ========== Apk Operations ==========

    /// Insert an apk, returning its id
    pub fn insert_apk(&self, apk: &NewApk) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO apks (name, apk_v_code, apk_v_name, changelog, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![apk.name, apk.apk_v_code, apk.apk_v_name, apk.changelog, self.now_millis()],
            )
            .map_err(|e| match constraint_code(&e) {
                Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    Error::DuplicateVersionName(apk.apk_v_name.clone())
                }
                _ => e.into(),
            })?;

        let id = self.conn.last_insert_rowid();
        info!(id, name = %apk.name, apk_v_name = %apk.apk_v_name, "Inserted apk");
        Ok(id)
    }

    /// The single latest apk (highest `apk_v_code`, then id, then created_at)
    pub fn get_latest_apk(&self) -> Result<Option<Apk>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APK_COLUMNS} FROM apks ORDER BY apk_v_code DESC, id DESC, created_at DESC LIMIT 2"
        ))?;
        let top = stmt
            .query_map([], row_to_apk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if let [first, second] = top.as_slice() {
            if first.apk_v_code == second.apk_v_code && first.id == second.id {
                return Err(Error::InvariantViolation(format!(
                    "two apk rows share code {} and id {}",
                    first.apk_v_code, first.id
                )));
            }
        }
        Ok(top.into_iter().next())
    }

    /// Get an apk by its unique version name
    pub fn get_apk_by_v_name(&self, apk_v_name: &str) -> Result<Option<Apk>> {
        self.conn
            .query_row(
                &format!("SELECT {APK_COLUMNS} FROM apks WHERE apk_v_name = ?1"),
                [apk_v_name],
                row_to_apk,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All apks, newest code first
    pub fn get_all_apks(&self) -> Result<Vec<Apk>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APK_COLUMNS} FROM apks ORDER BY apk_v_code DESC, id DESC"
        ))?;
        let apks = stmt
            .query_map([], row_to_apk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(apks)
    }

    // ========== Known Bug Operations ==========

    /// File a new bug, returning its id
    pub fn insert_bug(&self, category: &str, description: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO known_bugs (category, description, filed_on, fixed_on) VALUES (?1, ?2, ?3, NULL)",
            params![category, description, self.now_millis()],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(id, category, "Filed known bug");
        Ok(id)
    }

    /// Get a bug by id
    pub fn get_bug(&self, id: i64) -> Result<Option<KnownBug>> {
        self.conn
            .query_row(
                "SELECT id, category, description, filed_on, fixed_on FROM known_bugs WHERE id = ?1",
                [id],
                |row| row_to_bug(row, 0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Distinct bug categories, alphabetical
    pub fn get_bug_categories(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT category FROM known_bugs ORDER BY category")?;
        let categories = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(categories)
    }

    /// Close a bug globally.
    ///
    /// Setting it again only refreshes `fixed_on`. With `delete_links` the
    /// bug's link rows are removed instead of being left as they are.
    /// Returns the number of bug rows updated (0 when the id is unknown).
    pub fn mark_bug_fixed(&self, bug_id: i64, delete_links: bool) -> Result<usize> {
        self.with_savepoint("mark_bug_fixed", |store| {
            let updated = store.conn.execute(
                "UPDATE known_bugs SET fixed_on = ?1 WHERE id = ?2",
                params![store.now_millis(), bug_id],
            )?;
            if updated > 0 && delete_links {
                let removed = store
                    .conn
                    .execute("DELETE FROM pack_bugs WHERE bug_id = ?1", [bug_id])?;
                debug!(bug_id, removed, "Deleted links of fixed bug");
            }
            Ok(updated)
        })
        .inspect(|updated| info!(bug_id, updated, "Marked bug fixed"))
    }

    // ========== Link Operations ==========

    /// Open a bug for a pack
    pub fn link_bug(&self, bug_id: i64, pack_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO pack_bugs (pack_id, bug_id, ported_fix_on) VALUES (?1, ?2, NULL)",
                params![pack_id, bug_id],
            )
            .map_err(|e| match constraint_code(&e) {
                Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => Error::DuplicateLink { bug_id, pack_id },
                Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Error::ForeignKeyViolation(
                    format!("bug {} or pack {} does not exist", bug_id, pack_id),
                ),
                _ => e.into(),
            })?;
        debug!(bug_id, pack_id, "Linked bug to pack");
        Ok(())
    }

    /// Copy the source pack's links onto the target as fresh, active links.
    ///
    /// Pairs already linked to the target are left untouched. Returns the
    /// number of links created.
    pub fn inherit_bugs_from(&self, source_pack_id: i64, target_pack_id: i64, scope: InheritScope) -> Result<usize> {
        let filter = match scope {
            InheritScope::Active => "AND ported_fix_on IS NULL",
            InheritScope::All => "",
        };
        let copied = self
            .conn
            .execute(
                &format!(
                    r#"
                    INSERT OR IGNORE INTO pack_bugs (pack_id, bug_id, ported_fix_on)
                    SELECT ?1, bug_id, NULL FROM pack_bugs
                    WHERE pack_id = ?2 {filter}
                    "#
                ),
                params![target_pack_id, source_pack_id],
            )
            .map_err(|e| match constraint_code(&e) {
                Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    Error::ForeignKeyViolation(format!("pack {} does not exist", target_pack_id))
                }
                _ => e.into(),
            })?;
        info!(source_pack_id, target_pack_id, copied, ?scope, "Inherited known bugs");
        Ok(copied)
    }

    /// Close a bug for one pack.
    ///
    /// The link row stays, so the pack keeps the record of having had the
    /// bug. The first fix time is kept if the link was already closed.
    /// Returns the number of matching links (0 means no such link).
    pub fn fix_bug_for_pack(&self, bug_id: i64, pack_id: i64) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE pack_bugs SET ported_fix_on = COALESCE(ported_fix_on, ?1) WHERE bug_id = ?2 AND pack_id = ?3",
            params![self.now_millis(), bug_id, pack_id],
        )?;
        info!(bug_id, pack_id, updated, "Fixed bug for pack");
        Ok(updated)
    }

    /// Bugs active for a pack, oldest filing first
    pub fn get_active_bugs(&self, pack_id: i64) -> Result<Vec<KnownBug>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT b.id, b.category, b.description, b.filed_on, b.fixed_on
            FROM pack_bugs l
            JOIN known_bugs b ON b.id = l.bug_id
            WHERE l.pack_id = ?1 AND l.ported_fix_on IS NULL
            ORDER BY b.filed_on, b.id
            "#,
        )?;
        let bugs = stmt
            .query_map([pack_id], |row| row_to_bug(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bugs)
    }

    /// Every bug ever linked to a pack with its link state, oldest filing first
    pub fn get_linked_bugs(&self, pack_id: i64) -> Result<Vec<LinkedBug>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT b.id, b.category, b.description, b.filed_on, b.fixed_on, l.pack_id, l.ported_fix_on
            FROM pack_bugs l
            JOIN known_bugs b ON b.id = l.bug_id
            WHERE l.pack_id = ?1
            ORDER BY b.filed_on, b.id
            "#,
        )?;
        let bugs = stmt
            .query_map([pack_id], |row| {
                let bug = row_to_bug(row, 0)?;
                let ported: Option<i64> = row.get(6)?;
                Ok(LinkedBug {
                    link: PackBugLink {
                        pack_id: row.get(5)?,
                        bug_id: bug.id,
                        ported_fix_on: ported.map(|ms| millis_to_ts(6, ms)).transpose()?,
                    },
                    bug,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bugs)
    }

    // ========== Bulk Operations ==========

    /// Begin a transaction for bulk operations
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    /// Run `f` in one transaction: committed on `Ok`, rolled back on `Err`
    pub fn in_transaction<T>(&mut self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    tracing::error!("Rollback failed after {}: {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Savepoint scope usable inside or outside an open transaction
    fn with_savepoint<T>(&self, name: &str, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name}"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                {
                    tracing::error!("Rollback to savepoint {} failed after {}: {}", name, e, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            packs: count("SELECT COUNT(*) FROM packs")?,
            lineages: count("SELECT COUNT(DISTINCT sc_version) FROM packs")?,
            apks: count("SELECT COUNT(*) FROM apks")?,
            bugs: count("SELECT COUNT(*) FROM known_bugs")?,
            open_bugs: count("SELECT COUNT(*) FROM known_bugs WHERE fixed_on IS NULL")?,
        })
    }

    /// Populate a scratch database with a small demo history.
    ///
    /// Two lineages, three packs, two bugs; the first bug is inherited
    /// down the 10.48 lineage into 10.49 and fixed there.
    pub fn seed_sample_data(&self) -> Result<()> {
        let pack = |name: &str, sc: &str, version: &str, code: i64, min_apk: i64, notes: &str| NewPack {
            name: name.to_string(),
            sc_version: sc.to_string(),
            pack_version: version.to_string(),
            pack_v_code: code,
            min_apk_v_code: min_apk,
            changelog: notes.to_string(),
        };
        let p1 = self.insert_pack(&pack("Pack_v1", "10.48.5.0", "1.2.0", 10, 1, "Updated for 10.48.5.0"))?;
        let p2 = self.insert_pack(&pack("Pack_v2", "10.48.5.0", "1.2.1", 11, 2, "Fixed Saving"))?;
        let p3 = self.insert_pack(&pack("Pack_v3", "10.49.5.0", "1.2.3", 12, 2, "Updated for 10.49"))?;

        let saving = self.insert_bug("Saving", "Currently does not work")?;
        let bypass = self.insert_bug("Screenshot Bypass", "Randomly stopped working")?;

        self.link_bug(saving, p1)?;
        self.inherit_bugs_from(p1, p2, InheritScope::Active)?;
        self.link_bug(bypass, p2)?;
        self.inherit_bugs_from(p2, p3, InheritScope::Active)?;
        self.mark_bug_fixed(saving, false)?;
        self.fix_bug_for_pack(saving, p3)?;
        Ok(())
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub packs: usize,
    pub lineages: usize,
    pub apks: usize,
    pub bugs: usize,
    pub open_bugs: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Packs: {} ({} lineages)", self.packs, self.lineages)?;
        writeln!(f, "  Apks: {}", self.apks)?;
        writeln!(f, "  Known bugs: {} ({} open)", self.bugs, self.open_bugs)
    }
}

/// Extended result code of a constraint violation, if `err` is one
fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

fn millis_to_ts(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn row_to_pack(row: &rusqlite::Row) -> rusqlite::Result<Pack> {
    Ok(Pack {
        id: row.get(0)?,
        name: row.get(1)?,
        sc_version: row.get(2)?,
        pack_version: row.get(3)?,
        pack_v_code: row.get(4)?,
        min_apk_v_code: row.get(5)?,
        changelog: row.get(6)?,
        created_at: millis_to_ts(7, row.get(7)?)?,
    })
}

fn row_to_apk(row: &rusqlite::Row) -> rusqlite::Result<Apk> {
    Ok(Apk {
        id: row.get(0)?,
        name: row.get(1)?,
        apk_v_code: row.get(2)?,
        apk_v_name: row.get(3)?,
        changelog: row.get(4)?,
        created_at: millis_to_ts(5, row.get(5)?)?,
    })
}

/// Read a bug from five consecutive columns starting at `offset`
fn row_to_bug(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<KnownBug> {
    let fixed_on: Option<i64> = row.get(offset + 4)?;
    Ok(KnownBug {
        id: row.get(offset)?,
        category: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        filed_on: millis_to_ts(offset + 3, row.get(offset + 3)?)?,
        fixed_on: fixed_on.map(|ms| millis_to_ts(offset + 4, ms)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Duration;
    use std::sync::Arc;

    fn store_with_clock() -> (ReleaseStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at_millis(1_700_000_000_000));
        let store = ReleaseStore::open_in_memory().unwrap().with_clock(clock.clone());
        (store, clock)
    }

    fn sample_pack(name: &str, sc: &str, code: i64) -> NewPack {
        NewPack {
            name: name.to_string(),
            sc_version: sc.to_string(),
            pack_version: format!("1.{}", code),
            pack_v_code: code,
            min_apk_v_code: 1,
            changelog: String::new(),
        }
    }

    fn sample_apk(v_name: &str, code: i64) -> NewApk {
        NewApk {
            name: format!("app-{}.apk", v_name),
            apk_v_code: code,
            apk_v_name: v_name.to_string(),
            changelog: "notes".to_string(),
        }
    }

    fn ids(bugs: &[KnownBug]) -> Vec<i64> {
        bugs.iter().map(|b| b.id).collect()
    }

    #[test]
    fn test_pack_crud() {
        let (store, clock) = store_with_clock();
        let id = store.insert_pack(&sample_pack("Pack_A", "1.0", 10)).unwrap();

        let pack = store.get_pack(id).unwrap().unwrap();
        assert_eq!(pack.name, "Pack_A");
        assert_eq!(pack.pack_v_code, 10);
        assert_eq!(pack.created_at, clock.now());
        assert_eq!(store.get_pack_by_name("Pack_A").unwrap().unwrap().id, id);
        assert!(store.get_pack(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_pack_name() {
        let (store, _) = store_with_clock();
        store.insert_pack(&sample_pack("Pack_A", "1.0", 10)).unwrap();
        let err = store.insert_pack(&sample_pack("Pack_A", "2.0", 11)).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "Pack_A"));
    }

    #[test]
    fn test_duplicate_apk_version_name() {
        let (store, _) = store_with_clock();
        store.insert_apk(&sample_apk("2.0.0", 20)).unwrap();
        let err = store.insert_apk(&sample_apk("2.0.0", 21)).unwrap_err();
        assert!(matches!(err, Error::DuplicateVersionName(v) if v == "2.0.0"));
    }

    #[test]
    fn test_link_requires_existing_rows() {
        let (store, _) = store_with_clock();
        let pack = store.insert_pack(&sample_pack("Pack_A", "1.0", 10)).unwrap();
        let bug = store.insert_bug("Saving", "broken").unwrap();

        assert!(matches!(store.link_bug(bug + 5, pack), Err(Error::ForeignKeyViolation(_))));
        assert!(matches!(store.link_bug(bug, pack + 5), Err(Error::ForeignKeyViolation(_))));

        store.link_bug(bug, pack).unwrap();
        assert!(matches!(store.link_bug(bug, pack), Err(Error::DuplicateLink { .. })));
    }

    #[test]
    fn test_inherit_fix_scenario() {
        let (store, clock) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let bug = store.insert_bug("Saving", "broken").unwrap();
        store.link_bug(bug, a).unwrap();
        assert_eq!(ids(&store.get_active_bugs(a).unwrap()), vec![bug]);

        clock.advance(Duration::minutes(1));
        let b = store.insert_pack(&sample_pack("B", "1.0", 11)).unwrap();
        assert_eq!(store.inherit_bugs_from(a, b, InheritScope::Active).unwrap(), 1);
        assert_eq!(ids(&store.get_active_bugs(b).unwrap()), vec![bug]);

        assert_eq!(store.fix_bug_for_pack(bug, a).unwrap(), 1);
        assert!(store.get_active_bugs(a).unwrap().is_empty());
        assert_eq!(ids(&store.get_active_bugs(b).unwrap()), vec![bug]);

        let latest = store.get_latest_packs().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, b);
    }

    #[test]
    fn test_inherit_scope() {
        let (store, _) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let open = store.insert_bug("Saving", "broken").unwrap();
        let closed = store.insert_bug("Camera", "black screen").unwrap();
        store.link_bug(open, a).unwrap();
        store.link_bug(closed, a).unwrap();
        store.fix_bug_for_pack(closed, a).unwrap();

        let b = store.insert_pack(&sample_pack("B", "1.0", 11)).unwrap();
        assert_eq!(store.inherit_bugs_from(a, b, InheritScope::Active).unwrap(), 1);
        assert_eq!(ids(&store.get_active_bugs(b).unwrap()), vec![open]);

        // Raw copy re-opens the bug closed for the source
        let c = store.insert_pack(&sample_pack("C", "1.0", 12)).unwrap();
        assert_eq!(store.inherit_bugs_from(a, c, InheritScope::All).unwrap(), 2);
        assert_eq!(ids(&store.get_active_bugs(c).unwrap()), vec![open, closed]);
    }

    #[test]
    fn test_inherit_snapshot_is_independent() {
        let (store, _) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let bug = store.insert_bug("Saving", "broken").unwrap();
        store.link_bug(bug, a).unwrap();
        let b = store.insert_pack(&sample_pack("B", "1.0", 11)).unwrap();
        store.inherit_bugs_from(a, b, InheritScope::Active).unwrap();

        // Closing for the source afterwards leaves the inherited link open
        store.fix_bug_for_pack(bug, a).unwrap();
        let linked = store.get_linked_bugs(b).unwrap();
        assert_eq!(linked.len(), 1);
        assert!(linked[0].link.is_active());
    }

    #[test]
    fn test_inherit_edge_cases() {
        let (store, _) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let b = store.insert_pack(&sample_pack("B", "1.0", 11)).unwrap();
        assert_eq!(store.inherit_bugs_from(a, b, InheritScope::Active).unwrap(), 0);

        let bug = store.insert_bug("Saving", "broken").unwrap();
        store.link_bug(bug, a).unwrap();
        store.link_bug(bug, b).unwrap();
        assert_eq!(store.inherit_bugs_from(a, b, InheritScope::Active).unwrap(), 0);

        let err = store.inherit_bugs_from(a, b + 100, InheritScope::Active).unwrap_err();
        assert!(matches!(err, Error::ForeignKeyViolation(_)));
    }

    #[test]
    fn test_fix_bug_for_missing_link_reports_zero() {
        let (store, _) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let bug = store.insert_bug("Saving", "broken").unwrap();
        assert_eq!(store.fix_bug_for_pack(bug, a).unwrap(), 0);
    }

    #[test]
    fn test_fix_bug_keeps_first_fix_time() {
        let (store, clock) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let bug = store.insert_bug("Saving", "broken").unwrap();
        store.link_bug(bug, a).unwrap();
        store.fix_bug_for_pack(bug, a).unwrap();
        let first = clock.now();

        clock.advance(Duration::hours(1));
        assert_eq!(store.fix_bug_for_pack(bug, a).unwrap(), 1);
        let linked = store.get_linked_bugs(a).unwrap();
        assert_eq!(linked[0].link.ported_fix_on, Some(first));
    }

    #[test]
    fn test_mark_fixed_does_not_touch_links() {
        let (store, clock) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let b = store.insert_pack(&sample_pack("B", "2.0", 20)).unwrap();
        let bug = store.insert_bug("Saving", "broken").unwrap();
        store.link_bug(bug, a).unwrap();
        store.link_bug(bug, b).unwrap();

        clock.advance(Duration::days(1));
        assert_eq!(store.mark_bug_fixed(bug, false).unwrap(), 1);

        let fixed = store.get_bug(bug).unwrap().unwrap();
        assert_eq!(fixed.fixed_on, Some(clock.now()));
        // Globally fixed but still active where no fix was ported
        assert_eq!(ids(&store.get_active_bugs(a).unwrap()), vec![bug]);
        assert_eq!(ids(&store.get_active_bugs(b).unwrap()), vec![bug]);

        clock.advance(Duration::days(1));
        store.mark_bug_fixed(bug, false).unwrap();
        assert_eq!(store.get_bug(bug).unwrap().unwrap().fixed_on, Some(clock.now()));
    }

    #[test]
    fn test_mark_fixed_with_link_deletion() {
        let (store, _) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let bug = store.insert_bug("Saving", "broken").unwrap();
        store.link_bug(bug, a).unwrap();

        store.mark_bug_fixed(bug, true).unwrap();
        assert!(store.get_linked_bugs(a).unwrap().is_empty());
        assert!(store.get_bug(bug).unwrap().unwrap().is_fixed());
        assert_eq!(store.mark_bug_fixed(bug + 10, true).unwrap(), 0);
    }

    #[test]
    fn test_active_bugs_ordered_by_filing() {
        let (store, clock) = store_with_clock();
        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let older = store.insert_bug("Saving", "first").unwrap();
        clock.advance(Duration::minutes(5));
        let newer = store.insert_bug("Camera", "second").unwrap();

        store.link_bug(newer, a).unwrap();
        store.link_bug(older, a).unwrap();
        assert_eq!(ids(&store.get_active_bugs(a).unwrap()), vec![older, newer]);
    }

    #[test]
    fn test_latest_packs_per_lineage() {
        let (store, clock) = store_with_clock();
        store.insert_pack(&sample_pack("A", "10.48", 12)).unwrap();
        clock.advance(Duration::minutes(1));
        store.insert_pack(&sample_pack("B", "10.48", 11)).unwrap();
        let c = store.insert_pack(&sample_pack("C", "10.49", 13)).unwrap();

        let latest = store.get_latest_packs().unwrap();
        let names: Vec<_> = latest.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
        assert_eq!(latest[0].id, c);
    }

    #[test]
    fn test_latest_pack_tie_breaks_on_id() {
        let (store, _) = store_with_clock();
        store.insert_pack(&sample_pack("first", "1.0", 10)).unwrap();
        let second = store.insert_pack(&sample_pack("second", "1.0", 10)).unwrap();

        let latest = store.get_latest_packs().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, second);
    }

    #[test]
    fn test_sc_versions_and_lineage_listing() {
        let (store, clock) = store_with_clock();
        store.insert_pack(&sample_pack("A", "10.48.5.0", 10)).unwrap();
        clock.advance(Duration::minutes(1));
        store.insert_pack(&sample_pack("B", "10.49.5.0", 11)).unwrap();
        clock.advance(Duration::minutes(1));
        store.insert_pack(&sample_pack("C", "10.48.5.0", 12)).unwrap();

        assert_eq!(store.get_sc_versions().unwrap(), vec!["10.49.5.0", "10.48.5.0"]);
        let lineage: Vec<_> = store
            .get_packs_for_sc("10.48.5.0")
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(lineage, vec!["C", "A"]);
        assert!(store.get_packs_for_sc("9.0").unwrap().is_empty());
    }

    #[test]
    fn test_latest_apk() {
        let (store, _) = store_with_clock();
        assert!(store.get_latest_apk().unwrap().is_none());

        store.insert_apk(&sample_apk("1.0.0", 10)).unwrap();
        store.insert_apk(&sample_apk("1.2.0", 12)).unwrap();
        store.insert_apk(&sample_apk("1.1.0", 11)).unwrap();
        assert_eq!(store.get_latest_apk().unwrap().unwrap().apk_v_name, "1.2.0");

        let tie = store.insert_apk(&sample_apk("1.2.0-hotfix", 12)).unwrap();
        assert_eq!(store.get_latest_apk().unwrap().unwrap().id, tie);
        assert_eq!(store.get_all_apks().unwrap().len(), 4);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (mut store, _) = store_with_clock();
        let result = store.in_transaction(|s| {
            s.insert_pack(&sample_pack("A", "1.0", 10))?;
            s.insert_pack(&sample_pack("A", "1.0", 11))
        });
        assert!(matches!(result, Err(Error::DuplicateName(_))));
        assert!(store.get_pack_by_name("A").unwrap().is_none());

        store
            .in_transaction(|s| s.insert_pack(&sample_pack("A", "1.0", 10)))
            .unwrap();
        assert!(store.get_pack_by_name("A").unwrap().is_some());
    }

    #[test]
    fn test_link_rows_cascade_on_delete() {
        let (store, _) = store_with_clock();
        let link_count = |s: &ReleaseStore| -> i64 {
            s.conn
                .query_row("SELECT COUNT(*) FROM pack_bugs", [], |row| row.get(0))
                .unwrap()
        };

        let a = store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        let b = store.insert_pack(&sample_pack("B", "1.0", 11)).unwrap();
        let crash = store.insert_bug("Crash", "on start").unwrap();
        let saving = store.insert_bug("Saving", "lost progress").unwrap();
        for pack in [a, b] {
            store.link_bug(crash, pack).unwrap();
            store.link_bug(saving, pack).unwrap();
        }
        assert_eq!(link_count(&store), 4);

        store.conn.execute("DELETE FROM packs WHERE id = ?1", [a]).unwrap();
        assert_eq!(link_count(&store), 2);
        assert!(store.get_active_bugs(a).unwrap().is_empty());

        store.conn.execute("DELETE FROM known_bugs WHERE id = ?1", [crash]).unwrap();
        assert_eq!(link_count(&store), 1);
        assert_eq!(ids(&store.get_active_bugs(b).unwrap()), vec![saving]);
    }

    #[test]
    fn test_savepoint_keeps_original_error_when_rollback_fails() {
        let (store, _) = store_with_clock();
        let result: Result<()> = store.with_savepoint("sp_test", |s| {
            // Releasing early makes the later ROLLBACK TO fail
            s.conn.execute_batch("RELEASE sp_test")?;
            Err(Error::NotFound("bug 99".to_string()))
        });
        assert!(matches!(result, Err(Error::NotFound(msg)) if msg == "bug 99"));

        store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        assert!(store.get_pack_by_name("A").unwrap().is_some());
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("releases.db");
        {
            let store = ReleaseStore::open(&path).unwrap();
            store.insert_pack(&sample_pack("A", "1.0", 10)).unwrap();
        }
        let store = ReleaseStore::open(&path).unwrap();
        assert_eq!(store.stats().unwrap().packs, 1);
    }

    #[test]
    fn test_seed_sample_data() {
        let (store, _) = store_with_clock();
        store.seed_sample_data().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.packs, 3);
        assert_eq!(stats.lineages, 2);
        assert_eq!(stats.bugs, 2);
        assert_eq!(stats.open_bugs, 1);

        let v3 = store.get_pack_by_name("Pack_v3").unwrap().unwrap();
        let active: Vec<_> = store
            .get_active_bugs(v3.id)
            .unwrap()
            .into_iter()
            .map(|b| b.category)
            .collect();
        assert_eq!(active, vec!["Screenshot Bypass"]);
        assert_eq!(store.get_bug_categories().unwrap(), vec!["Saving", "Screenshot Bypass"]);
    }
}
