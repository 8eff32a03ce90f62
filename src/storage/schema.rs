//! Database schema definitions
//!
//! Timestamps are INTEGER epoch milliseconds written by the store, never by
//! column defaults.

/// Version stamped into `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// SQL to create the packs table
pub const CREATE_PACKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS packs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    sc_version TEXT NOT NULL,
    pack_version TEXT NOT NULL,
    pack_v_code INTEGER NOT NULL,
    min_apk_v_code INTEGER NOT NULL,
    changelog TEXT NOT NULL,
    created_at INTEGER NOT NULL
)
"#;

/// SQL to create the apks table
pub const CREATE_APKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS apks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    apk_v_code INTEGER NOT NULL,
    apk_v_name TEXT NOT NULL UNIQUE,
    changelog TEXT NOT NULL,
    created_at INTEGER NOT NULL
)
"#;

/// SQL to create the known_bugs table
pub const CREATE_KNOWN_BUGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS known_bugs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL,
    description TEXT NOT NULL,
    filed_on INTEGER NOT NULL,
    fixed_on INTEGER
)
"#;

/// SQL to create the pack_bugs join table
/// A row with NULL ported_fix_on means the bug is active for that pack
pub const CREATE_PACK_BUGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pack_bugs (
    pack_id INTEGER NOT NULL REFERENCES packs(id) ON DELETE CASCADE,
    bug_id INTEGER NOT NULL REFERENCES known_bugs(id) ON DELETE CASCADE,
    ported_fix_on INTEGER,
    UNIQUE(pack_id, bug_id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_packs_sc_version ON packs(sc_version, pack_v_code)",
    "CREATE INDEX IF NOT EXISTS idx_apks_v_code ON apks(apk_v_code)",
    "CREATE INDEX IF NOT EXISTS idx_pack_bugs_bug ON pack_bugs(bug_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_PACKS_TABLE,
        CREATE_APKS_TABLE,
        CREATE_KNOWN_BUGS_TABLE,
        CREATE_PACK_BUGS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
