//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - packs(name, sc_version, pack_version, pack_v_code, min_apk_v_code, changelog, created_at)
//! - apks(name, apk_v_code, apk_v_name, changelog, created_at)
//! - known_bugs(category, description, filed_on, fixed_on)
//! - pack_bugs(pack_id, bug_id, ported_fix_on)

pub mod schema;
pub mod sqlite;

pub use sqlite::{InheritScope, ReleaseStore, StoreStats};
