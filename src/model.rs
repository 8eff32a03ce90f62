//! Release records - Packs, Apks and Known Bugs
//!
//! Packs and Apks are insert-only. A Known Bug is opened per Pack through a
//! link row and can be closed per Pack (`ported_fix_on`) or globally
//! (`fixed_on`). The two closures are independent of each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A release artifact tied to one `sc_version` lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pack {
    pub id: i64,
    pub name: String,
    /// Target platform version. Opaque string, only ever sorted lexically.
    pub sc_version: String,
    pub pack_version: String,
    /// Monotonic build number, the "latest" key within a lineage.
    pub pack_v_code: i64,
    pub min_apk_v_code: i64,
    pub changelog: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a Pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPack {
    pub name: String,
    pub sc_version: String,
    pub pack_version: String,
    pub pack_v_code: i64,
    pub min_apk_v_code: i64,
    pub changelog: String,
}

/// A release binary, independent of any Pack lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apk {
    pub id: i64,
    pub name: String,
    pub apk_v_code: i64,
    pub apk_v_name: String,
    pub changelog: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering an Apk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApk {
    pub name: String,
    pub apk_v_code: i64,
    pub apk_v_name: String,
    pub changelog: String,
}

/// A tracked defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownBug {
    pub id: i64,
    pub category: String,
    pub description: String,
    pub filed_on: DateTime<Utc>,
    /// Global closure. Once set it is never cleared.
    pub fixed_on: Option<DateTime<Utc>>,
}

impl KnownBug {
    pub fn is_fixed(&self) -> bool {
        self.fixed_on.is_some()
    }
}

impl std::fmt::Display for KnownBug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category, self.description)?;
        if self.is_fixed() {
            write!(f, " (fixed)")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Pack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (v{}, code {}, sc {})",
            self.name, self.pack_version, self.pack_v_code, self.sc_version
        )
    }
}

/// Join row between a Pack and a bug affecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackBugLink {
    pub pack_id: i64,
    pub bug_id: i64,
    /// Set when the fix was backported or verified for this Pack.
    pub ported_fix_on: Option<DateTime<Utc>>,
}

impl PackBugLink {
    pub fn is_active(&self) -> bool {
        self.ported_fix_on.is_none()
    }
}

/// A bug as seen from one Pack, including the state of its link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedBug {
    pub bug: KnownBug,
    pub link: PackBugLink,
}

/// Encode an optional timestamp the way the delivery server expects it:
/// epoch milliseconds, or `-1` when absent.
pub fn epoch_millis(ts: Option<&DateTime<Utc>>) -> i64 {
    ts.map(DateTime::timestamp_millis).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_epoch_millis_encoding() {
        let ts = Utc.timestamp_millis_opt(1_650_000_000_123).unwrap();
        assert_eq!(epoch_millis(Some(&ts)), 1_650_000_000_123);
        assert_eq!(epoch_millis(None), -1);
    }

    #[test]
    fn test_link_activity() {
        let mut link = PackBugLink { pack_id: 1, bug_id: 2, ported_fix_on: None };
        assert!(link.is_active());
        link.ported_fix_on = Some(Utc::now());
        assert!(!link.is_active());
    }

    #[test]
    fn test_bug_display_marks_fixed() {
        let bug = KnownBug {
            id: 1,
            category: "Saving".to_string(),
            description: "Currently does not work".to_string(),
            filed_on: Utc::now(),
            fixed_on: Some(Utc::now()),
        };
        assert_eq!(bug.to_string(), "[Saving] Currently does not work (fixed)");
    }
}
