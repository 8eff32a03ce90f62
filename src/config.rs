use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "releases.db";
pub const DEFAULT_TEST_DATABASE: &str = "test.db";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PacktrackConfig {
    /// Release database used normally
    pub database: Option<String>,
    /// Database used with `--test`
    pub test_database: Option<String>,
    /// Directory holding `Packs/` and `Apks/`
    pub root: Option<String>,
}

/// Where a run reads and writes, after config and flags are combined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub root: PathBuf,
}

impl PacktrackConfig {
    /// Combine with command-line overrides; flags win over the file
    pub fn resolve(&self, database: Option<&Path>, test: bool, root: Option<&Path>) -> Settings {
        let database = match database {
            Some(path) => path.to_path_buf(),
            None if test => PathBuf::from(self.test_database.as_deref().unwrap_or(DEFAULT_TEST_DATABASE)),
            None => PathBuf::from(self.database.as_deref().unwrap_or(DEFAULT_DATABASE)),
        };
        let root = root
            .map(Path::to_path_buf)
            .or_else(|| self.root.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        Settings { database, root }
    }

    pub fn starter() -> Self {
        Self {
            database: Some(DEFAULT_DATABASE.to_string()),
            test_database: Some(DEFAULT_TEST_DATABASE.to_string()),
            root: Some(".".to_string()),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("packtrack.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<PacktrackConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading packtrack config {}", path.display()))?;
    let config: PacktrackConfig = toml::from_str(&contents)
        .with_context(|| format!("{} is not a valid packtrack config", path.display()))?;
    Ok(Some(config))
}

/// Write `config` for `packtrack init`; an existing file is kept unless `force`
pub fn write_config(path: &Path, config: &PacktrackConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "packtrack config already exists at {} (run `packtrack init --force` to overwrite)",
            path.display()
        );
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)
        .with_context(|| format!("writing packtrack config {}", path.display()))
}

/// Create the directory the release database lives in
pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("creating directory {} for release database", parent.display())
            })
        }
        _ => Ok(()),
    }
}
