use std::fmt;
use std::{fs, path::Path, path::PathBuf};
use tracing::{debug, warn};

use crate::error::OpsError;

/// Migrations compiled into the binary, in apply order.
const BUNDLED: &[(&str, &str)] = &[
    (
        "001_user_permissions.sql",
        include_str!("../../migrations/001_user_permissions.sql"),
    ),
    (
        "002_donations.sql",
        include_str!("../../migrations/002_donations.sql"),
    ),
    (
        "003_schedules.sql",
        include_str!("../../migrations/003_schedules.sql"),
    ),
    (
        "004_system_user_password_audit.sql",
        include_str!("../../migrations/004_system_user_password_audit.sql"),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationSource {
    Bundled,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: String,
    pub source: MigrationSource,
    pub sql: String,
}

impl Migration {
    /// `003_schedules` style identifier used in reports and errors.
    pub fn id(&self) -> String {
        format!("{:03}_{}", self.version, self.name)
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Ordered, duplicate-free list of migrations.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    migrations: Vec<Migration>,
}

impl Manifest {
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self, OpsError> {
        migrations.sort_by_key(|m| m.version);
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(OpsError::Manifest(format!(
                "version {} is used by both {} and {}",
                pair[0].version, pair[0].name, pair[1].name
            )));
        }
        Ok(Self { migrations })
    }

    pub fn bundled() -> Result<Self, OpsError> {
        let migrations = BUNDLED
            .iter()
            .map(|(file, sql)| {
                let (version, name) = parse_file_name(file)?;
                Ok(Migration {
                    version,
                    name,
                    source: MigrationSource::Bundled,
                    sql: (*sql).to_string(),
                })
            })
            .collect::<Result<Vec<_>, OpsError>>()?;
        Self::new(migrations)
    }

    /// Load every `NNN_name.sql` in `dir`. Other files are ignored.
    pub fn from_dir(dir: &Path) -> Result<Self, OpsError> {
        if !dir.is_dir() {
            return Err(OpsError::Manifest(format!(
                "migration directory {} not found",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(error = %e, "failed to read migration dir entry");
                    None
                }
            })
            .filter(|path| is_sql_file(path))
            .collect();
        paths.sort();

        let migrations = paths
            .iter()
            .map(|path| load_migration(path))
            .collect::<Result<Vec<_>, OpsError>>()?;
        debug!(path = %dir.display(), count = migrations.len(), "loaded migration directory");
        Self::new(migrations)
    }

    /// Wrap one external SQL file, versioned from its name when it has a
    /// numeric prefix and as `0` otherwise.
    pub fn single(path: &Path) -> Result<Self, OpsError> {
        let migration = match load_migration(path) {
            Ok(m) => m,
            Err(OpsError::Manifest(_)) => Migration {
                version: 0,
                name: path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("adhoc")
                    .to_string(),
                source: MigrationSource::File(path.to_path_buf()),
                sql: fs::read_to_string(path)?,
            },
            Err(e) => return Err(e),
        };
        Self::new(vec![migration])
    }

    /// Keep only `only` when given, otherwise everything up to `up_to`.
    pub fn select(self, only: Option<u32>, up_to: Option<u32>) -> Result<Self, OpsError> {
        let migrations: Vec<_> = self
            .migrations
            .into_iter()
            .filter(|m| only.is_none_or(|v| m.version == v))
            .filter(|m| up_to.is_none_or(|v| m.version <= v))
            .collect();
        if let Some(v) = only
            && migrations.is_empty()
        {
            return Err(OpsError::Manifest(format!("no migration with version {v}")));
        }
        Ok(Self { migrations })
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

fn is_sql_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("sql"))
            == Some(true)
}

fn load_migration(path: &Path) -> Result<Migration, OpsError> {
    let file = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| OpsError::Manifest(format!("unreadable file name {}", path.display())))?;
    let (version, name) = parse_file_name(file)?;
    let sql = fs::read_to_string(path)?;
    Ok(Migration {
        version,
        name,
        source: MigrationSource::File(path.to_path_buf()),
        sql,
    })
}

/// `012_add_index.sql` -> `(12, "add_index")`.
fn parse_file_name(file: &str) -> Result<(u32, String), OpsError> {
    let bad = || {
        OpsError::Manifest(format!(
            "{file:?} does not match NNN_name.sql (numeric version prefix)"
        ))
    };
    let stem = file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file);
    let (digits, name) = stem.split_once('_').ok_or_else(bad)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
        return Err(bad());
    }
    let version = digits.parse().map_err(|_| bad())?;
    Ok((version, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_manifest_is_ordered() {
        let m = Manifest::bundled().unwrap();
        let ids: Vec<_> = m.migrations().iter().map(Migration::id).collect();
        assert_eq!(
            ids,
            vec![
                "001_user_permissions",
                "002_donations",
                "003_schedules",
                "004_system_user_password_audit",
            ]
        );
    }

    #[test]
    fn loads_directory_sorted_by_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("10_late.sql"), "SELECT 10;").unwrap();
        fs::write(dir.path().join("2_early.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("README.md"), "not sql").unwrap();

        let m = Manifest::from_dir(dir.path()).unwrap();
        let versions: Vec<_> = m.migrations().iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![2, 10]);
        assert_eq!(m.migrations()[0].name, "early");
        assert!(matches!(m.migrations()[0].source, MigrationSource::File(_)));
    }

    #[test]
    fn rejects_unversioned_and_duplicate_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("add_column.sql"), "ALTER TABLE t ADD c INT;").unwrap();
        assert!(matches!(Manifest::from_dir(dir.path()), Err(OpsError::Manifest(_))));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("01_b.sql"), "SELECT 1;").unwrap();
        let err = Manifest::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("version 1"));
    }

    #[test]
    fn single_file_without_prefix_gets_version_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix_donations.sql");
        fs::write(&path, "ALTER TABLE donations ADD COLUMN receipt_no VARCHAR(32);").unwrap();
        let m = Manifest::single(&path).unwrap();
        assert_eq!(m.migrations()[0].id(), "000_fix_donations");
    }

    #[test]
    fn select_filters_by_version() {
        let m = Manifest::bundled().unwrap();
        assert_eq!(m.clone().select(None, Some(2)).unwrap().len(), 2);
        assert_eq!(m.clone().select(Some(3), None).unwrap().migrations()[0].name, "schedules");
        assert!(m.select(Some(42), None).is_err());
    }
}
