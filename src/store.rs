use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::entities::ProjectsFileEntity;
use crate::error::StoreError;

/// Where to keep copies of a data file before it is overwritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPolicy {
    pub directory: PathBuf,
    pub max_backups: usize,
}

/// JSON data file wrapper.
///
/// Writes go to a temporary file next to the target which is then renamed
/// over it, so a failed save never leaves a truncated file behind.
#[derive(Debug, Clone)]
pub struct DataStore {
    path: PathBuf,
    backups: Option<BackupPolicy>,
}

impl DataStore {
    pub fn new(path: impl Into<PathBuf>, backups: Option<BackupPolicy>) -> Self {
        Self {
            path: path.into(),
            backups,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and parse the data file. Returns `None` if it does not exist.
    pub fn read(&self) -> Result<Option<ProjectsFileEntity>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };

        let json_error = |source: serde_json::Error| StoreError::Json {
            path: self.path.clone(),
            source,
        };

        // Derived structs also accept a JSON array; only an object is a data file
        let value: Value = serde_json::from_str(&content).map_err(json_error)?;
        if !value.is_object() {
            return Err(StoreError::Structure(format!(
                "{} does not contain a JSON object",
                self.path.display()
            )));
        }

        serde_json::from_value(value).map(Some).map_err(json_error)
    }

    /// Back up the current file (if enabled) and replace it with `data`
    pub fn write(&self, data: &ProjectsFileEntity, now: NaiveDateTime) -> Result<(), StoreError> {
        if let Some(policy) = &self.backups {
            if self.exists() {
                if let Err(err) = create_backup(&self.path, policy, now) {
                    warn!(%err, "Could not create backup");
                }
            }
        }

        write_atomically(&self.path, data)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn write_atomically(path: &Path, data: &impl Serialize) -> Result<(), StoreError> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|err| StoreError::io(&dir, err))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, data).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer
            .write_all(b"\n")
            .and_then(|()| writer.flush())
            .map_err(|err| StoreError::io(path, err))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|err| StoreError::io(path, err))?;

    tmp.persist(path)
        .map_err(|err| StoreError::io(path, err.error))?;
    Ok(())
}

fn backup_prefix(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    format!("{stem}_backup_")
}

/// `<stem>_backup_<YYYYmmdd_HHMMSS>.json`; sorts chronologically by name
pub fn backup_file_name(path: &Path, now: NaiveDateTime) -> String {
    format!("{}{}.json", backup_prefix(path), now.format("%Y%m%d_%H%M%S"))
}

/// Copy `path` into the backup directory and prune old copies
pub fn create_backup(
    path: &Path,
    policy: &BackupPolicy,
    now: NaiveDateTime,
) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(&policy.directory)
        .map_err(|err| StoreError::io(&policy.directory, err))?;

    let target = policy.directory.join(backup_file_name(path, now));
    fs::copy(path, &target).map_err(|err| StoreError::io(&target, err))?;
    debug!(backup = %target.display(), "Backup created");

    cleanup_old_backups(path, policy)?;
    Ok(target)
}

/// Backups of `path` currently in the backup directory, oldest first
pub fn list_backups(path: &Path, policy: &BackupPolicy) -> Result<Vec<PathBuf>, StoreError> {
    let prefix = backup_prefix(path);
    let entries =
        fs::read_dir(&policy.directory).map_err(|err| StoreError::io(&policy.directory, err))?;

    let mut backups: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|candidate| {
            candidate
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".json"))
        })
        .collect();
    backups.sort();
    Ok(backups)
}

/// Delete the oldest backups beyond `max_backups`. Returns how many were
/// removed.
pub fn cleanup_old_backups(path: &Path, policy: &BackupPolicy) -> Result<usize, StoreError> {
    let backups = list_backups(path, policy)?;
    let excess = backups.len().saturating_sub(policy.max_backups);

    for old in &backups[..excess] {
        fs::remove_file(old).map_err(|err| StoreError::io(old, err))?;
        debug!(backup = %old.display(), "Removed old backup");
    }

    Ok(excess)
}

/// Copy `source` over `target`. An existing target is moved into the backup
/// directory first when a policy is given.
pub fn migrate_data_file(
    source: &Path,
    target: &Path,
    backups: Option<&BackupPolicy>,
    now: NaiveDateTime,
) -> Result<(), StoreError> {
    if !source.is_file() {
        return Err(StoreError::MissingSource(source.to_path_buf()));
    }
    if source == target {
        return Err(StoreError::Structure(format!(
            "{} is both source and target",
            source.display()
        )));
    }

    let dir = parent_dir(target);
    fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;

    if target.exists() {
        if let Some(policy) = backups {
            fs::create_dir_all(&policy.directory)
                .map_err(|err| StoreError::io(&policy.directory, err))?;
            let backup = policy.directory.join(backup_file_name(target, now));
            fs::rename(target, &backup).map_err(|err| StoreError::io(&backup, err))?;
            info!(backup = %backup.display(), "Existing data backed up");
            cleanup_old_backups(target, policy)?;
        }
    }

    let tmp = NamedTempFile::new_in(&dir).map_err(|err| StoreError::io(&dir, err))?;
    fs::copy(source, tmp.path()).map_err(|err| StoreError::io(source, err))?;
    tmp.persist(target)
        .map_err(|err| StoreError::io(target, err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ProjectEntity;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn sample(alias: &str) -> ProjectsFileEntity {
        ProjectsFileEntity {
            projects: vec![ProjectEntity {
                name: "Website".to_string(),
                dz_number: "DZ-1".to_string(),
                alias: alias.to_string(),
                sub_activities: vec![],
                time_records: Default::default(),
            }],
            current_project_alias: Some(alias.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let store = DataStore::new(dir.path().join("missing.json"), None);
        assert!(store.read().unwrap().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let store = DataStore::new(dir.path().join("nested").join("data.json"), None);

        store.write(&sample("web"), at(9, 0, 0)).unwrap();
        assert_eq!(store.read().unwrap(), Some(sample("web")));

        // Only the data file remains; the temporary file was renamed over it
        let names: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["data.json"]);
    }

    #[test]
    fn test_read_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"projects": [{"name": "#).unwrap();

        let store = DataStore::new(&path, None);
        assert!(matches!(store.read(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_read_rejects_non_object_top_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        let store = DataStore::new(&path, None);

        for content in ["[]", r#"[[{"name": "A", "alias": "a"}], "a"]"#, "42", "null"] {
            fs::write(&path, content).unwrap();
            assert!(
                matches!(store.read(), Err(StoreError::Structure(_))),
                "{content}"
            );
        }
    }

    #[test]
    fn test_write_failure_reports_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let store = DataStore::new(blocker.join("data.json"), None);
        assert!(matches!(store.write(&sample("web"), at(9, 0, 0)), Err(StoreError::Io { .. })));
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
    }

    #[test]
    fn test_failed_rename_keeps_previous_contents() {
        let dir = tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file
        let path = dir.path().join("data.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep.txt"), "keep").unwrap();

        let store = DataStore::new(&path, None);
        assert!(store.write(&sample("web"), at(9, 0, 0)).is_err());
        assert_eq!(fs::read_to_string(path.join("keep.txt")).unwrap(), "keep");

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_backup_created_before_overwrite() {
        let dir = tempdir().unwrap();
        let policy = BackupPolicy {
            directory: dir.path().join("backups"),
            max_backups: 10,
        };
        let path = dir.path().join("data.json");
        let store = DataStore::new(&path, Some(policy.clone()));

        store.write(&sample("first"), at(9, 0, 0)).unwrap();
        assert!(!policy.directory.exists());

        store.write(&sample("second"), at(9, 0, 30)).unwrap();
        let backups = list_backups(&path, &policy).unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].ends_with("data_backup_20250314_090030.json"));

        let backed_up: ProjectsFileEntity =
            serde_json::from_str(&fs::read_to_string(&backups[0]).unwrap()).unwrap();
        assert_eq!(backed_up, sample("first"));
        assert_eq!(store.read().unwrap(), Some(sample("second")));
    }

    #[test]
    fn test_backup_retention() {
        let dir = tempdir().unwrap();
        let policy = BackupPolicy {
            directory: dir.path().join("backups"),
            max_backups: 2,
        };
        let path = dir.path().join("data.json");
        let store = DataStore::new(&path, Some(policy.clone()));

        fs::create_dir_all(&policy.directory).unwrap();
        fs::write(policy.directory.join("unrelated.json"), "{}").unwrap();
        fs::write(policy.directory.join("other_backup_20000101_000000.json"), "{}").unwrap();

        for minute in 0..5 {
            store.write(&sample("web"), at(10, minute, 0)).unwrap();
        }

        let backups = list_backups(&path, &policy).unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups[0].ends_with("data_backup_20250314_100300.json"));
        assert!(backups[1].ends_with("data_backup_20250314_100400.json"));
        assert!(policy.directory.join("unrelated.json").exists());
        assert!(policy.directory.join("other_backup_20000101_000000.json").exists());
    }

    #[test]
    fn test_migrate_missing_source() {
        let dir = tempdir().unwrap();
        let result = migrate_data_file(
            &dir.path().join("prod.json"),
            &dir.path().join("dev.json"),
            None,
            at(9, 0, 0),
        );
        assert!(matches!(result, Err(StoreError::MissingSource(_))));
    }

    #[test]
    fn test_migrate_backs_up_existing_target() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("prod.json");
        let target = dir.path().join("dev").join("dev.json");
        let policy = BackupPolicy {
            directory: dir.path().join("backups"),
            max_backups: 5,
        };

        fs::write(&source, "production data").unwrap();
        migrate_data_file(&source, &target, Some(&policy), at(9, 0, 0)).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "production data");

        fs::write(&source, "newer production data").unwrap();
        migrate_data_file(&source, &target, Some(&policy), at(9, 5, 0)).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "newer production data");

        let backups = list_backups(&target, &policy).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "production data");
    }

    #[test]
    fn test_migrate_onto_itself_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "data").unwrap();

        assert!(migrate_data_file(&path, &path, None, at(9, 0, 0)).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "data");
    }
}
