use super::SkillError;
use crate::shared::fs_atomic::atomic_write_file;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub path: PathBuf,
    pub backup_path: Option<PathBuf>,
}

/// Persists code modifications: parent directories created, writes atomic
/// (temp file + rename), and a timestamped backup taken before any
/// overwrite. Failing to back up fails the write. Writes are serialized.
pub struct AssetWriter {
    project_root: PathBuf,
    backups_root: PathBuf,
    backup_enabled: bool,
    write_lock: Mutex<()>,
}

impl AssetWriter {
    pub fn new(
        project_root: impl Into<PathBuf>,
        backups_root: impl Into<PathBuf>,
        backup_enabled: bool,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            backups_root: backups_root.into(),
            backup_enabled,
            write_lock: Mutex::new(()),
        }
    }

    pub fn write(
        &self,
        file_path: &str,
        content: &str,
        create_backup: bool,
    ) -> Result<WriteReceipt, SkillError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let target = self.resolve(file_path);
        let backup_path = if target.exists() {
            self.backup(file_path, &target, create_backup)?
        } else {
            None
        };
        atomic_write_file(&target, content.as_bytes()).map_err(|source| SkillError::Io {
            path: target.display().to_string(),
            source,
        })?;
        Ok(WriteReceipt {
            path: target,
            backup_path,
        })
    }

    pub fn delete(&self, file_path: &str, create_backup: bool) -> Result<WriteReceipt, SkillError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let target = self.resolve(file_path);
        let backup_path = if target.exists() {
            let backup = self.backup(file_path, &target, create_backup)?;
            fs::remove_file(&target).map_err(|source| SkillError::Io {
                path: target.display().to_string(),
                source,
            })?;
            backup
        } else {
            None
        };
        Ok(WriteReceipt {
            path: target,
            backup_path,
        })
    }

    pub fn read_existing(&self, file_path: &str) -> Result<Option<String>, SkillError> {
        let target = self.resolve(file_path);
        match fs::read_to_string(&target) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SkillError::Io {
                path: target.display().to_string(),
                source,
            }),
        }
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    fn backup(
        &self,
        file_path: &str,
        target: &Path,
        create_backup: bool,
    ) -> Result<Option<PathBuf>, SkillError> {
        if !self.backup_enabled || !create_backup {
            return Ok(None);
        }
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let relative = Path::new(file_path)
            .strip_prefix(&self.project_root)
            .unwrap_or(Path::new(file_path));
        let backup_path = self.backups_root.join(stamp).join(relative);
        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent).map_err(|source| SkillError::BackupFailed {
                path: backup_path.display().to_string(),
                source,
            })?;
        }
        fs::copy(target, &backup_path).map_err(|source| SkillError::BackupFailed {
            path: backup_path.display().to_string(),
            source,
        })?;
        Ok(Some(backup_path))
    }
}
