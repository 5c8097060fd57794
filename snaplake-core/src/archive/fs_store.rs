//! Local-filesystem object store.
//!
//! Keys map to relative paths under a root directory. Writes are atomic: the
//! bytes go to `{path}.tmp` first and are renamed into place. Temp files are
//! never listed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::store::ObjectStore;
use crate::error::StorageError;
use crate::partition::SEPARATOR;

const TMP_SUFFIX: &str = ".tmp";

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if needed and check that it is a directory.
    pub fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::Write {
            key: String::new(),
            reason: format!("create root {}: {e}", self.root.display()),
        })?;
        if !self.root.is_dir() {
            return Err(StorageError::Write {
                key: String::new(),
                reason: format!("{} is not a directory", self.root.display()),
            });
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key
            .split(SEPARATOR)
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with(SEPARATOR) || key.ends_with(SEPARATOR) {
        return Err(invalid("leading or trailing separator"));
    }
    if key.contains('\\') {
        return Err(invalid("backslash"));
    }
    if key
        .split(SEPARATOR)
        .any(|s| s.is_empty() || s == "." || s == "..")
    {
        return Err(invalid("empty or relative path segment"));
    }
    if key.ends_with(TMP_SUFFIX) {
        return Err(invalid("reserved temp suffix"));
    }
    Ok(())
}

/// Walk `dir`, pushing every regular file as a `/`-joined key relative to the root.
fn collect_keys(dir: &Path, rel: &str, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let key = if rel.is_empty() {
            name.to_string()
        } else {
            format!("{rel}{SEPARATOR}{name}")
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_keys(&entry.path(), &key, out)?;
        } else if file_type.is_file() && !name.ends_with(TMP_SUFFIX) {
            out.push(key);
        }
    }
    Ok(())
}

impl ObjectStore for FsStore {
    fn describe(&self) -> String {
        format!("fs:{}", self.root.display())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // Start from the deepest directory fully named by the prefix.
        let dir_part = match prefix.rfind(SEPARATOR) {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = dir_part
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment));

        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        collect_keys(&start, dir_part, &mut keys).map_err(|e| StorageError::List {
            prefix: prefix.to_string(),
            reason: e.to_string(),
        })?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn read_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| StorageError::Read {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn write_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let write_err = |reason: String| StorageError::Write {
            key: key.to_string(),
            reason,
        };

        if path.exists() {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(format!("create dir: {e}")))?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        let result = fs::File::create(&tmp_path)
            .and_then(|mut f| {
                f.write_all(&bytes)?;
                f.sync_all()
            })
            .map_err(|e| write_err(format!("temp write: {e}")));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Re-check right before the rename; a concurrent writer may have won.
        if path.exists() {
            let _ = fs::remove_file(&tmp_path);
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_err(format!("atomic rename failed: {e}"))
        })
    }
}
