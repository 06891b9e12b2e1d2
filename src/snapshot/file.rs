use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{validate_key, SnapshotError, SnapshotStore};

/// One `<key>.json` file per resource under a cache directory.
///
/// Writes go to a temporary sibling that is then renamed over the target,
/// so readers never observe a partially written snapshot. Different keys
/// touch different files and share no lock.
pub struct FileSnapshotStore {
    cache_dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn snapshot_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
        validate_key(key)?;
        // The temp file is removed on drop if anything below fails
        let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(self.snapshot_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        validate_key(key)?;
        match std::fs::read(self.snapshot_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}
