//! Table stores.
//!
//! A table is addressed by a *name* (the run key or a spill file id). The
//! store appends its format's extension and owns the directory layout.

use crate::error::{Result, TabularError};
use crate::format::TableFormat;
use crate::manifest::TableManifest;
use async_trait::async_trait;
use frigate_core::CandidateTable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};

/// Save/load capability for candidate tables.
#[async_trait]
pub trait TableStore: Debug + Send + Sync {
    /// Persist `table` under `name`, replacing any previous table. Returns the
    /// location written (a path for file stores).
    async fn save(&self, name: &str, table: &CandidateTable) -> Result<String>;

    /// Load the table stored under `name`.
    ///
    /// Returns `TabularError::NotFound` if nothing is stored there.
    async fn load(&self, name: &str) -> Result<CandidateTable>;

    /// Number of rows stored under `name`, or `None` if absent.
    async fn row_count(&self, name: &str) -> Result<Option<usize>>;

    /// Remove the table stored under `name`, and its manifest if any.
    ///
    /// Idempotent: removing a missing table succeeds.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Persist `manifest` beside the table stored under `name`.
    async fn save_manifest(&self, name: &str, manifest: &TableManifest) -> Result<()>;

    /// Manifest stored beside `name`, or `None` if there is none.
    async fn load_manifest(&self, name: &str) -> Result<Option<TableManifest>>;
}

/// Suffix of the manifest file written next to a table.
const MANIFEST_SUFFIX: &str = "manifest.json";

// ============================================================================
// File store
// ============================================================================

/// Stores each table as one file: `{base_path}/{name}.{ext}`.
#[derive(Debug, Clone)]
pub struct FileTableStore {
    base_path: PathBuf,
    format: TableFormat,
}

impl FileTableStore {
    pub fn new(base_path: impl Into<PathBuf>, format: TableFormat) -> Self {
        Self {
            base_path: base_path.into(),
            format,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    /// Full path for a table name.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        self.file_for(name, self.format.extension())
    }

    /// Full path of the manifest for a table name.
    pub fn manifest_path_for(&self, name: &str) -> Result<PathBuf> {
        self.file_for(name, MANIFEST_SUFFIX)
    }

    fn file_for(&self, name: &str, extension: &str) -> Result<PathBuf> {
        let p = Path::new(name);
        if name.is_empty()
            || p.is_absolute()
            || p.components().any(|c| {
                matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
            })
        {
            return Err(TabularError::InvalidName(name.to_string()));
        }
        Ok(self.base_path.join(format!("{name}.{extension}")))
    }

    async fn read_existing(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TabularError::io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write `bytes` to a sibling then rename so readers never see a partial file.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TabularError::io(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut tmp_path = path.to_path_buf().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);
        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| {
            TabularError::io(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
            TabularError::io(format!(
                "Failed to rename {} to {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })
    }

    async fn remove_file(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TabularError::io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl TableStore for FileTableStore {
    async fn save(&self, name: &str, table: &CandidateTable) -> Result<String> {
        let path = self.path_for(name)?;
        let bytes = self.format.encode(table)?;
        self.write_atomic(&path, &bytes).await?;

        tracing::debug!(
            path = %path.display(),
            rows = table.len(),
            bytes = bytes.len(),
            "table saved"
        );
        Ok(path.display().to_string())
    }

    async fn load(&self, name: &str) -> Result<CandidateTable> {
        let path = self.path_for(name)?;
        let bytes = self
            .read_existing(&path)
            .await?
            .ok_or_else(|| TabularError::NotFound(path.display().to_string()))?;
        self.format.decode(&bytes, &path.display().to_string())
    }

    async fn row_count(&self, name: &str) -> Result<Option<usize>> {
        let path = self.path_for(name)?;
        match self.read_existing(&path).await? {
            Some(bytes) => Ok(Some(
                self.format.count_rows(&bytes, &path.display().to_string())?,
            )),
            None => Ok(None),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        Self::remove_file(&self.manifest_path_for(name)?).await?;
        Self::remove_file(&self.path_for(name)?).await
    }

    async fn save_manifest(&self, name: &str, manifest: &TableManifest) -> Result<()> {
        let path = self.manifest_path_for(name)?;
        let bytes = serde_json::to_vec(manifest)?;
        self.write_atomic(&path, &bytes).await
    }

    async fn load_manifest(&self, name: &str) -> Result<Option<TableManifest>> {
        let path = self.manifest_path_for(name)?;
        match self.read_existing(&path).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                TabularError::Corrupt {
                    path: path.display().to_string(),
                    line: 0,
                    message: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// In-memory table store for testing.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: RwLock<HashMap<String, CandidateTable>>,
    manifests: RwLock<HashMap<String, TableManifest>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently stored, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn save(&self, name: &str, table: &CandidateTable) -> Result<String> {
        self.tables.write().insert(name.to_string(), table.clone());
        Ok(format!("memory://{name}"))
    }

    async fn load(&self, name: &str) -> Result<CandidateTable> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TabularError::NotFound(name.to_string()))
    }

    async fn row_count(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.tables.read().get(name).map(CandidateTable::len))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.tables.write().remove(name);
        self.manifests.write().remove(name);
        Ok(())
    }

    async fn save_manifest(&self, name: &str, manifest: &TableManifest) -> Result<()> {
        self.manifests.write().insert(name.to_string(), *manifest);
        Ok(())
    }

    async fn load_manifest(&self, name: &str) -> Result<Option<TableManifest>> {
        Ok(self.manifests.read().get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frigate_core::{CandidateRecord, FlatRow};
    use serde_json::json;

    fn table(n: i64) -> CandidateTable {
        (0..n)
            .map(|i| {
                let mut row = FlatRow::new();
                row.insert("candid".into(), json!(i));
                row.insert("objectId".into(), json!("ZTF22abc"));
                row.insert("candidate.jd".into(), json!(2_460_000.5));
                row.insert("candidate.fid".into(), json!(1 + i % 2));
                CandidateRecord::from_flat_row(row).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_file_store_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTableStore::new(dir.path(), TableFormat::JsonLines);

        assert_eq!(store.row_count("run").await.unwrap(), None);

        let t = table(5);
        let written = store.save("run", &t).await.unwrap();
        assert!(written.ends_with("run.jsonl"));
        assert!(!dir.path().join("run.jsonl.tmp").exists());

        assert_eq!(store.row_count("run").await.unwrap(), Some(5));
        assert_eq!(store.load("run").await.unwrap(), t);

        store.remove("run").await.unwrap();
        store.remove("run").await.unwrap();
        assert!(matches!(
            store.load("run").await,
            Err(TabularError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileTableStore::new(&nested, TableFormat::JsonLinesZstd);
        store.save("out", &table(2)).await.unwrap();
        assert!(nested.join("out.jsonl.zst").exists());
        assert_eq!(store.load("out").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTableStore::new(dir.path(), TableFormat::JsonLines);
        assert!(matches!(
            store.save("../escape", &table(1)).await,
            Err(TabularError::InvalidName(_))
        ));
        assert!(matches!(store.path_for(""), Err(TabularError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_file_store_manifest_lives_beside_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTableStore::new(dir.path(), TableFormat::JsonLines);

        assert_eq!(store.load_manifest("run").await.unwrap(), None);
        store.save("run", &table(3)).await.unwrap();
        store
            .save_manifest("run", &TableManifest::new(3, 4))
            .await
            .unwrap();
        assert!(dir.path().join("run.manifest.json").exists());
        assert_eq!(
            store.load_manifest("run").await.unwrap(),
            Some(TableManifest::new(3, 4))
        );

        store.remove("run").await.unwrap();
        assert_eq!(store.load_manifest("run").await.unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTableStore::new(dir.path(), TableFormat::JsonLines);
        std::fs::write(dir.path().join("run.manifest.json"), b"{not json").unwrap();
        assert!(matches!(
            store.load_manifest("run").await,
            Err(TabularError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryTableStore::new();
        store.save("b", &table(1)).await.unwrap();
        store.save("a", &table(3)).await.unwrap();
        assert_eq!(store.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.row_count("a").await.unwrap(), Some(3));
        store.save_manifest("a", &TableManifest::new(3, 3)).await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.row_count("a").await.unwrap(), None);
        assert_eq!(store.load_manifest("a").await.unwrap(), None);
    }
}
