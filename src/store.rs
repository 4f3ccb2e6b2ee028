use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::domain::{ColumnMapping, CustomColumnDef, DatasetSource, NormalizedRecord};
use crate::error::LabError;
use crate::upload::UploadedRow;

/// Current layout version. Each bump only adds tables.
pub const SCHEMA_VERSION: u32 = 3;

const MANIFEST_FILE: &str = "schema.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    CatalogRecords,
    CatalogColumns,
    UploadedRows,
    ColumnMappings,
    UploadedRecords,
    UploadedColumns,
}

impl TableName {
    pub const ALL: [TableName; 6] = [
        TableName::CatalogRecords,
        TableName::CatalogColumns,
        TableName::UploadedRows,
        TableName::ColumnMappings,
        TableName::UploadedRecords,
        TableName::UploadedColumns,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TableName::CatalogRecords => "pokemons",
            TableName::CatalogColumns => "customColumns",
            TableName::UploadedRows => "uploadedData",
            TableName::ColumnMappings => "columnMappings",
            TableName::UploadedRecords => "uploadedPokemons",
            TableName::UploadedColumns => "uploadedCustomColumns",
        }
    }

    pub fn introduced_in(self) -> u32 {
        match self {
            TableName::CatalogRecords => 1,
            TableName::CatalogColumns => 2,
            TableName::UploadedRows
            | TableName::ColumnMappings
            | TableName::UploadedRecords
            | TableName::UploadedColumns => 3,
        }
    }

    pub fn records(source: DatasetSource) -> Self {
        match source {
            DatasetSource::Api => TableName::CatalogRecords,
            DatasetSource::Uploaded => TableName::UploadedRecords,
        }
    }

    pub fn columns(source: DatasetSource) -> Self {
        match source {
            DatasetSource::Api => TableName::CatalogColumns,
            DatasetSource::Uploaded => TableName::UploadedColumns,
        }
    }
}

/// A value that can live in a table, addressed by its key.
pub trait TableRow: Serialize + DeserializeOwned + Clone {
    fn key(&self) -> String;
}

impl TableRow for NormalizedRecord {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl TableRow for CustomColumnDef {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl TableRow for ColumnMapping {
    fn key(&self) -> String {
        self.pokemon_field.clone()
    }
}

impl TableRow for UploadedRow {
    fn key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub created_at: String,
    pub upgraded_at: Option<String>,
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct TableFile<T> {
    table: String,
    updated_at: String,
    rows: IndexMap<String, T>,
}

/// Local persistent store: one JSON file per table under a root directory.
/// Every table operation is one read-modify-write that replaces the file
/// atomically, serialized by a store-wide lock.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
    lock: Arc<Mutex<()>>,
}

impl Store {
    /// Opens the store under the per-user data directory.
    pub fn new() -> Result<Self, LabError> {
        Self::open(crate::config::default_store_dir()?)
    }

    /// Opens (creating if absent) a store rooted at `root` and adds any tables
    /// missing for the current schema version.
    pub fn open(root: Utf8PathBuf) -> Result<Self, LabError> {
        let store = Self {
            root,
            lock: Arc::new(Mutex::new(())),
        };
        store.upgrade()?;
        Ok(store)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn table_path(&self, table: TableName) -> Utf8PathBuf {
        self.root.join(format!("{}.json", table.as_str()))
    }

    pub fn manifest(&self) -> Result<Manifest, LabError> {
        let content = fs::read_to_string(self.manifest_path().as_std_path())
            .map_err(|err| LabError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| LabError::StoreDecode {
            table: MANIFEST_FILE.to_string(),
            message: err.to_string(),
        })
    }

    pub fn records(&self, source: DatasetSource) -> Table<NormalizedRecord> {
        self.table(TableName::records(source))
    }

    pub fn columns(&self, source: DatasetSource) -> Table<CustomColumnDef> {
        self.table(TableName::columns(source))
    }

    pub fn uploaded_rows(&self) -> Table<UploadedRow> {
        self.table(TableName::UploadedRows)
    }

    pub fn column_mappings(&self) -> Table<ColumnMapping> {
        self.table(TableName::ColumnMappings)
    }

    /// Empties every table of one dataset scope.
    pub fn clear_scope(&self, source: DatasetSource) -> Result<(), LabError> {
        match source {
            DatasetSource::Api => {
                self.records(source).clear()?;
                self.columns(source).clear()?;
            }
            DatasetSource::Uploaded => {
                self.uploaded_rows().clear()?;
                self.column_mappings().clear()?;
                self.records(source).clear()?;
                self.columns(source).clear()?;
            }
        }
        Ok(())
    }

    fn table<T: TableRow>(&self, name: TableName) -> Table<T> {
        Table {
            name,
            path: self.table_path(name),
            lock: self.lock.clone(),
            _rows: PhantomData,
        }
    }

    fn upgrade(&self) -> Result<(), LabError> {
        let _guard = acquire(&self.lock);
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| LabError::Filesystem(err.to_string()))?;

        let previous = if self.manifest_path().as_std_path().exists() {
            Some(self.manifest()?)
        } else {
            None
        };
        let from_version = previous.as_ref().map(|m| m.schema_version).unwrap_or(0);
        if from_version > SCHEMA_VERSION {
            warn!(
                found = from_version,
                supported = SCHEMA_VERSION,
                "store was written by a newer version"
            );
        }

        let mut created = Vec::new();
        for table in TableName::ALL {
            if table.introduced_in() > SCHEMA_VERSION {
                continue;
            }
            let path = self.table_path(table);
            if !path.as_std_path().exists() {
                let empty: TableFile<serde_json::Value> = TableFile {
                    table: table.as_str().to_string(),
                    updated_at: timestamp(),
                    rows: IndexMap::new(),
                };
                write_json_atomic(&path, &empty)?;
                created.push(table.as_str());
            }
        }
        if !created.is_empty() {
            debug!(tables = ?created, root = %self.root, "created store tables");
        }

        if previous.is_none() || from_version < SCHEMA_VERSION || !created.is_empty() {
            let manifest = Manifest {
                schema_version: from_version.max(SCHEMA_VERSION),
                created_at: previous
                    .as_ref()
                    .map(|m| m.created_at.clone())
                    .unwrap_or_else(timestamp),
                upgraded_at: previous.as_ref().map(|_| timestamp()),
                tables: TableName::ALL
                    .iter()
                    .map(|table| table.as_str().to_string())
                    .collect(),
            };
            write_json_atomic(&self.manifest_path(), &manifest)?;
        }
        Ok(())
    }
}

/// Typed handle on one table file.
#[derive(Debug, Clone)]
pub struct Table<T: TableRow> {
    name: TableName,
    path: Utf8PathBuf,
    lock: Arc<Mutex<()>>,
    _rows: PhantomData<T>,
}

impl<T: TableRow> Table<T> {
    pub fn name(&self) -> TableName {
        self.name
    }

    pub fn get_all(&self) -> Result<Vec<T>, LabError> {
        let _guard = acquire(&self.lock);
        Ok(self.read()?.into_values().collect())
    }

    pub fn get(&self, key: &str) -> Result<Option<T>, LabError> {
        let _guard = acquire(&self.lock);
        Ok(self.read()?.shift_remove(key))
    }

    pub fn put(&self, row: &T) -> Result<(), LabError> {
        self.transaction(|rows| {
            rows.insert(row.key(), row.clone());
            Ok(())
        })
    }

    /// Upserts every row in one transaction.
    pub fn put_all(&self, batch: &[T]) -> Result<(), LabError> {
        self.transaction(|rows| {
            for row in batch {
                rows.insert(row.key(), row.clone());
            }
            Ok(())
        })
    }

    /// Clears the table and writes `batch` in one transaction.
    pub fn replace_all(&self, batch: &[T]) -> Result<(), LabError> {
        self.transaction(|rows| {
            rows.clear();
            for row in batch {
                rows.insert(row.key(), row.clone());
            }
            Ok(())
        })
    }

    pub fn delete(&self, key: &str) -> Result<(), LabError> {
        self.transaction(|rows| {
            rows.shift_remove(key);
            Ok(())
        })
    }

    pub fn clear(&self) -> Result<(), LabError> {
        self.transaction(|rows| {
            rows.clear();
            Ok(())
        })
    }

    /// Runs `apply` against the current rows and commits only if it succeeds.
    pub fn transaction<F>(&self, apply: F) -> Result<(), LabError>
    where
        F: FnOnce(&mut IndexMap<String, T>) -> Result<(), LabError>,
    {
        let _guard = acquire(&self.lock);
        let mut rows = self.read()?;
        apply(&mut rows)?;
        let file = TableFile {
            table: self.name.as_str().to_string(),
            updated_at: timestamp(),
            rows,
        };
        write_json_atomic(&self.path, &file)
    }

    fn read(&self) -> Result<IndexMap<String, T>, LabError> {
        if !self.path.as_std_path().exists() {
            return Ok(IndexMap::new());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| LabError::Filesystem(err.to_string()))?;
        let file: TableFile<T> =
            serde_json::from_str(&content).map_err(|err| LabError::StoreDecode {
                table: self.name.as_str().to_string(),
                message: err.to_string(),
            })?;
        Ok(file.rows)
    }
}

fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), LabError> {
    let parent = path
        .parent()
        .ok_or_else(|| LabError::Filesystem("invalid table path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| LabError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("pokelab-table")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    temp.write_all(&content)
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    Ok(())
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
