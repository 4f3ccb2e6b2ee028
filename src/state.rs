//! In-memory working set for both dataset scopes.
//!
//! Memory is authoritative. Every mutation is applied in memory first and
//! then written through to the [`Store`]; a failed write is logged, counted
//! and announced as [`StateEvent::PersistFailed`], but never rolled back.

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{
    BaseField, ColumnMapping, CustomColumnDef, DatasetSource, FieldValue, NormalizedRecord,
    ProgressState,
};
use crate::error::LabError;
use crate::store::{Store, TableName};
use crate::upload::{self, ParsedUpload, UploadedRow};

#[derive(Debug, Clone, Default, Serialize)]
pub struct Dataset {
    pub records: Vec<NormalizedRecord>,
    pub columns: Vec<CustomColumnDef>,
    pub is_set: bool,
}

impl Dataset {
    fn find_mut(&mut self, id: &str) -> Option<&mut NormalizedRecord> {
        self.records.iter_mut().find(|record| record.id == id)
    }

    fn column(&self, id: &str) -> Option<&CustomColumnDef> {
        self.columns.iter().find(|column| column.id == id)
    }

    fn fill_defaults(&self, record: &mut NormalizedRecord) {
        for column in &self.columns {
            record
                .custom
                .entry(column.id.clone())
                .or_insert_with(|| column.default_value.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadStatus {
    pub is_uploading: bool,
    pub error: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    RecordsReplaced { source: DatasetSource, count: usize },
    RecordAdded { source: DatasetSource, id: String },
    RecordUpdated { source: DatasetSource, id: String },
    RecordRemoved { source: DatasetSource, id: String },
    ColumnAdded { source: DatasetSource, id: String },
    ColumnUpdated { source: DatasetSource, id: String },
    ColumnRemoved { source: DatasetSource, id: String },
    UploadChanged(UploadStatus),
    MappingsChanged(usize),
    ScopeCleared(DatasetSource),
    LoadingChanged(bool),
    Progress(ProgressState),
    PersistFailed { table: &'static str, message: String },
}

pub type Listener = Box<dyn Fn(&StateEvent) + Send>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub catalog_records: usize,
    pub catalog_columns: usize,
    pub uploaded_rows: usize,
    pub uploaded_records: usize,
    pub uploaded_columns: usize,
    pub mappings: usize,
}

pub struct AppState {
    catalog: Dataset,
    uploaded: Dataset,
    uploaded_rows: Vec<UploadedRow>,
    mappings: Vec<ColumnMapping>,
    upload: UploadStatus,
    loading: bool,
    progress: Option<ProgressState>,
    store: Option<Store>,
    listeners: Vec<Listener>,
    persist_failures: usize,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self::with_store(Some(store))
    }

    /// A state with no persistence behind it.
    pub fn in_memory() -> Self {
        Self::with_store(None)
    }

    fn with_store(store: Option<Store>) -> Self {
        Self {
            catalog: Dataset::default(),
            uploaded: Dataset::default(),
            uploaded_rows: Vec::new(),
            mappings: Vec::new(),
            upload: UploadStatus::default(),
            loading: false,
            progress: None,
            store,
            listeners: Vec::new(),
            persist_failures: 0,
        }
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }

    pub fn dataset(&self, source: DatasetSource) -> &Dataset {
        match source {
            DatasetSource::Api => &self.catalog,
            DatasetSource::Uploaded => &self.uploaded,
        }
    }

    pub fn records(&self, source: DatasetSource) -> &[NormalizedRecord] {
        &self.dataset(source).records
    }

    pub fn columns(&self, source: DatasetSource) -> &[CustomColumnDef] {
        &self.dataset(source).columns
    }

    pub fn record(&self, source: DatasetSource, id: &str) -> Option<&NormalizedRecord> {
        self.records(source).iter().find(|record| record.id == id)
    }

    pub fn uploaded_rows(&self) -> &[UploadedRow] {
        &self.uploaded_rows
    }

    pub fn uploaded_columns(&self) -> Vec<String> {
        upload::row_columns(&self.uploaded_rows)
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn upload_status(&self) -> &UploadStatus {
        &self.upload
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn progress(&self) -> Option<ProgressState> {
        self.progress
    }

    pub fn persist_failures(&self) -> usize {
        self.persist_failures
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.emit(StateEvent::LoadingChanged(loading));
    }

    pub fn set_progress(&mut self, progress: ProgressState) {
        self.progress = Some(progress);
        self.emit(StateEvent::Progress(progress));
    }

    /// Adopts persisted tables. A scope's records are taken only when the
    /// persisted table has at least one row.
    pub fn load_from_store(&mut self) -> LoadSummary {
        let mut summary = LoadSummary::default();
        let Some(store) = self.store.clone() else {
            return summary;
        };
        self.set_loading(true);

        for source in [DatasetSource::Api, DatasetSource::Uploaded] {
            let records = match store.records(source).get_all() {
                Ok(records) => records,
                Err(err) => {
                    warn!(%source, error = %err, "failed to load persisted records");
                    Vec::new()
                }
            };
            let columns = match store.columns(source).get_all() {
                Ok(columns) => columns,
                Err(err) => {
                    warn!(%source, error = %err, "failed to load persisted columns");
                    Vec::new()
                }
            };

            let dataset = self.dataset_mut(source);
            if !columns.is_empty() {
                dataset.columns = columns;
            }
            if !records.is_empty() {
                dataset.records = records;
                dataset.is_set = true;
            }
            let (record_count, column_count) = (dataset.records.len(), dataset.columns.len());
            match source {
                DatasetSource::Api => {
                    summary.catalog_records = record_count;
                    summary.catalog_columns = column_count;
                }
                DatasetSource::Uploaded => {
                    summary.uploaded_records = record_count;
                    summary.uploaded_columns = column_count;
                }
            }
        }

        match store.uploaded_rows().get_all() {
            Ok(rows) if !rows.is_empty() => self.uploaded_rows = rows,
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to load uploaded rows"),
        }
        match store.column_mappings().get_all() {
            Ok(mappings) => self.mappings = mappings,
            Err(err) => warn!(error = %err, "failed to load column mappings"),
        }
        summary.uploaded_rows = self.uploaded_rows.len();
        summary.mappings = self.mappings.len();

        self.set_loading(false);
        debug!(?summary, "loaded persisted state");
        summary
    }

    /// Replaces a scope's records wholesale. Existing custom columns are
    /// back-filled with their defaults.
    pub fn set_all(&mut self, source: DatasetSource, records: Vec<NormalizedRecord>) {
        let mut records = records;
        let dataset = self.dataset_mut(source);
        for record in &mut records {
            dataset.fill_defaults(record);
        }
        dataset.records = records;
        dataset.is_set = true;
        let count = dataset.records.len();
        self.loading = false;

        let result = self
            .store
            .as_ref()
            .map(|store| store.records(source).replace_all(self.records(source)));
        self.note_persist(TableName::records(source), result);
        self.emit(StateEvent::RecordsReplaced { source, count });
    }

    pub fn add_record(
        &mut self,
        source: DatasetSource,
        mut record: NormalizedRecord,
    ) -> Result<(), LabError> {
        if self.record(source, &record.id).is_some() {
            return Err(LabError::DuplicateRecord(record.id));
        }
        let dataset = self.dataset_mut(source);
        dataset.fill_defaults(&mut record);
        let id = record.id.clone();

        let result = self.store.as_ref().map(|store| store.records(source).put(&record));
        self.dataset_mut(source).records.push(record);
        self.note_persist(TableName::records(source), result);
        self.emit(StateEvent::RecordAdded { source, id });
        Ok(())
    }

    pub fn remove_record(&mut self, source: DatasetSource, id: &str) -> Result<(), LabError> {
        let dataset = self.dataset_mut(source);
        let before = dataset.records.len();
        dataset.records.retain(|record| record.id != id);
        if dataset.records.len() == before {
            return Err(LabError::RecordNotFound(id.to_string()));
        }

        let result = self.store.as_ref().map(|store| store.records(source).delete(id));
        self.note_persist(TableName::records(source), result);
        self.emit(StateEvent::RecordRemoved {
            source,
            id: id.to_string(),
        });
        Ok(())
    }

    /// Sets one field of one record. Custom values are coerced to the
    /// column's type.
    pub fn update_record(
        &mut self,
        source: DatasetSource,
        id: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<NormalizedRecord, LabError> {
        let dataset = self.dataset_mut(source);
        let base = field.parse::<BaseField>().ok();
        let custom_type = match base {
            Some(_) => None,
            None => Some(
                dataset
                    .column(field)
                    .map(|column| column.column_type)
                    .ok_or_else(|| LabError::UnknownColumn(field.to_string()))?,
            ),
        };
        let record = dataset
            .find_mut(id)
            .ok_or_else(|| LabError::RecordNotFound(id.to_string()))?;
        if let Some(base) = base {
            record.set_base(base, &value)?;
        } else if let Some(column_type) = custom_type {
            record
                .custom
                .insert(field.to_string(), value.coerce(column_type));
        }
        let updated = record.clone();

        let result = self.store.as_ref().map(|store| store.records(source).put(&updated));
        self.note_persist(TableName::records(source), result);
        self.emit(StateEvent::RecordUpdated {
            source,
            id: id.to_string(),
        });
        Ok(updated)
    }

    /// Adds a column and gives every record its default value.
    pub fn add_custom_column(
        &mut self,
        source: DatasetSource,
        column: CustomColumnDef,
    ) -> Result<(), LabError> {
        if column.id.parse::<BaseField>().is_ok() {
            return Err(LabError::DuplicateColumn(column.id));
        }
        let dataset = self.dataset_mut(source);
        if dataset.column(&column.id).is_some() {
            return Err(LabError::DuplicateColumn(column.id));
        }
        for record in &mut dataset.records {
            record
                .custom
                .insert(column.id.clone(), column.default_value.clone());
        }
        let id = column.id.clone();
        dataset.columns.push(column);

        self.mirror_columns_and_records(source);
        self.emit(StateEvent::ColumnAdded { source, id });
        Ok(())
    }

    /// Drops a column and strips its field from every record.
    pub fn remove_custom_column(&mut self, source: DatasetSource, id: &str) -> Result<(), LabError> {
        let dataset = self.dataset_mut(source);
        if dataset.column(id).is_none() {
            return Err(LabError::UnknownColumn(id.to_string()));
        }
        dataset.columns.retain(|column| column.id != id);
        for record in &mut dataset.records {
            record.custom.shift_remove(id);
        }

        self.mirror_columns_and_records(source);
        self.emit(StateEvent::ColumnRemoved {
            source,
            id: id.to_string(),
        });
        Ok(())
    }

    /// Renames a column or changes its default. Record values are untouched.
    pub fn update_custom_column(
        &mut self,
        source: DatasetSource,
        id: &str,
        name: Option<String>,
        default_value: Option<FieldValue>,
    ) -> Result<CustomColumnDef, LabError> {
        let dataset = self.dataset_mut(source);
        let column = dataset
            .columns
            .iter_mut()
            .find(|column| column.id == id)
            .ok_or_else(|| LabError::UnknownColumn(id.to_string()))?;
        if let Some(name) = name {
            column.name = name.trim().to_string();
        }
        if let Some(default_value) = default_value {
            column.default_value = default_value.coerce(column.column_type);
        }
        let updated = column.clone();

        let result = self.store.as_ref().map(|store| store.columns(source).put(&updated));
        self.note_persist(TableName::columns(source), result);
        self.emit(StateEvent::ColumnUpdated {
            source,
            id: id.to_string(),
        });
        Ok(updated)
    }

    pub fn begin_upload(&mut self, file_name: Option<String>) {
        self.upload = UploadStatus {
            is_uploading: true,
            error: None,
            file_name,
        };
        self.emit(StateEvent::UploadChanged(self.upload.clone()));
    }

    /// Records a rejected upload. Data is left as it was.
    pub fn fail_upload(&mut self, error: &LabError) {
        self.upload = UploadStatus {
            is_uploading: false,
            error: Some(error.to_string()),
            file_name: None,
        };
        self.emit(StateEvent::UploadChanged(self.upload.clone()));
    }

    pub fn set_uploaded_rows(&mut self, parsed: ParsedUpload) {
        self.uploaded_rows = parsed.rows;
        self.upload = UploadStatus {
            is_uploading: false,
            error: None,
            file_name: parsed.file_name,
        };

        let result = self
            .store
            .as_ref()
            .map(|store| store.uploaded_rows().replace_all(&self.uploaded_rows));
        self.note_persist(TableName::UploadedRows, result);
        self.emit(StateEvent::UploadChanged(self.upload.clone()));
    }

    /// Validates `mappings` against the uploaded rows, stores them, and
    /// replaces the uploaded scope with the mapped records.
    pub fn apply_mappings(&mut self, mappings: Vec<ColumnMapping>) -> Result<usize, LabError> {
        if self.uploaded_rows.is_empty() {
            return Err(LabError::NoUploadedRows);
        }
        upload::validate_mappings(&mappings, &self.uploaded_columns())?;
        let records = upload::apply_mappings(&self.uploaded_rows, &mappings)?;
        self.mappings = mappings;

        let result = self
            .store
            .as_ref()
            .map(|store| store.column_mappings().replace_all(&self.mappings));
        self.note_persist(TableName::ColumnMappings, result);
        self.emit(StateEvent::MappingsChanged(self.mappings.len()));

        let count = records.len();
        self.set_all(DatasetSource::Uploaded, records);
        Ok(count)
    }

    /// Empties one scope in memory and on disk.
    pub fn clear(&mut self, source: DatasetSource) {
        *self.dataset_mut(source) = Dataset::default();
        if source == DatasetSource::Uploaded {
            self.uploaded_rows.clear();
            self.mappings.clear();
            self.upload = UploadStatus::default();
        }

        let result = self.store.as_ref().map(|store| store.clear_scope(source));
        self.note_persist(TableName::records(source), result);
        self.emit(StateEvent::ScopeCleared(source));
    }

    fn dataset_mut(&mut self, source: DatasetSource) -> &mut Dataset {
        match source {
            DatasetSource::Api => &mut self.catalog,
            DatasetSource::Uploaded => &mut self.uploaded,
        }
    }

    fn mirror_columns_and_records(&mut self, source: DatasetSource) {
        let result = self
            .store
            .as_ref()
            .map(|store| store.columns(source).replace_all(self.columns(source)));
        self.note_persist(TableName::columns(source), result);
        let result = self
            .store
            .as_ref()
            .map(|store| store.records(source).replace_all(self.records(source)));
        self.note_persist(TableName::records(source), result);
    }

    fn note_persist(&mut self, table: TableName, result: Option<Result<(), LabError>>) {
        if let Some(Err(err)) = result {
            warn!(table = table.as_str(), error = %err, "failed to persist change");
            self.persist_failures += 1;
            self.emit(StateEvent::PersistFailed {
                table: table.as_str(),
                message: err.to_string(),
            });
        }
    }

    fn emit(&self, event: StateEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }
}
