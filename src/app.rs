use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::catalog::CatalogClient;
use crate::domain::{
    BaseField, ColumnMapping, CustomColumnDef, DatasetSource, FieldType, NormalizedRecord,
    ProgressState,
};
use crate::error::LabError;
use crate::export;
use crate::grid::{self, GridColumn, GridPage, GridQuery};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::state::{AppState, LoadSummary};
use crate::upload;

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub listed: usize,
    pub fetched: usize,
    pub failed: Vec<String>,
    pub persist_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub file_name: Option<String>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub mapped: Option<MapResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapResult {
    pub records: usize,
    pub mappings: Vec<ColumnMapping>,
    pub unmapped_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnList {
    pub source: DatasetSource,
    pub columns: Vec<CustomColumnDef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub source: DatasetSource,
    pub path: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub source: DatasetSource,
    pub cleared: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Message(String),
    Listing {
        page: usize,
        pages: usize,
        collected: usize,
        total: usize,
    },
    Details(ProgressState),
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: CatalogClient> {
    state: AppState,
    client: C,
    options: PipelineOptions,
}

impl<C: CatalogClient> App<C> {
    pub fn new(state: AppState, client: C, options: PipelineOptions) -> Self {
        Self {
            state,
            client,
            options,
        }
    }

    /// Builds an app and adopts whatever the state's store already holds.
    pub fn open(state: AppState, client: C, options: PipelineOptions) -> (Self, LoadSummary) {
        let mut app = Self::new(state, client, options);
        let summary = app.state.load_from_store();
        (app, summary)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    pub fn into_state(self) -> AppState {
        self.state
    }

    /// Runs the aggregation pipeline and replaces the catalog dataset.
    pub fn fetch(&mut self, sink: &dyn ProgressSink) -> Result<FetchResult, LabError> {
        sink.event(ProgressEvent::Message("loading catalog".to_string()));
        self.state.set_loading(true);

        let pipeline = Pipeline::new(&self.client, self.options.clone());
        let aggregation = match pipeline.run_with_report(sink) {
            Ok(aggregation) => aggregation,
            Err(err) => {
                self.state.set_loading(false);
                return Err(err);
            }
        };

        let fetched = aggregation.records.len();
        let batches = aggregation
            .listed
            .div_ceil(self.options.detail_group_size.max(1));
        self.state.set_progress(ProgressState {
            fetched,
            total: aggregation.listed,
            is_complete: true,
            current_batch: batches,
            total_batches: batches,
        });
        let failures_before = self.state.persist_failures();
        self.state.set_all(DatasetSource::Api, aggregation.records);
        info!(fetched, listed = aggregation.listed, "catalog dataset replaced");

        Ok(FetchResult {
            listed: aggregation.listed,
            fetched,
            failed: aggregation.failed,
            persist_failures: self.state.persist_failures() - failures_before,
        })
    }

    /// Parses `path` into raw uploaded rows, then applies `mappings` if any
    /// were given. A rejected file leaves every dataset untouched.
    pub fn upload(
        &mut self,
        path: &Path,
        mappings: Vec<ColumnMapping>,
        sink: &dyn ProgressSink,
    ) -> Result<UploadResult, LabError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string());
        sink.event(ProgressEvent::Message(format!(
            "reading {}",
            path.display()
        )));
        self.state.begin_upload(file_name);

        let parsed = match upload::read_upload(path) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.state.fail_upload(&err);
                return Err(err);
            }
        };
        let rows = parsed.rows.len();
        let columns = upload::row_columns(&parsed.rows);
        let file_name = parsed.file_name.clone();
        self.state.set_uploaded_rows(parsed);
        sink.event(ProgressEvent::Message(format!("parsed {rows} rows")));

        let mapped = if mappings.is_empty() {
            None
        } else {
            Some(self.map(mappings)?)
        };

        Ok(UploadResult {
            file_name,
            rows,
            columns,
            mapped,
        })
    }

    /// Maps the previously uploaded rows onto the base schema.
    pub fn map(&mut self, mappings: Vec<ColumnMapping>) -> Result<MapResult, LabError> {
        let records = self.state.apply_mappings(mappings)?;
        Ok(MapResult {
            records,
            mappings: self.state.mappings().to_vec(),
            unmapped_columns: self.unmapped_columns(),
        })
    }

    /// Uploaded columns not yet used by any mapping.
    pub fn unmapped_columns(&self) -> Vec<String> {
        self.state
            .uploaded_columns()
            .into_iter()
            .filter(|column| {
                !self
                    .state
                    .mappings()
                    .iter()
                    .any(|mapping| &mapping.uploaded_column == column)
            })
            .collect()
    }

    pub fn view(&self, source: DatasetSource, query: &GridQuery) -> GridPage {
        let records = self.state.records(source);
        let columns = grid::grid_columns(records, self.state.columns(source));
        grid::query_grid(records, &columns, query)
    }

    /// Applies one inline cell edit. Invalid input leaves the record as it was.
    pub fn edit(
        &mut self,
        source: DatasetSource,
        id: &str,
        field: &str,
        raw: &str,
    ) -> Result<NormalizedRecord, LabError> {
        let records = self.state.records(source);
        let column = grid::grid_columns(records, self.state.columns(source))
            .into_iter()
            .find(|column| column.key == field)
            // url stays editable while hidden
            .or_else(|| (field == BaseField::Url.key()).then(|| GridColumn::base(BaseField::Url)))
            .ok_or_else(|| LabError::UnknownField(field.to_string()))?;
        let current = self
            .state
            .record(source, id)
            .ok_or_else(|| LabError::RecordNotFound(id.to_string()))?
            .value(field);
        let value = grid::parse_cell_edit(&column, raw, current.as_ref())?;
        self.state.update_record(source, id, field, value)
    }

    pub fn add_column(
        &mut self,
        source: DatasetSource,
        name: &str,
        column_type: FieldType,
        default_raw: &str,
    ) -> Result<CustomColumnDef, LabError> {
        let column = CustomColumnDef::from_form(name, column_type, default_raw)?;
        self.state.add_custom_column(source, column.clone())?;
        Ok(column)
    }

    pub fn remove_column(&mut self, source: DatasetSource, id: &str) -> Result<ColumnList, LabError> {
        self.state.remove_custom_column(source, id)?;
        Ok(self.columns(source))
    }

    pub fn columns(&self, source: DatasetSource) -> ColumnList {
        ColumnList {
            source,
            columns: self.state.columns(source).to_vec(),
        }
    }

    /// Writes the dataset as CSV to `out`, or to a timestamped file in the
    /// working directory.
    pub fn export(
        &self,
        source: DatasetSource,
        out: Option<PathBuf>,
    ) -> Result<ExportResult, LabError> {
        let records = self.state.records(source);
        if records.is_empty() {
            return Err(LabError::EmptyDataset(source.to_string()));
        }
        let path = out.unwrap_or_else(|| PathBuf::from(export::default_file_name(source)));
        let file = File::create(&path)
            .map_err(|err| LabError::Filesystem(format!("{}: {err}", path.display())))?;
        let rows = export::write_csv(BufWriter::new(file), records, self.state.columns(source))?;
        info!(rows, path = %path.display(), "exported dataset");
        Ok(ExportResult {
            source,
            path: path.display().to_string(),
            rows,
        })
    }

    pub fn clear(&mut self, source: DatasetSource, sink: &dyn ProgressSink) -> ClearResult {
        sink.event(ProgressEvent::Message(format!("clearing {source} data")));
        self.state.clear(source);
        ClearResult {
            source,
            cleared: true,
        }
    }
}
