use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LabError {
    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("failed to decode catalog response: {0}")]
    CatalogDecode(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigInvalid(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("corrupt store table {table}: {message}")]
    StoreDecode { table: String, message: String },

    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    #[diagnostic(help("split the file or upload a smaller extract"))]
    UploadTooLarge { size: u64, limit: u64 },

    #[error("failed to parse uploaded file: {0}")]
    UploadParse(String),

    #[error("uploaded file contains no rows")]
    UploadEmpty,

    #[error("nothing uploaded yet")]
    #[diagnostic(help("run `pokelab upload <file>` first"))]
    NoUploadedRows,

    #[error("invalid column name: {0}")]
    InvalidColumnName(String),

    #[error("column already exists: {0}")]
    DuplicateColumn(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("field cannot be edited: {0}")]
    ImmutableField(String),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("no {0} records loaded")]
    #[diagnostic(help("run `pokelab fetch` or `pokelab upload <file>` first"))]
    EmptyDataset(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("record already exists: {0}")]
    DuplicateRecord(String),

    #[error("invalid column mapping: {0}")]
    InvalidMapping(String),

    #[error("invalid dataset source: {0}")]
    InvalidSource(String),

    #[error("invalid sort specifier: {0}")]
    InvalidSort(String),
}
