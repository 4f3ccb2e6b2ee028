use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    ClearResult, ColumnList, ExportResult, FetchResult, MapResult, ProgressEvent, ProgressSink,
    UploadResult,
};
use crate::domain::{CustomColumnDef, NormalizedRecord};
use crate::grid::GridPage;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_upload(result: &UploadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_map(result: &MapResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_page(page: &GridPage) -> io::Result<()> {
        Self::print_json(page)
    }

    pub fn print_record(record: &NormalizedRecord) -> io::Result<()> {
        Self::print_json(record)
    }

    pub fn print_column(column: &CustomColumnDef) -> io::Result<()> {
        Self::print_json(column)
    }

    pub fn print_columns(result: &ColumnList) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_export(result: &ExportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
