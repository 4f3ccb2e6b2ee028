use std::cmp::Ordering;
use std::io::Write;

use crate::domain::{BaseField, CustomColumnDef, DatasetSource, NormalizedRecord};
use crate::error::LabError;
use crate::grid::cell_text;

const EXPORT_BASE: [BaseField; 9] = [
    BaseField::Id,
    BaseField::Name,
    BaseField::Types,
    BaseField::Hp,
    BaseField::Attack,
    BaseField::Defense,
    BaseField::SpAttack,
    BaseField::SpDefense,
    BaseField::Speed,
];

/// Header of an export: base fields, `url` if any record carries one, then
/// the scope's custom columns.
pub fn export_columns(records: &[NormalizedRecord], custom: &[CustomColumnDef]) -> Vec<String> {
    let mut columns = EXPORT_BASE
        .iter()
        .map(|field| field.key().to_string())
        .collect::<Vec<_>>();
    if records.iter().any(|record| record.url.is_some()) {
        columns.push(BaseField::Url.key().to_string());
    }
    columns.extend(custom.iter().map(|column| column.id.clone()));
    columns
}

/// Orders records by numeric id; non-numeric ids follow in their original order.
pub fn sorted_for_export(records: &[NormalizedRecord]) -> Vec<&NormalizedRecord> {
    let mut sorted = records.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| match (a.numeric_id(), b.numeric_id()) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    sorted
}

/// Writes the dataset as CSV and returns the number of data rows.
pub fn write_csv<W: Write>(
    writer: W,
    records: &[NormalizedRecord],
    custom: &[CustomColumnDef],
) -> Result<usize, LabError> {
    let columns = export_columns(records, custom);
    let mut csv_writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);
    csv_writer
        .write_record(&columns)
        .map_err(|err| LabError::Filesystem(err.to_string()))?;

    let sorted = sorted_for_export(records);
    for record in &sorted {
        let row = columns
            .iter()
            .map(|column| cell_text(record, column))
            .collect::<Vec<_>>();
        csv_writer
            .write_record(&row)
            .map_err(|err| LabError::Filesystem(err.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|err| LabError::Filesystem(err.to_string()))?;
    Ok(sorted.len())
}

pub fn default_file_name(source: DatasetSource) -> String {
    format!(
        "pokemon-{source}-{}.csv",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    )
}
