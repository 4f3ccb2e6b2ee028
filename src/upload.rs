//! CSV ingest: size ceiling, loosely typed parsing, id synthesis, and the
//! mapping of uploaded columns onto the normalized schema.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BaseField, ColumnMapping, FieldType, FieldValue, NormalizedRecord};
use crate::error::LabError;

pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

const ID_COLUMN: &str = "id";

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-?(?:\d+\.?|\.\d+|\d+\.\d+)(?:[eE][-+]?\d+)?\s*$").expect("static regex")
});

/// A raw uploaded row. `id` is either the file's own `id` value or a
/// synthesized `uploaded_<index>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedRow {
    pub id: String,
    #[serde(flatten)]
    pub fields: IndexMap<String, FieldValue>,
}

impl UploadedRow {
    pub fn get(&self, column: &str) -> Option<FieldValue> {
        if column == ID_COLUMN {
            return Some(FieldValue::Text(self.id.clone()));
        }
        self.fields.get(column).cloned()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedUpload {
    pub file_name: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<UploadedRow>,
}

pub fn check_size(size: u64) -> Result<(), LabError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(LabError::UploadTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Reads a delimited file. The size check happens before any byte is parsed.
pub fn read_upload(path: &Path) -> Result<ParsedUpload, LabError> {
    let metadata = fs::metadata(path)
        .map_err(|err| LabError::Filesystem(format!("{}: {err}", path.display())))?;
    check_size(metadata.len())?;

    let file = File::open(path)
        .map_err(|err| LabError::Filesystem(format!("{}: {err}", path.display())))?;
    let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    };
    let mut parsed = parse_delimited(BufReader::new(file), delimiter)?;
    parsed.file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string());
    Ok(parsed)
}

pub fn parse_csv<R: Read>(reader: R) -> Result<ParsedUpload, LabError> {
    parse_delimited(reader, b',')
}

/// Header row names the fields, blank lines are skipped, empty cells are
/// left out of the row.
pub fn parse_delimited<R: Read>(reader: R, delimiter: u8) -> Result<ParsedUpload, LabError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns = csv_reader
        .headers()
        .map_err(|err| LabError::UploadParse(err.to_string()))?
        .iter()
        .map(|header| header.to_string())
        .collect::<Vec<_>>();
    if columns.iter().all(|column| column.is_empty()) {
        return Err(LabError::UploadEmpty);
    }

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for record in csv_reader.records() {
        let record = record.map_err(|err| LabError::UploadParse(err.to_string()))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let index = rows.len();
        let mut fields = IndexMap::new();
        let mut own_id = None;
        for (column, cell) in columns.iter().zip(record.iter()) {
            let Some(value) = infer_value(cell) else {
                continue;
            };
            if column == ID_COLUMN {
                own_id = Some(value.to_string());
            } else {
                fields.insert(column.clone(), value);
            }
        }

        let id = unique_id(own_id, index, &mut seen);
        rows.push(UploadedRow { id, fields });
    }

    if rows.is_empty() {
        return Err(LabError::UploadEmpty);
    }
    debug!(rows = rows.len(), columns = columns.len(), "parsed upload");

    Ok(ParsedUpload {
        file_name: None,
        columns,
        rows,
    })
}

/// Numeric-looking cells become numbers; everything else, including
/// `true`/`false`, stays text.
pub fn infer_value(cell: &str) -> Option<FieldValue> {
    if cell.is_empty() {
        return None;
    }
    if NUMERIC.is_match(cell) {
        // out-of-range numbers stay text; JSON has no infinity
        if let Ok(number) = cell.trim().parse::<f64>()
            && number.is_finite()
        {
            return Some(FieldValue::Number(number));
        }
    }
    Some(FieldValue::Text(cell.to_string()))
}

/// Column names present in `rows`, `id` first, in first-seen order.
pub fn row_columns(rows: &[UploadedRow]) -> Vec<String> {
    let mut columns = indexmap::IndexSet::new();
    columns.insert(ID_COLUMN.to_string());
    for row in rows {
        columns.extend(row.fields.keys().cloned());
    }
    columns.into_iter().collect()
}

/// Checks that every mapping names a known target once and a column that
/// exists in the upload.
pub fn validate_mappings(mappings: &[ColumnMapping], columns: &[String]) -> Result<(), LabError> {
    if mappings.is_empty() {
        return Err(LabError::InvalidMapping(
            "at least one column must be mapped".to_string(),
        ));
    }
    let mut targets = HashSet::new();
    for mapping in mappings {
        let target = mapping.target()?;
        if !targets.insert(target) {
            return Err(LabError::InvalidMapping(format!(
                "{} is mapped more than once",
                target.key()
            )));
        }
        if mapping.uploaded_column != ID_COLUMN
            && !columns.iter().any(|column| column == &mapping.uploaded_column)
        {
            return Err(LabError::InvalidMapping(format!(
                "uploaded file has no column {:?}",
                mapping.uploaded_column
            )));
        }
    }
    Ok(())
}

/// Projects each row onto its mapped target fields. Targets whose source
/// cell is missing are absent from the result.
pub fn map_row(row: &UploadedRow, mappings: &[ColumnMapping]) -> IndexMap<String, FieldValue> {
    let mut mapped = IndexMap::new();
    mapped.insert(ID_COLUMN.to_string(), FieldValue::Text(row.id.clone()));
    for mapping in mappings {
        if let Some(value) = row.get(&mapping.uploaded_column) {
            mapped.insert(mapping.pokemon_field.clone(), value.coerce(mapping.data_type));
        }
    }
    mapped
}

/// Builds normalized records from mapped rows. Unmapped stats and url stay
/// absent; unmapped name and types are empty.
pub fn apply_mappings(
    rows: &[UploadedRow],
    mappings: &[ColumnMapping],
) -> Result<Vec<NormalizedRecord>, LabError> {
    for mapping in mappings {
        mapping.target()?;
    }
    let mut seen = HashSet::new();
    let records = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mapped = map_row(row, mappings);
            let mut record = record_from_mapped(&mapped);
            record.id = unique_id(Some(record.id), index, &mut seen);
            record
        })
        .collect();
    Ok(records)
}

fn record_from_mapped(mapped: &IndexMap<String, FieldValue>) -> NormalizedRecord {
    let text = |field: BaseField| mapped.get(field.key()).map(|value| value.to_string());
    let mut record = NormalizedRecord::new(
        text(BaseField::Id).unwrap_or_default(),
        text(BaseField::Name).unwrap_or_default(),
    );
    record.types = text(BaseField::Types).unwrap_or_default();
    record.url = text(BaseField::Url);
    for field in BaseField::STATS {
        let value = mapped
            .get(field.key())
            .and_then(|value| value.coerce(FieldType::Number).as_f64())
            .map(|number| number.trunc() as i64);
        record.set_stat(field, value);
    }
    record
}

fn unique_id(candidate: Option<String>, index: usize, seen: &mut HashSet<String>) -> String {
    let id = candidate
        .filter(|id| !id.trim().is_empty() && !seen.contains(id))
        .unwrap_or_else(|| format!("uploaded_{index}"));
    seen.insert(id.clone());
    id
}
