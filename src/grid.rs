use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

use crate::domain::{
    BaseField, CustomColumnDef, FieldType, FieldValue, NormalizedRecord, parse_leading_int,
};
use crate::error::LabError;

pub const PAGE_SIZES: [usize; 4] = [10, 25, 50, 100];
pub const DEFAULT_PAGE_SIZE: usize = 25;

const GRID_BASE: [BaseField; 9] = [
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl FromStr for SortKey {
    type Err = LabError;

    /// `COLUMN` or `COLUMN:asc|desc`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (column, direction) = match value.split_once(':') {
            Some((column, "asc")) => (column, SortDirection::Asc),
            Some((column, "desc")) => (column, SortDirection::Desc),
            Some(_) => return Err(LabError::InvalidSort(value.to_string())),
            None => (value, SortDirection::Asc),
        };
        let column = column.trim();
        if column.is_empty() {
            return Err(LabError::InvalidSort(value.to_string()));
        }
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        write!(f, "{}:{direction}", self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridColumn {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub custom: bool,
}

impl GridColumn {
    pub fn base(field: BaseField) -> Self {
        Self {
            key: field.key().to_string(),
            label: field.label().to_string(),
            field_type: field.field_type(),
            custom: false,
        }
    }
}

/// Visible columns: the base schema (url only when some record has one),
/// then custom columns in creation order.
pub fn grid_columns(records: &[NormalizedRecord], custom: &[CustomColumnDef]) -> Vec<GridColumn> {
    let mut columns = GRID_BASE.into_iter().map(GridColumn::base).collect::<Vec<_>>();
    if records.iter().any(|record| record.url.is_some()) {
        columns.push(GridColumn::base(BaseField::Url));
    }
    columns.extend(custom.iter().map(|column| GridColumn {
        key: column.id.clone(),
        label: column.name.clone(),
        field_type: column.column_type,
        custom: true,
    }));
    columns
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridQuery {
    pub search: Option<String>,
    pub sort: Option<SortKey>,
    /// Zero-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for GridQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GridPage {
    pub columns: Vec<GridColumn>,
    pub rows: Vec<NormalizedRecord>,
    pub total_rows: usize,
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
}

/// Filters by a case-insensitive substring over every visible column, sorts
/// by one column, then cuts out the requested page.
pub fn query_grid(
    records: &[NormalizedRecord],
    columns: &[GridColumn],
    query: &GridQuery,
) -> GridPage {
    let needle = query
        .search
        .as_deref()
        .map(|search| search.trim().to_lowercase())
        .filter(|search| !search.is_empty());

    let mut rows = records
        .iter()
        .filter(|record| match &needle {
            Some(needle) => columns
                .iter()
                .any(|column| cell_text(record, &column.key).to_lowercase().contains(needle)),
            None => true,
        })
        .collect::<Vec<_>>();

    if let Some(sort) = &query.sort {
        rows.sort_by(|a, b| compare_cells(a, b, &sort.column, sort.direction));
    }

    let page_size = query.page_size.max(1);
    let total_rows = rows.len();
    let page_count = total_rows.div_ceil(page_size).max(1);
    let page = query.page.min(page_count - 1);
    let rows = rows
        .into_iter()
        .skip(page * page_size)
        .take(page_size)
        .cloned()
        .collect();

    GridPage {
        columns: columns.to_vec(),
        rows,
        total_rows,
        page,
        page_count,
        page_size,
    }
}

pub fn cell_text(record: &NormalizedRecord, key: &str) -> String {
    record
        .value(key)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

/// Absent values sort last in both directions.
fn compare_cells(
    a: &NormalizedRecord,
    b: &NormalizedRecord,
    key: &str,
    direction: SortDirection,
) -> Ordering {
    let left = sort_value(a, key);
    let right = sort_value(b, key);
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(left), Some(right)) => {
            let ordering = compare_values(&left, &right);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}

fn sort_value(record: &NormalizedRecord, key: &str) -> Option<FieldValue> {
    if key == BaseField::Id.key() {
        if let Some(id) = record.numeric_id() {
            return Some(FieldValue::Number(id));
        }
    }
    record.value(key)
}

fn compare_values(left: &FieldValue, right: &FieldValue) -> Ordering {
    match (left, right) {
        (FieldValue::Number(a), FieldValue::Number(b)) => a.total_cmp(b),
        (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
        (FieldValue::Number(_), _) => Ordering::Less,
        (_, FieldValue::Number(_)) => Ordering::Greater,
        _ => left
            .to_string()
            .to_lowercase()
            .cmp(&right.to_string().to_lowercase()),
    }
}

/// Parses an inline edit for `column`. Numbers must be non-negative
/// integers, text must be non-blank, booleans accept `toggle`.
pub fn parse_cell_edit(
    column: &GridColumn,
    raw: &str,
    current: Option<&FieldValue>,
) -> Result<FieldValue, LabError> {
    if !column.custom && column.key == BaseField::Id.key() {
        return Err(LabError::ImmutableField(column.key.clone()));
    }
    let invalid = || LabError::InvalidValue {
        field: column.key.clone(),
        value: raw.to_string(),
    };
    match column.field_type {
        FieldType::Number => parse_leading_int(raw)
            .filter(|value| *value >= 0)
            .map(FieldValue::from)
            .ok_or_else(invalid),
        FieldType::Boolean => match raw.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(FieldValue::Boolean(true)),
            "false" | "0" => Ok(FieldValue::Boolean(false)),
            "toggle" => {
                let now = matches!(current, Some(FieldValue::Boolean(true)));
                Ok(FieldValue::Boolean(!now))
            }
            _ => Err(invalid()),
        },
        FieldType::Text => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(invalid());
            }
            Ok(FieldValue::Text(trimmed.to_string()))
        }
    }
}
