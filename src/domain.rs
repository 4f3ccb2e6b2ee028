use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LabError;

static LEADING_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("static regex")
});
static LEADING_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[+-]?\d+").expect("static regex"));
static COLUMN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\s]+$").expect("static regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Number => write!(f, "number"),
            FieldType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A loosely typed cell value, as found in uploaded rows and custom columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Text(_) => FieldType::Text,
        }
    }

    /// Coerces the value into `target`: numbers parse their leading numeric
    /// prefix and fall back to 0, booleans are true only for `true`/`1`.
    pub fn coerce(&self, target: FieldType) -> FieldValue {
        match target {
            FieldType::Number => match self {
                FieldValue::Number(value) => FieldValue::Number(*value),
                FieldValue::Boolean(_) => FieldValue::Number(0.0),
                FieldValue::Text(text) => {
                    FieldValue::Number(parse_leading_float(text).unwrap_or(0.0))
                }
            },
            FieldType::Boolean => FieldValue::Boolean(match self {
                FieldValue::Boolean(value) => *value,
                FieldValue::Number(value) => *value == 1.0,
                FieldValue::Text(text) => text == "true" || text == "1",
            }),
            FieldType::Text => FieldValue::Text(self.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(value) => write!(f, "{value}"),
            FieldValue::Number(value) => write!(f, "{}", format_number(*value)),
            FieldValue::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn parse_leading_float(text: &str) -> Option<f64> {
    LEADING_FLOAT
        .find(text)
        .and_then(|found| found.as_str().trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

pub fn parse_leading_int(text: &str) -> Option<i64> {
    LEADING_INT
        .find(text)
        .and_then(|found| found.as_str().trim().parse::<i64>().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSource {
    Api,
    Uploaded,
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::Api => write!(f, "api"),
            DatasetSource::Uploaded => write!(f, "uploaded"),
        }
    }
}

impl FromStr for DatasetSource {
    type Err = LabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "api" | "catalog" => Ok(DatasetSource::Api),
            "uploaded" | "upload" => Ok(DatasetSource::Uploaded),
            _ => Err(LabError::InvalidSource(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItemRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub fetched: usize,
    pub total: usize,
    pub is_complete: bool,
    pub current_batch: usize,
    pub total_batches: usize,
}

impl ProgressState {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.fetched as f64 / self.total as f64 * 100.0
    }
}

/// The fixed part of the normalized schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseField {
    Id,
    Name,
    Url,
    Types,
    Hp,
    Attack,
    Defense,
    SpAttack,
    SpDefense,
    Speed,
}

impl BaseField {
    pub const ALL: [BaseField; 10] = [
        BaseField::Id,
        BaseField::Name,
        BaseField::Url,
        BaseField::Types,
        BaseField::Hp,
        BaseField::Attack,
        BaseField::Defense,
        BaseField::SpAttack,
        BaseField::SpDefense,
        BaseField::Speed,
    ];

    pub const STATS: [BaseField; 6] = [
        BaseField::Hp,
        BaseField::Attack,
        BaseField::Defense,
        BaseField::SpAttack,
        BaseField::SpDefense,
        BaseField::Speed,
    ];

    pub fn key(self) -> &'static str {
        match self {
            BaseField::Id => "id",
            BaseField::Name => "name",
            BaseField::Url => "url",
            BaseField::Types => "types",
            BaseField::Hp => "hp",
            BaseField::Attack => "attack",
            BaseField::Defense => "defense",
            BaseField::SpAttack => "spAttack",
            BaseField::SpDefense => "spDefense",
            BaseField::Speed => "speed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BaseField::Id => "ID",
            BaseField::Name => "Name",
            BaseField::Url => "Image URL",
            BaseField::Types => "Types",
            BaseField::Hp => "HP",
            BaseField::Attack => "Attack",
            BaseField::Defense => "Defense",
            BaseField::SpAttack => "Sp. Attack",
            BaseField::SpDefense => "Sp. Defense",
            BaseField::Speed => "Speed",
        }
    }

    pub fn field_type(self) -> FieldType {
        if self.is_stat() {
            FieldType::Number
        } else {
            FieldType::Text
        }
    }

    pub fn is_stat(self) -> bool {
        Self::STATS.contains(&self)
    }

    /// Stat name used by the remote catalog's detail payload.
    pub fn catalog_stat_name(self) -> Option<&'static str> {
        match self {
            BaseField::Hp => Some("hp"),
            BaseField::Attack => Some("attack"),
            BaseField::Defense => Some("defense"),
            BaseField::SpAttack => Some("special-attack"),
            BaseField::SpDefense => Some("special-defense"),
            BaseField::Speed => Some("speed"),
            _ => None,
        }
    }
}

impl fmt::Display for BaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for BaseField {
    type Err = LabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        BaseField::ALL
            .into_iter()
            .find(|field| field.key() == trimmed)
            .ok_or_else(|| LabError::UnknownField(value.to_string()))
    }
}

/// One row of a working dataset: the fixed base schema plus user-defined
/// custom fields in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub id: String,
    pub name: String,
    pub types: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_attack: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_defense: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub custom: IndexMap<String, FieldValue>,
}

impl NormalizedRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            types: String::new(),
            hp: None,
            attack: None,
            defense: None,
            sp_attack: None,
            sp_defense: None,
            speed: None,
            url: None,
            custom: IndexMap::new(),
        }
    }

    pub fn stat(&self, field: BaseField) -> Option<i64> {
        match field {
            BaseField::Hp => self.hp,
            BaseField::Attack => self.attack,
            BaseField::Defense => self.defense,
            BaseField::SpAttack => self.sp_attack,
            BaseField::SpDefense => self.sp_defense,
            BaseField::Speed => self.speed,
            _ => None,
        }
    }

    pub fn set_stat(&mut self, field: BaseField, value: Option<i64>) {
        match field {
            BaseField::Hp => self.hp = value,
            BaseField::Attack => self.attack = value,
            BaseField::Defense => self.defense = value,
            BaseField::SpAttack => self.sp_attack = value,
            BaseField::SpDefense => self.sp_defense = value,
            BaseField::Speed => self.speed = value,
            _ => {}
        }
    }

    pub fn base_value(&self, field: BaseField) -> Option<FieldValue> {
        match field {
            BaseField::Id => Some(FieldValue::Text(self.id.clone())),
            BaseField::Name => Some(FieldValue::Text(self.name.clone())),
            BaseField::Types => Some(FieldValue::Text(self.types.clone())),
            BaseField::Url => self.url.clone().map(FieldValue::Text),
            stat => self.stat(stat).map(FieldValue::from),
        }
    }

    /// Looks up a base field by key, then a custom field by id.
    pub fn value(&self, key: &str) -> Option<FieldValue> {
        match key.parse::<BaseField>() {
            Ok(field) => self.base_value(field),
            Err(_) => self.custom.get(key).cloned(),
        }
    }

    /// Writes a base field. Stats are stored as whole numbers; text fields
    /// take the value's string form.
    pub fn set_base(&mut self, field: BaseField, value: &FieldValue) -> Result<(), LabError> {
        match field {
            BaseField::Id => return Err(LabError::ImmutableField(field.key().to_string())),
            BaseField::Name => self.name = value.to_string(),
            BaseField::Types => self.types = value.to_string(),
            BaseField::Url => self.url = Some(value.to_string()),
            stat => {
                let number = value.as_f64().ok_or_else(|| LabError::InvalidValue {
                    field: stat.key().to_string(),
                    value: value.to_string(),
                })?;
                self.set_stat(stat, Some(number.trunc() as i64));
            }
        }
        Ok(())
    }

    pub fn numeric_id(&self) -> Option<f64> {
        self.id.trim().parse::<f64>().ok().filter(|id| id.is_finite())
    }
}

/// A user-defined extra column shared by every record in one dataset scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColumnDef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: FieldType,
    pub default_value: FieldValue,
}

impl CustomColumnDef {
    /// Validates form input and derives the column id and typed default.
    pub fn from_form(
        name: &str,
        column_type: FieldType,
        default_raw: &str,
    ) -> Result<Self, LabError> {
        let trimmed = name.trim();
        let length = trimmed.chars().count();
        if length < 2 {
            return Err(LabError::InvalidColumnName(format!(
                "{name:?} must be at least 2 characters"
            )));
        }
        if length > 50 {
            return Err(LabError::InvalidColumnName(format!(
                "{name:?} must be less than 50 characters"
            )));
        }
        if !COLUMN_NAME.is_match(name) {
            return Err(LabError::InvalidColumnName(format!(
                "{name:?} can only contain letters, numbers, and spaces"
            )));
        }

        Ok(Self {
            id: column_id_for(name),
            name: trimmed.to_string(),
            column_type,
            default_value: parse_default(column_type, default_raw),
        })
    }
}

pub fn column_id_for(name: &str) -> String {
    WHITESPACE_RUN
        .replace_all(&name.to_lowercase(), "_")
        .into_owned()
}

pub fn parse_default(column_type: FieldType, raw: &str) -> FieldValue {
    match column_type {
        FieldType::Number => FieldValue::from(parse_leading_int(raw).unwrap_or(0)),
        FieldType::Boolean => FieldValue::Boolean(raw == "true" || raw == "1"),
        FieldType::Text => FieldValue::Text(raw.to_string()),
    }
}

/// Declares that an uploaded column populates one base field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub uploaded_column: String,
    pub pokemon_field: String,
    pub data_type: FieldType,
}

impl ColumnMapping {
    pub fn new(uploaded_column: impl Into<String>, target: BaseField) -> Self {
        Self {
            uploaded_column: uploaded_column.into(),
            pokemon_field: target.key().to_string(),
            data_type: target.field_type(),
        }
    }

    pub fn target(&self) -> Result<BaseField, LabError> {
        self.pokemon_field
            .parse()
            .map_err(|_| LabError::InvalidMapping(format!("unknown target {}", self.pokemon_field)))
    }
}

impl FromStr for ColumnMapping {
    type Err = LabError;

    /// Parses `COLUMN=FIELD`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (column, field) = value
            .rsplit_once('=')
            .ok_or_else(|| LabError::InvalidMapping(value.to_string()))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(LabError::InvalidMapping(value.to_string()));
        }
        let target = field
            .parse::<BaseField>()
            .map_err(|_| LabError::InvalidMapping(format!("unknown target {}", field.trim())))?;
        Ok(Self::new(column, target))
    }
}
