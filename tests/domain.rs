use assert_matches::assert_matches;

use pokedex_labs::domain::{
    BaseField, ColumnMapping, CustomColumnDef, DatasetSource, FieldType, FieldValue,
    NormalizedRecord, ProgressState,
};
use pokedex_labs::error::LabError;

#[test]
fn base_field_keys_parse_back() {
    for field in BaseField::ALL {
        assert_eq!(field.key().parse::<BaseField>().unwrap(), field);
    }
    assert_matches!("sp_attack".parse::<BaseField>(), Err(LabError::UnknownField(_)));
    assert_eq!(
        BaseField::SpAttack.catalog_stat_name(),
        Some("special-attack")
    );
    assert_eq!(BaseField::Name.catalog_stat_name(), None);
}

#[test]
fn base_field_types() {
    assert_eq!(BaseField::Hp.field_type(), FieldType::Number);
    assert_eq!(BaseField::Url.field_type(), FieldType::Text);
    assert_eq!(BaseField::STATS.len(), 6);
}

#[test]
fn dataset_source_accepts_aliases() {
    assert_eq!("API".parse::<DatasetSource>().unwrap(), DatasetSource::Api);
    assert_eq!(
        "upload".parse::<DatasetSource>().unwrap(),
        DatasetSource::Uploaded
    );
    assert_matches!(
        "nowhere".parse::<DatasetSource>(),
        Err(LabError::InvalidSource(_))
    );
}

#[test]
fn field_value_text_rendering() {
    assert_eq!(FieldValue::Number(45.0).to_string(), "45");
    assert_eq!(FieldValue::Number(0.5).to_string(), "0.5");
    assert_eq!(FieldValue::Boolean(true).to_string(), "true");
    assert_eq!(
        FieldValue::Number(45.0).coerce(FieldType::Text),
        FieldValue::from("45")
    );
}

#[test]
fn record_serializes_camel_case_and_flattens_custom() {
    let mut record = NormalizedRecord::new("6", "charizard");
    record.sp_attack = Some(109);
    record
        .custom
        .insert("tier".to_string(), FieldValue::from("S"));

    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["spAttack"], 109);
    assert_eq!(json["tier"], "S");
    assert!(json.get("hp").is_none());
    let back: NormalizedRecord = serde_json::from_value(json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn set_base_truncates_stats_and_protects_id() {
    let mut record = NormalizedRecord::new("6", "charizard");

    record
        .set_base(BaseField::Speed, &FieldValue::Number(100.7))
        .unwrap();
    assert_eq!(record.speed, Some(100));

    assert_matches!(
        record.set_base(BaseField::Speed, &FieldValue::from("fast")),
        Err(LabError::InvalidValue { .. })
    );
    assert_matches!(
        record.set_base(BaseField::Id, &FieldValue::from("7")),
        Err(LabError::ImmutableField(_))
    );
}

#[test]
fn value_reads_base_then_custom() {
    let mut record = NormalizedRecord::new("6", "charizard");
    record.hp = Some(78);
    record
        .custom
        .insert("shiny".to_string(), FieldValue::Boolean(false));

    assert_eq!(record.value("hp"), Some(FieldValue::Number(78.0)));
    assert_eq!(record.value("attack"), None);
    assert_eq!(record.value("shiny"), Some(FieldValue::Boolean(false)));
    assert_eq!(record.value("missing"), None);
}

#[test]
fn column_form_validation() {
    assert_matches!(
        CustomColumnDef::from_form("a", FieldType::Text, ""),
        Err(LabError::InvalidColumnName(_))
    );
    assert_matches!(
        CustomColumnDef::from_form(&"x".repeat(51), FieldType::Text, ""),
        Err(LabError::InvalidColumnName(_))
    );
    let column = CustomColumnDef::from_form("Evolves At", FieldType::Number, "16th").unwrap();
    assert_eq!(column.id, "evolves_at");
    assert_eq!(column.default_value, FieldValue::Number(16.0));

    let column = CustomColumnDef::from_form("Shiny", FieldType::Boolean, "1").unwrap();
    assert_eq!(column.default_value, FieldValue::Boolean(true));
    let column = CustomColumnDef::from_form("Shiny", FieldType::Boolean, "yes").unwrap();
    assert_eq!(column.default_value, FieldValue::Boolean(false));
}

#[test]
fn column_definition_serializes_type_key() {
    let column = CustomColumnDef::from_form("Tier", FieldType::Text, "A").unwrap();
    let json = serde_json::to_value(&column).unwrap();
    assert_eq!(json["type"], "text");
    assert_eq!(json["defaultValue"], "A");
}

#[test]
fn mapping_specifier_errors() {
    assert_matches!(
        "Name".parse::<ColumnMapping>(),
        Err(LabError::InvalidMapping(_))
    );
    assert_matches!(
        "=name".parse::<ColumnMapping>(),
        Err(LabError::InvalidMapping(_))
    );
    assert_matches!(
        "Name=nickname".parse::<ColumnMapping>(),
        Err(LabError::InvalidMapping(_))
    );
    let mapping: ColumnMapping = "a=b=speed".parse().unwrap();
    assert_eq!(mapping.uploaded_column, "a=b");
    assert_eq!(mapping.target().unwrap(), BaseField::Speed);
}

#[test]
fn progress_percent() {
    let progress = ProgressState {
        fetched: 25,
        total: 100,
        ..ProgressState::default()
    };
    assert_eq!(progress.percent(), 25.0);
    assert_eq!(ProgressState::default().percent(), 0.0);
}
