use std::fs::File;
use std::io::Write;

use assert_matches::assert_matches;

use pokedex_labs::domain::{BaseField, ColumnMapping, FieldType, FieldValue};
use pokedex_labs::error::LabError;
use pokedex_labs::upload::{
    MAX_UPLOAD_BYTES, apply_mappings, map_row, parse_csv, read_upload, row_columns,
    validate_mappings,
};

const PARTY: &str = "\
Name,HP,Type,Shiny
Pikachu,35,electric,true
Eevee,55,normal,false
";

#[test]
fn header_row_names_fields_and_ids_are_synthesized() {
    let parsed = parse_csv(PARTY.as_bytes()).unwrap();

    assert_eq!(parsed.columns, vec!["Name", "HP", "Type", "Shiny"]);
    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.rows[0].id, "uploaded_0");
    assert_eq!(parsed.rows[1].id, "uploaded_1");
    assert_eq!(parsed.rows[0].get("Name"), Some(FieldValue::from("Pikachu")));
    assert_eq!(parsed.rows[0].get("HP"), Some(FieldValue::Number(35.0)));
    assert_eq!(parsed.rows[0].get("Shiny"), Some(FieldValue::from("true")));
}

#[test]
fn own_id_column_is_kept() {
    let parsed = parse_csv("id,Name\n25,Pikachu\n133,Eevee\n".as_bytes()).unwrap();

    assert_eq!(parsed.rows[0].id, "25");
    assert_eq!(parsed.rows[1].id, "133");
    assert!(!parsed.rows[0].fields.contains_key("id"));
}

#[test]
fn blank_and_duplicate_ids_fall_back_to_index() {
    let parsed = parse_csv("id,Name\n7,A\n,B\n7,C\n".as_bytes()).unwrap();

    let ids = parsed
        .rows
        .iter()
        .map(|row| row.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["7", "uploaded_1", "uploaded_2"]);
}

#[test]
fn empty_lines_are_skipped_and_empty_cells_left_out() {
    let parsed = parse_csv("Name,HP\nMew,\n\n,\nMewtwo,106\n".as_bytes()).unwrap();

    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.rows[0].get("HP"), None);
    assert_eq!(parsed.rows[1].get("HP"), Some(FieldValue::Number(106.0)));
}

#[test]
fn header_only_file_is_empty() {
    let err = parse_csv("Name,HP\n".as_bytes()).unwrap_err();
    assert_matches!(err, LabError::UploadEmpty);
}

#[test]
fn oversized_file_is_rejected_before_parsing() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("huge.csv");
    let file = File::create(&path).unwrap();
    file.set_len(150 * 1024 * 1024).unwrap();

    let err = read_upload(&path).unwrap_err();

    assert_matches!(err, LabError::UploadTooLarge { size, limit } => {
        assert_eq!(size, 150 * 1024 * 1024);
        assert_eq!(limit, MAX_UPLOAD_BYTES);
    });
}

#[test]
fn read_upload_records_file_name_and_tab_delimiter() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("party.tsv");
    let mut file = File::create(&path).unwrap();
    file.write_all(b"Name\tHP\nPikachu\t35\n").unwrap();

    let parsed = read_upload(&path).unwrap();

    assert_eq!(parsed.file_name.as_deref(), Some("party.tsv"));
    assert_eq!(parsed.rows[0].get("HP"), Some(FieldValue::Number(35.0)));
}

#[test]
fn missing_file_is_a_filesystem_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = read_upload(&temp.path().join("absent.csv")).unwrap_err();
    assert_matches!(err, LabError::Filesystem(_));
}

#[test]
fn text_number_is_coerced_by_mapping() {
    let parsed = parse_csv("Name,hp\nBulbasaur,\"45\"\n".as_bytes()).unwrap();
    let mappings = vec![
        ColumnMapping::new("Name", BaseField::Name),
        ColumnMapping::new("hp", BaseField::Hp),
    ];

    let records = apply_mappings(&parsed.rows, &mappings).unwrap();

    assert_eq!(records[0].hp, Some(45));
    assert_eq!(records[0].name, "Bulbasaur");
}

#[test]
fn mapped_row_coerces_each_target_type() {
    let parsed = parse_csv("Nick,Power,Kind\nSparky,12abc,electric\n".as_bytes()).unwrap();
    let mappings = vec![
        ColumnMapping::new("Nick", BaseField::Name),
        ColumnMapping::new("Power", BaseField::Attack),
        ColumnMapping::new("Kind", BaseField::Types),
    ];

    let mapped = map_row(&parsed.rows[0], &mappings);

    assert_eq!(mapped.get("id"), Some(&FieldValue::from("uploaded_0")));
    assert_eq!(mapped.get("name"), Some(&FieldValue::from("Sparky")));
    assert_eq!(mapped.get("attack"), Some(&FieldValue::Number(12.0)));
    assert_eq!(mapped.get("types"), Some(&FieldValue::from("electric")));
}

#[test]
fn boolean_coercion_accepts_true_and_one() {
    assert_eq!(
        FieldValue::from("1").coerce(FieldType::Boolean),
        FieldValue::Boolean(true)
    );
    assert_eq!(
        FieldValue::Number(1.0).coerce(FieldType::Boolean),
        FieldValue::Boolean(true)
    );
    assert_eq!(
        FieldValue::from("yes").coerce(FieldType::Boolean),
        FieldValue::Boolean(false)
    );
}

#[test]
fn unmapped_fields_stay_absent_or_empty() {
    let parsed = parse_csv("Name\nDitto\n".as_bytes()).unwrap();

    let records =
        apply_mappings(&parsed.rows, &[ColumnMapping::new("Name", BaseField::Name)]).unwrap();

    assert_eq!(records[0].id, "uploaded_0");
    assert_eq!(records[0].types, "");
    assert_eq!(records[0].hp, None);
    assert_eq!(records[0].url, None);
}

#[test]
fn mapping_the_id_column_overrides_row_id() {
    let parsed = parse_csv("Dex,Name\n132,Ditto\n132,Ditto2\n".as_bytes()).unwrap();
    let mappings = vec![
        ColumnMapping::new("Dex", BaseField::Id),
        ColumnMapping::new("Name", BaseField::Name),
    ];

    let records = apply_mappings(&parsed.rows, &mappings).unwrap();

    assert_eq!(records[0].id, "132");
    assert_eq!(records[1].id, "uploaded_1");
}

#[test]
fn mapping_validation() {
    let parsed = parse_csv(PARTY.as_bytes()).unwrap();
    let columns = row_columns(&parsed.rows);
    assert_eq!(columns[0], "id");

    assert_matches!(
        validate_mappings(&[], &columns),
        Err(LabError::InvalidMapping(_))
    );
    assert_matches!(
        validate_mappings(&[ColumnMapping::new("Nope", BaseField::Name)], &columns),
        Err(LabError::InvalidMapping(_))
    );
    assert_matches!(
        validate_mappings(
            &[
                ColumnMapping::new("Name", BaseField::Name),
                ColumnMapping::new("Type", BaseField::Name),
            ],
            &columns
        ),
        Err(LabError::InvalidMapping(_))
    );
    let bogus = ColumnMapping {
        uploaded_column: "Name".to_string(),
        pokemon_field: "nickname".to_string(),
        data_type: FieldType::Text,
    };
    assert_matches!(
        validate_mappings(&[bogus], &columns),
        Err(LabError::InvalidMapping(_))
    );
    assert!(
        validate_mappings(
            &[
                ColumnMapping::new("Name", BaseField::Name),
                ColumnMapping::new("HP", BaseField::Hp),
            ],
            &columns
        )
        .is_ok()
    );
}
