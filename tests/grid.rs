use assert_matches::assert_matches;

use pokedex_labs::domain::{BaseField, CustomColumnDef, FieldType, FieldValue, NormalizedRecord};
use pokedex_labs::error::LabError;
use pokedex_labs::grid::{
    GridColumn, GridQuery, SortDirection, SortKey, grid_columns, parse_cell_edit, query_grid,
};

fn record(id: &str, name: &str, types: &str, hp: Option<i64>) -> NormalizedRecord {
    let mut record = NormalizedRecord::new(id, name);
    record.types = types.to_string();
    record.hp = hp;
    record
}

fn dex() -> Vec<NormalizedRecord> {
    vec![
        record("10", "caterpie", "bug", Some(45)),
        record("2", "ivysaur", "grass / poison", Some(60)),
        record("1", "bulbasaur", "grass / poison", None),
        record("25", "pikachu", "electric", Some(35)),
    ]
}

fn sorted(column: &str, direction: SortDirection) -> GridQuery {
    GridQuery {
        sort: Some(SortKey {
            column: column.to_string(),
            direction,
        }),
        ..GridQuery::default()
    }
}

fn ids(page: &pokedex_labs::grid::GridPage) -> Vec<&str> {
    page.rows.iter().map(|record| record.id.as_str()).collect()
}

#[test]
fn columns_list_base_then_custom() {
    let custom = vec![CustomColumnDef::from_form("Tier", FieldType::Text, "A").unwrap()];
    let columns = grid_columns(&dex(), &custom);

    let keys = columns
        .iter()
        .map(|column| column.key.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        keys,
        vec![
            "id",
            "name",
            "types",
            "hp",
            "attack",
            "defense",
            "spAttack",
            "spDefense",
            "speed",
            "tier"
        ]
    );
    assert!(columns.last().unwrap().custom);
}

#[test]
fn url_column_appears_when_present() {
    let mut records = dex();
    records[0].url = Some("https://img.test/10.png".to_string());

    let columns = grid_columns(&records, &[]);

    assert!(columns.iter().any(|column| column.key == "url"));
}

#[test]
fn search_matches_any_column_case_insensitively() {
    let columns = grid_columns(&dex(), &[]);
    let query = GridQuery {
        search: Some("GRASS".to_string()),
        ..GridQuery::default()
    };

    let page = query_grid(&dex(), &columns, &query);

    assert_eq!(page.total_rows, 2);
    assert_eq!(ids(&page), vec!["2", "1"]);
}

#[test]
fn search_matches_numbers_by_text() {
    let columns = grid_columns(&dex(), &[]);
    let query = GridQuery {
        search: Some("35".to_string()),
        ..GridQuery::default()
    };

    let page = query_grid(&dex(), &columns, &query);

    assert_eq!(ids(&page), vec!["25"]);
}

#[test]
fn id_sorts_numerically() {
    let columns = grid_columns(&dex(), &[]);

    let page = query_grid(&dex(), &columns, &sorted("id", SortDirection::Asc));
    assert_eq!(ids(&page), vec!["1", "2", "10", "25"]);

    let page = query_grid(&dex(), &columns, &sorted("id", SortDirection::Desc));
    assert_eq!(ids(&page), vec!["25", "10", "2", "1"]);
}

#[test]
fn absent_values_sort_last_both_ways() {
    let columns = grid_columns(&dex(), &[]);

    let page = query_grid(&dex(), &columns, &sorted("hp", SortDirection::Asc));
    assert_eq!(ids(&page), vec!["25", "10", "2", "1"]);

    let page = query_grid(&dex(), &columns, &sorted("hp", SortDirection::Desc));
    assert_eq!(ids(&page), vec!["2", "10", "25", "1"]);
}

#[test]
fn text_sorts_case_insensitively() {
    let mut records = dex();
    records[3].name = "Pikachu".to_string();
    let columns = grid_columns(&records, &[]);

    let page = query_grid(&records, &columns, &sorted("name", SortDirection::Asc));

    assert_eq!(ids(&page), vec!["1", "10", "2", "25"]);
}

#[test]
fn pagination_cuts_pages_and_clamps() {
    let records = (1..=60)
        .map(|id| record(&id.to_string(), &format!("mon{id}"), "normal", Some(id)))
        .collect::<Vec<_>>();
    let columns = grid_columns(&records, &[]);

    let page = query_grid(&records, &columns, &GridQuery::default());
    assert_eq!(page.page_size, 25);
    assert_eq!(page.page_count, 3);
    assert_eq!(page.rows.len(), 25);

    let query = GridQuery {
        page: 2,
        ..GridQuery::default()
    };
    let page = query_grid(&records, &columns, &query);
    assert_eq!(page.rows.len(), 10);
    assert_eq!(page.rows[0].id, "51");

    let query = GridQuery {
        page: 9,
        page_size: 50,
        ..GridQuery::default()
    };
    let page = query_grid(&records, &columns, &query);
    assert_eq!(page.page, 1);
    assert_eq!(page.rows.len(), 10);
}

#[test]
fn empty_dataset_has_one_empty_page() {
    let page = query_grid(&[], &grid_columns(&[], &[]), &GridQuery::default());
    assert_eq!(page.total_rows, 0);
    assert_eq!(page.page_count, 1);
    assert!(page.rows.is_empty());
}

#[test]
fn sort_key_round_trips_through_text() {
    let key: SortKey = "spAttack:desc".parse().unwrap();
    assert_eq!(key.to_string(), "spAttack:desc");
    assert_matches!(":asc".parse::<SortKey>(), Err(LabError::InvalidSort(_)));
}

#[test]
fn stat_edit_rules() {
    let hp = GridColumn::base(BaseField::Hp);

    assert_eq!(
        parse_cell_edit(&hp, " 42 ", None).unwrap(),
        FieldValue::Number(42.0)
    );
    assert_eq!(
        parse_cell_edit(&hp, "42.9", None).unwrap(),
        FieldValue::Number(42.0)
    );
    assert_matches!(
        parse_cell_edit(&hp, "abc", None),
        Err(LabError::InvalidValue { .. })
    );
    assert_matches!(
        parse_cell_edit(&hp, "-1", None),
        Err(LabError::InvalidValue { .. })
    );
}

#[test]
fn text_and_id_edit_rules() {
    let name = GridColumn::base(BaseField::Name);
    assert_eq!(
        parse_cell_edit(&name, "  Mew ", None).unwrap(),
        FieldValue::from("Mew")
    );
    assert_matches!(
        parse_cell_edit(&name, "   ", None),
        Err(LabError::InvalidValue { .. })
    );

    let id = GridColumn::base(BaseField::Id);
    assert_matches!(
        parse_cell_edit(&id, "5", None),
        Err(LabError::ImmutableField(_))
    );
}

#[test]
fn boolean_edit_toggles() {
    let column = GridColumn {
        key: "shiny".to_string(),
        label: "Shiny".to_string(),
        field_type: FieldType::Boolean,
        custom: true,
    };

    assert_eq!(
        parse_cell_edit(&column, "toggle", Some(&FieldValue::Boolean(true))).unwrap(),
        FieldValue::Boolean(false)
    );
    assert_eq!(
        parse_cell_edit(&column, "1", None).unwrap(),
        FieldValue::Boolean(true)
    );
    assert_matches!(
        parse_cell_edit(&column, "maybe", None),
        Err(LabError::InvalidValue { .. })
    );
}
