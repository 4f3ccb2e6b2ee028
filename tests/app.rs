use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use pokedex_labs::app::{App, ProgressEvent, ProgressSink};
use pokedex_labs::catalog::{
    CatalogClient, CatalogPage, DetailPayload, NamedResource, StatSlot, TypeSlot,
};
use pokedex_labs::domain::{
    BaseField, CatalogItemRef, ColumnMapping, DatasetSource, FieldType, FieldValue,
};
use pokedex_labs::error::LabError;
use pokedex_labs::grid::GridQuery;
use pokedex_labs::pipeline::PipelineOptions;
use pokedex_labs::state::AppState;
use pokedex_labs::store::Store;

const NAMES: [&str; 3] = ["bulbasaur", "ivysaur", "venusaur"];

#[derive(Default)]
struct MockCatalog {
    fail_listing: bool,
}

impl CatalogClient for MockCatalog {
    fn list(&self, limit: usize, offset: usize) -> Result<CatalogPage, LabError> {
        if self.fail_listing {
            return Err(LabError::CatalogHttp("offline".to_string()));
        }
        let results = NAMES
            .iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(index, name)| CatalogItemRef {
                name: name.to_string(),
                url: format!("https://catalog.test/pokemon/{}/", index + 1),
            })
            .collect();
        Ok(CatalogPage {
            results,
            count: Some(NAMES.len()),
        })
    }

    fn detail(&self, identifier: &str) -> Result<DetailPayload, LabError> {
        let index = NAMES
            .iter()
            .position(|name| *name == identifier)
            .ok_or_else(|| LabError::CatalogStatus {
                status: 404,
                message: identifier.to_string(),
            })?;
        let stat = |name: &str, base_stat: i64| StatSlot {
            base_stat,
            effort: None,
            stat: NamedResource {
                name: name.to_string(),
                url: None,
            },
        };
        Ok(DetailPayload {
            id: index as u64 + 1,
            name: identifier.to_string(),
            types: vec![TypeSlot {
                slot: Some(1),
                kind: NamedResource {
                    name: "grass".to_string(),
                    url: None,
                },
            }],
            stats: vec![
                stat("hp", 45 + index as i64 * 15),
                stat("attack", 49),
                stat("defense", 49),
                stat("special-attack", 65),
                stat("special-defense", 65),
                stat("speed", 45),
            ],
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn options() -> PipelineOptions {
    PipelineOptions {
        page_size: 2,
        detail_group_size: 2,
        delay: Duration::ZERO,
        fallback_total: 10,
    }
}

fn store_in(temp: &tempfile::TempDir) -> Store {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    Store::open(root).unwrap()
}

fn fetched_app(temp: &tempfile::TempDir) -> App<MockCatalog> {
    let mut app = App::new(
        AppState::new(store_in(temp)),
        MockCatalog::default(),
        options(),
    );
    app.fetch(&RecordingSink::default()).unwrap();
    app
}

#[test]
fn fetch_fills_catalog_scope_and_persists() {
    let temp = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let mut app = App::new(
        AppState::new(store_in(&temp)),
        MockCatalog::default(),
        options(),
    );

    let result = app.fetch(&sink).unwrap();

    assert_eq!(result.listed, 3);
    assert_eq!(result.fetched, 3);
    assert!(result.failed.is_empty());
    assert_eq!(result.persist_failures, 0);
    assert!(!app.state().is_loading());
    assert!(app.state().progress().unwrap().is_complete);
    assert!(app.state().records(DatasetSource::Uploaded).is_empty());

    let persisted = store_in(&temp)
        .records(DatasetSource::Api)
        .get_all()
        .unwrap();
    assert_eq!(persisted.len(), 3);
    assert!(
        sink.events
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, ProgressEvent::Listing { .. }))
    );
}

#[test]
fn failed_listing_keeps_previous_data() {
    let temp = tempfile::tempdir().unwrap();
    let state = fetched_app(&temp).into_state();
    let mut app = App::new(
        state,
        MockCatalog {
            fail_listing: true,
        },
        options(),
    );

    let err = app.fetch(&RecordingSink::default()).unwrap_err();

    assert_matches!(err, LabError::CatalogHttp(_));
    assert!(!app.state().is_loading());
    assert_eq!(app.state().records(DatasetSource::Api).len(), 3);
}

#[test]
fn reopening_adopts_persisted_records() {
    let temp = tempfile::tempdir().unwrap();
    drop(fetched_app(&temp));

    let (app, summary) = App::open(
        AppState::new(store_in(&temp)),
        MockCatalog::default(),
        options(),
    );

    assert_eq!(summary.catalog_records, 3);
    assert_eq!(app.state().records(DatasetSource::Api)[0].name, "bulbasaur");
}

#[test]
fn view_sorts_and_pages() {
    let temp = tempfile::tempdir().unwrap();
    let app = fetched_app(&temp);
    let query = GridQuery {
        sort: Some("hp:desc".parse().unwrap()),
        page_size: 10,
        ..GridQuery::default()
    };

    let page = app.view(DatasetSource::Api, &query);

    assert_eq!(page.total_rows, 3);
    assert_eq!(page.rows[0].name, "venusaur");
}

#[test]
fn edit_updates_stat_and_rejects_bad_input() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = fetched_app(&temp);

    let updated = app.edit(DatasetSource::Api, "1", "hp", "99").unwrap();
    assert_eq!(updated.hp, Some(99));

    let err = app.edit(DatasetSource::Api, "1", "hp", "lots").unwrap_err();
    assert_matches!(err, LabError::InvalidValue { .. });
    assert_eq!(app.state().record(DatasetSource::Api, "1").unwrap().hp, Some(99));

    assert_matches!(
        app.edit(DatasetSource::Api, "1", "nickname", "x"),
        Err(LabError::UnknownField(_))
    );
    assert_matches!(
        app.edit(DatasetSource::Api, "404", "hp", "1"),
        Err(LabError::RecordNotFound(_))
    );

    let persisted = store_in(&temp)
        .records(DatasetSource::Api)
        .get("1")
        .unwrap()
        .unwrap();
    assert_eq!(persisted.hp, Some(99));
}

#[test]
fn url_can_be_edited_before_any_record_has_one() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = fetched_app(&temp);

    let updated = app
        .edit(DatasetSource::Api, "2", "url", "https://img.test/2.png")
        .unwrap();

    assert_eq!(updated.url.as_deref(), Some("https://img.test/2.png"));
}

#[test]
fn custom_columns_are_added_edited_and_removed() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = fetched_app(&temp);

    let column = app
        .add_column(DatasetSource::Api, "Is Starter", FieldType::Boolean, "false")
        .unwrap();
    assert_eq!(column.id, "is_starter");
    assert_eq!(
        app.state().record(DatasetSource::Api, "3").unwrap().custom["is_starter"],
        FieldValue::Boolean(false)
    );

    let updated = app
        .edit(DatasetSource::Api, "1", "is_starter", "toggle")
        .unwrap();
    assert_eq!(updated.custom["is_starter"], FieldValue::Boolean(true));

    let list = app.remove_column(DatasetSource::Api, "is_starter").unwrap();
    assert!(list.columns.is_empty());
    assert!(
        !app.state().record(DatasetSource::Api, "1")
            .unwrap()
            .custom
            .contains_key("is_starter")
    );
}

#[test]
fn upload_then_map_builds_uploaded_scope() {
    let temp = tempfile::tempdir().unwrap();
    let csv = temp.path().join("party.csv");
    fs::write(&csv, "Nick,Power,Colour\nSparky,35,yellow\nFluff,55,brown\n").unwrap();
    let mut app = fetched_app(&temp);

    let result = app
        .upload(&csv, Vec::new(), &RecordingSink::default())
        .unwrap();
    assert_eq!(result.file_name.as_deref(), Some("party.csv"));
    assert_eq!(result.rows, 2);
    assert!(result.mapped.is_none());
    assert!(app.state().records(DatasetSource::Uploaded).is_empty());

    let mapped = app
        .map(vec![
            ColumnMapping::new("Nick", BaseField::Name),
            ColumnMapping::new("Power", BaseField::Hp),
        ])
        .unwrap();

    assert_eq!(mapped.records, 2);
    assert!(mapped.unmapped_columns.contains(&"Colour".to_string()));
    let records = app.state().records(DatasetSource::Uploaded);
    assert_eq!(records[0].name, "Sparky");
    assert_eq!(records[0].hp, Some(35));
    assert_eq!(app.state().records(DatasetSource::Api).len(), 3);
}

#[test]
fn rejected_upload_records_error_and_keeps_data() {
    let temp = tempfile::tempdir().unwrap();
    let csv = temp.path().join("empty.csv");
    fs::write(&csv, "Nick,Power\n").unwrap();
    let mut app = fetched_app(&temp);

    let err = app
        .upload(&csv, Vec::new(), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, LabError::UploadEmpty);
    let status = app.state().upload_status();
    assert!(!status.is_uploading);
    assert!(status.error.is_some());
    assert_eq!(app.state().records(DatasetSource::Api).len(), 3);
}

#[test]
fn export_writes_sorted_csv() {
    let temp = tempfile::tempdir().unwrap();
    let app = fetched_app(&temp);
    let out = temp.path().join("dex.csv");

    let result = app.export(DatasetSource::Api, Some(out.clone())).unwrap();

    assert_eq!(result.rows, 3);
    let text = fs::read_to_string(&out).unwrap();
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(
        lines[0],
        "id,name,types,hp,attack,defense,spAttack,spDefense,speed"
    );
    assert_eq!(lines[1], "1,bulbasaur,grass,45,49,49,65,65,45");
    assert_eq!(lines.len(), 4);
}

#[test]
fn export_of_empty_scope_is_refused() {
    let temp = tempfile::tempdir().unwrap();
    let app = fetched_app(&temp);

    let err = app
        .export(DatasetSource::Uploaded, Some(temp.path().join("none.csv")))
        .unwrap_err();

    assert_matches!(err, LabError::EmptyDataset(_));
    assert!(!temp.path().join("none.csv").exists());
}

#[test]
fn clear_empties_one_scope_in_memory_and_store() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = fetched_app(&temp);

    let result = app.clear(DatasetSource::Api, &RecordingSink::default());

    assert!(result.cleared);
    assert!(app.state().records(DatasetSource::Api).is_empty());
    assert!(
        store_in(&temp)
            .records(DatasetSource::Api)
            .get_all()
            .unwrap()
            .is_empty()
    );
}
