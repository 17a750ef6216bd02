use folio_core::db::open_db_in_memory;
use folio_core::{
    attributes, Condition, DeleteOutcome, EntityKind, FieldValue, ReadOptions, RepoError,
    Repository, SqliteRepository, Upsert, ValidationError,
};
use rusqlite::Connection;

fn repo(conn: &Connection, kind: EntityKind) -> SqliteRepository<'_> {
    SqliteRepository::try_new(conn, kind).unwrap()
}

#[test]
fn created_page_reads_back_with_first_id() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);

    let created = pages.create(attributes! { "name" => "A" }).unwrap();
    assert_eq!(created.id, 1);

    let found = pages.find_by_id(1, &ReadOptions::new()).unwrap();
    assert_eq!(found.id, 1);
    assert_eq!(found.text("name"), Some("A"));
    assert_eq!(found, created);
    assert!(!found.is_trashed());
    assert!(found.created_at > 0);
}

#[test]
fn matching_on_empty_table_returns_empty() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);

    let found = pages
        .list_matching(&Condition::all().eq("status", "active"), &ReadOptions::new())
        .unwrap();
    assert!(found.is_empty());
    assert_eq!(pages.count(&Condition::all()).unwrap(), 0);
    assert!(pages
        .find_first(&Condition::all(), &ReadOptions::new())
        .unwrap()
        .is_none());
}

#[test]
fn deleting_absent_entity_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);
    let page = pages.create(attributes! { "name" => "Gone soon" }).unwrap();

    assert_eq!(pages.delete(&page).unwrap(), DeleteOutcome::Deleted);
    assert_eq!(pages.delete(&page).unwrap(), DeleteOutcome::AlreadyAbsent);

    let mut phantom = page.clone();
    phantom.id = 5;
    assert_eq!(pages.delete(&phantom).unwrap(), DeleteOutcome::AlreadyAbsent);
}

#[test]
fn missing_id_reports_not_found() {
    let conn = open_db_in_memory().unwrap();
    let notes = repo(&conn, EntityKind::NOTES);
    let err = notes.find_by_id(7, &ReadOptions::new()).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { kind: "notes", id: 7 }));
}

#[test]
fn empty_condition_matches_every_live_entity() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);
    let inserted = pages
        .insert(vec![
            attributes! { "name" => "One" },
            attributes! { "name" => "Two" },
            attributes! { "name" => "Three" },
        ])
        .unwrap();
    assert_eq!(inserted, 3);

    assert_eq!(pages.count(&Condition::all()).unwrap(), 3);
    assert_eq!(pages.list_all(&ReadOptions::new()).unwrap().len(), 3);
    assert_eq!(
        pages
            .list_matching(&Condition::all(), &ReadOptions::new())
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn predicates_filter_as_expected() {
    let conn = open_db_in_memory().unwrap();
    let posts = repo(&conn, EntityKind::POSTS);
    posts
        .insert(vec![
            attributes! { "name" => "a", "status" => "published", "order" => 1 },
            attributes! { "name" => "b", "status" => "draft", "order" => 2 },
            attributes! { "name" => "c", "order" => 3 },
        ])
        .unwrap();

    let names = |condition: Condition| -> Vec<String> {
        posts
            .list_matching(&condition, &ReadOptions::new())
            .unwrap()
            .into_iter()
            .filter_map(|post| post.text("name").map(str::to_string))
            .collect()
    };

    assert_eq!(names(Condition::all().eq("status", "draft")), ["b"]);
    assert_eq!(names(Condition::all().not_eq("status", "draft")), ["a", "c"]);
    assert_eq!(names(Condition::all().eq("status", FieldValue::Null)), ["c"]);
    assert_eq!(names(Condition::all().is_in("order", [3, 1])), ["a", "c"]);
    assert!(names(Condition::all().is_in("order", Vec::<i64>::new())).is_empty());
    assert_eq!(
        names(Condition::all().eq("status", "published").eq("order", 1)),
        ["a"]
    );
}

#[test]
fn ordering_limit_and_projection_shape_reads() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);
    pages
        .insert(vec![
            attributes! { "name" => "b", "order" => 2, "body" => "x" },
            attributes! { "name" => "a", "order" => 1, "body" => "y" },
            attributes! { "name" => "c", "order" => 3, "body" => "z" },
        ])
        .unwrap();

    let options = ReadOptions::new()
        .order_by("order", true)
        .limit(2)
        .fields(["name"]);
    let pages = pages.list_all(&options).unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].text("name"), Some("c"));
    assert_eq!(pages[1].text("name"), Some("b"));
    assert!(pages[0].get("body").is_none());
    assert!(pages[0].get("order").is_none());
}

#[test]
fn update_merges_attributes_into_matches_only() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);
    let first = pages.create(attributes! { "name" => "A", "template" => "default" }).unwrap();
    let second = pages.create(attributes! { "name" => "B" }).unwrap();

    let changed = pages
        .update(&Condition::by_id(first.id), attributes! { "name" => "A2" })
        .unwrap();
    assert_eq!(changed, 1);

    let first = pages.find_by_id(first.id, &ReadOptions::new()).unwrap();
    assert_eq!(first.text("name"), Some("A2"));
    assert_eq!(first.text("template"), Some("default"));
    assert_eq!(
        pages.find_by_id(second.id, &ReadOptions::new()).unwrap().text("name"),
        Some("B")
    );

    let none = pages
        .update(&Condition::all().eq("name", "missing"), attributes! { "name" => "x" })
        .unwrap();
    assert_eq!(none, 0);
}

#[test]
fn writes_reject_invalid_attributes() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);

    assert!(matches!(
        pages.create(attributes! { "title" => "no name" }).unwrap_err(),
        RepoError::Validation(ValidationError::MissingField { .. })
    ));
    assert!(matches!(
        pages.create(attributes! { "name" => "x", "id" => 9 }).unwrap_err(),
        RepoError::Validation(ValidationError::ReservedField(_))
    ));
    assert!(matches!(
        pages.create(attributes! { "name" => "x", "bad-key" => 1 }).unwrap_err(),
        RepoError::Validation(ValidationError::InvalidFieldName(_))
    ));
    assert!(matches!(
        pages
            .update(&Condition::all(), attributes! { "name" => FieldValue::Null })
            .unwrap_err(),
        RepoError::Validation(ValidationError::MissingField { .. })
    ));
}

#[test]
fn batch_insert_is_all_or_nothing() {
    let conn = open_db_in_memory().unwrap();
    let languages = repo(&conn, EntityKind::LANGUAGES);

    let err = languages
        .insert(vec![
            attributes! { "lang_code" => "en" },
            attributes! { "lang_code" => "de" },
            attributes! { "lang_code" => "en" },
        ])
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert_eq!(languages.count(&Condition::all()).unwrap(), 0);
}

#[test]
fn unique_fields_reject_duplicates() {
    let conn = open_db_in_memory().unwrap();
    let languages = repo(&conn, EntityKind::LANGUAGES);
    languages.create(attributes! { "lang_code" => "en" }).unwrap();

    assert!(matches!(
        languages.create(attributes! { "lang_code" => "en" }).unwrap_err(),
        RepoError::Validation(ValidationError::Duplicate { .. })
    ));
}

#[test]
fn create_or_update_upserts_by_condition_and_by_entity_id() {
    let conn = open_db_in_memory().unwrap();
    let settings = repo(&conn, EntityKind::SETTINGS);
    let by_key = Condition::all().eq("key", "title");

    let created = settings
        .create_or_update(
            Upsert::Attributes(attributes! { "key" => "title", "value" => "One" }),
            &by_key,
        )
        .unwrap();
    let updated = settings
        .create_or_update(
            Upsert::Attributes(attributes! { "key" => "title", "value" => "Two" }),
            &by_key,
        )
        .unwrap();
    assert_eq!(created.id, updated.id);
    assert_eq!(updated.text("value"), Some("Two"));
    assert_eq!(settings.count(&Condition::all()).unwrap(), 1);

    let mut edited = updated.clone();
    edited
        .attributes
        .insert("value".to_string(), FieldValue::from("Three"));
    let saved = settings
        .create_or_update(Upsert::Entity(edited), &Condition::all())
        .unwrap();
    assert_eq!(saved.id, updated.id);
    assert_eq!(saved.text("value"), Some("Three"));

    let notes = repo(&conn, EntityKind::NOTES);
    let mut imported = notes.create(attributes! { "note" => "seed" }).unwrap();
    notes.delete(&imported).unwrap();
    imported.id = 40;
    let restored = notes
        .create_or_update(Upsert::Entity(imported), &Condition::all())
        .unwrap();
    assert_eq!(restored.id, 40);
}

#[test]
fn first_or_create_returns_existing_match() {
    let conn = open_db_in_memory().unwrap();
    let widgets = repo(&conn, EntityKind::WIDGETS);
    let attrs = attributes! { "widget_id" => "recent_posts", "sidebar_id" => "primary" };

    let first = widgets.first_or_create(attrs.clone()).unwrap();
    let second = widgets.first_or_create(attrs).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(widgets.count(&Condition::all()).unwrap(), 1);
}

#[test]
fn pluck_returns_values_keyed_by_field() {
    let conn = open_db_in_memory().unwrap();
    let languages = repo(&conn, EntityKind::LANGUAGES);
    languages
        .insert(vec![
            attributes! { "lang_code" => "en", "name" => "English" },
            attributes! { "lang_code" => "fr", "name" => "French" },
        ])
        .unwrap();

    let names = languages.pluck("name", Some("lang_code")).unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0].key, Some(FieldValue::from("en")));
    assert_eq!(names[0].value, FieldValue::from("English"));

    let ids = languages.pluck("id", None).unwrap();
    assert_eq!(ids[1].value, FieldValue::Integer(2));
    assert_eq!(ids[1].key, None);
}

#[test]
fn pluck_keeps_booleans_and_missing_fields_apart_from_integers() {
    let conn = open_db_in_memory().unwrap();
    let widgets = repo(&conn, EntityKind::WIDGETS);
    widgets
        .insert(vec![
            attributes! { "widget_id" => "search", "sidebar_id" => "main", "active" => true, "position" => 1 },
            attributes! { "widget_id" => "tags", "sidebar_id" => "main", "active" => false, "position" => 0 },
            attributes! { "widget_id" => "clock", "sidebar_id" => "main" },
        ])
        .unwrap();

    let active = widgets.pluck("active", Some("widget_id")).unwrap();
    let values: Vec<&FieldValue> = active.iter().map(|row| &row.value).collect();
    assert_eq!(
        values,
        [&FieldValue::Bool(true), &FieldValue::Bool(false), &FieldValue::Null]
    );
    assert_eq!(active[0].key, Some(FieldValue::from("search")));

    let positions = widgets.pluck("position", None).unwrap();
    assert_eq!(positions[0].value, FieldValue::Integer(1));
    assert_eq!(positions[1].value, FieldValue::Integer(0));

    // Every read path agrees on the stored type.
    let first = widgets.find_by_id(1, &ReadOptions::new()).unwrap();
    assert_eq!(first.get("active"), Some(&active[0].value));
}

#[test]
fn trash_restore_and_force_delete_follow_soft_delete_rules() {
    let conn = open_db_in_memory().unwrap();
    let pages = repo(&conn, EntityKind::PAGES);
    let page = pages.create(attributes! { "name" => "Draft" }).unwrap();

    assert_eq!(pages.trash_matching(&Condition::by_id(page.id)).unwrap(), 1);
    assert!(matches!(
        pages.find_by_id(page.id, &ReadOptions::new()).unwrap_err(),
        RepoError::NotFound { .. }
    ));
    let trashed = pages
        .find_by_id(page.id, &ReadOptions::new().with_trashed())
        .unwrap();
    assert!(trashed.is_trashed());

    assert_eq!(pages.delete_matching(&Condition::all()).unwrap(), 0);
    assert_eq!(pages.restore_matching(&Condition::all()).unwrap(), 1);
    assert_eq!(pages.count(&Condition::all()).unwrap(), 1);

    pages.trash_matching(&Condition::all()).unwrap();
    assert_eq!(pages.force_delete_matching(&Condition::all()).unwrap(), 1);
    assert!(pages
        .list_all(&ReadOptions::new().with_trashed())
        .unwrap()
        .is_empty());

    let notes = repo(&conn, EntityKind::NOTES);
    assert!(matches!(
        notes.trash_matching(&Condition::all()).unwrap_err(),
        RepoError::Validation(ValidationError::SoftDeletesUnsupported("notes"))
    ));
}

#[test]
fn include_loads_live_related_entities() {
    let conn = open_db_in_memory().unwrap();
    let categories = repo(&conn, EntityKind::CATEGORIES);
    let posts = repo(&conn, EntityKind::POSTS);

    let news = categories.create(attributes! { "name" => "News" }).unwrap();
    let post = posts
        .create(attributes! { "name" => "Launch", "category_id" => news.id })
        .unwrap();
    posts.create(attributes! { "name" => "Orphan" }).unwrap();

    let options = ReadOptions::new().include("category");
    let loaded = posts.find_by_id(post.id, &options).unwrap();
    assert_eq!(
        loaded.related_one("category").and_then(|c| c.text("name")),
        Some("News")
    );

    let all = posts.list_all(&options).unwrap();
    assert!(all[1].related_one("category").is_none());

    categories.trash_matching(&Condition::by_id(news.id)).unwrap();
    let loaded = posts.find_by_id(post.id, &options).unwrap();
    assert!(loaded.related_one("category").is_none());

    assert!(matches!(
        posts
            .find_by_id(post.id, &ReadOptions::new().include("author"))
            .unwrap_err(),
        RepoError::Validation(ValidationError::UnknownRelation { .. })
    ));
}

#[test]
fn corrupt_persisted_attributes_are_reported() {
    let conn = open_db_in_memory().unwrap();
    let notes = repo(&conn, EntityKind::NOTES);
    conn.execute(
        "INSERT INTO notes (attributes, created_at, updated_at) VALUES ('[1, 2]', 1, 1);",
        [],
    )
    .unwrap();

    assert!(matches!(
        notes.list_all(&ReadOptions::new()).unwrap_err(),
        RepoError::InvalidData(_)
    ));
}
