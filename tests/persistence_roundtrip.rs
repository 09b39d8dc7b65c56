use indexmap::indexmap;
use shelfdb::{Database, Error, Field, FieldType, Order, Query, Value, WalOp};
use tempfile::TempDir;

fn user_fields() -> Vec<Field> {
    vec![
        Field::new("id", FieldType::Integer).primary_key(true),
        Field::new("email", FieldType::Text).nullable(false).unique(true),
        Field::new("age", FieldType::Integer),
    ]
}

#[test]
fn test_save_load_round_trip() {
    let dir = TempDir::new().unwrap();

    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();
    for (email, age) in [("a@x.com", 30), ("b@x.com", 25), ("c@x.com", 41)] {
        db.insert(
            "users",
            indexmap! {
                "email".to_string() => Value::from(email),
                "age".to_string() => Value::Integer(age),
            },
        )
        .unwrap();
    }
    let before = db.select("users", &Query::new()).unwrap();
    assert_eq!(db.save().unwrap(), 1);

    let mut restored = Database::persistent("school", dir.path());
    assert_eq!(restored.load().unwrap(), 1);

    let after = restored.select("users", &Query::new()).unwrap();
    assert_eq!(after, before);
    assert_eq!(restored.count("users").unwrap(), 3);

    // The id counter resumes past the highest stored key.
    let record = restored
        .insert("users", indexmap! {"email".to_string() => Value::from("d@x.com")})
        .unwrap();
    assert_eq!(record.get("id"), Some(&Value::Integer(4)));
}

#[test]
fn test_load_from_missing_root_fails() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("neverwritten", dir.path());
    assert!(matches!(db.load(), Err(Error::StorageRootNotFound(_))));
}

#[test]
fn test_wal_records_the_session_in_order() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());

    db.create_table("users", user_fields()).unwrap();
    db.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")})
        .unwrap();
    db.update(
        "users",
        |r| r.get("email") == Some(&Value::from("a@x.com")),
        &indexmap! {"age".to_string() => Value::Integer(30)},
    )
    .unwrap();
    db.delete("users", |_| true).unwrap();

    let replay = db.replay_wal().unwrap();
    assert!(replay.malformed.is_empty());
    let ops: Vec<WalOp> = replay.entries.iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![WalOp::CreateTable, WalOp::Insert, WalOp::Update, WalOp::Delete]
    );

    // Update entries carry both images; delete entries only the old one.
    let update = &replay.entries[2];
    assert_eq!(
        update.old_record.as_ref().unwrap().get("age"),
        Some(&Value::Null)
    );
    assert_eq!(
        update.record.as_ref().unwrap().get("age"),
        Some(&Value::Integer(30))
    );
    let delete = &replay.entries[3];
    assert!(delete.record.is_none());
    assert!(delete.old_record.is_some());
}

#[test]
fn test_checkpoint_empties_replay() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();
    db.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")})
        .unwrap();

    db.checkpoint().unwrap();

    let replay = db.replay_wal().unwrap();
    assert!(replay.entries.is_empty());
    assert!(replay.malformed.is_empty());

    // The checkpoint saved the tables, so a fresh load sees the data.
    let mut restored = Database::persistent("school", dir.path());
    restored.load().unwrap();
    assert_eq!(restored.count("users").unwrap(), 1);
}

#[test]
fn test_save_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();
    db.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")})
        .unwrap();

    let records_file = dir.path().join("school").join("data").join("users.records");

    db.save().unwrap();
    let first = std::fs::read(&records_file).unwrap();
    db.save().unwrap();
    let second = std::fs::read(&records_file).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unique_scenario_survives_reload() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();

    let record = db
        .insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")})
        .unwrap();
    assert_eq!(record.get("id"), Some(&Value::Integer(1)));

    let result = db.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")});
    assert!(matches!(result, Err(Error::UniqueViolation(_))));
    assert_eq!(db.count("users").unwrap(), 1);

    db.save().unwrap();
    let mut restored = Database::persistent("school", dir.path());
    restored.load().unwrap();

    // The constraint still holds against reloaded records.
    let result =
        restored.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")});
    assert!(matches!(result, Err(Error::UniqueViolation(_))));
}

#[test]
fn test_select_ordering_after_reload() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();
    for (email, age) in [("a@x.com", 30), ("b@x.com", 20), ("c@x.com", 30)] {
        db.insert(
            "users",
            indexmap! {
                "email".to_string() => Value::from(email),
                "age".to_string() => Value::Integer(age),
            },
        )
        .unwrap();
    }
    db.save().unwrap();

    let mut restored = Database::persistent("school", dir.path());
    restored.load().unwrap();

    let results = restored
        .select("users", &Query::new().order_by("age", Order::Descending))
        .unwrap();
    let emails: Vec<_> = results
        .iter()
        .map(|r| r.get("email").unwrap().as_text().unwrap().to_string())
        .collect();
    // Descending by age, ties in insertion order.
    assert_eq!(emails, vec!["a@x.com", "c@x.com", "b@x.com"]);
}

#[test]
fn test_export_table_document() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();
    db.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")})
        .unwrap();

    let export_path = dir.path().join("users_export.json");
    db.export_table("users", &export_path).unwrap();

    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(document["table"], "users");
    assert_eq!(document["count"], 1);
    assert_eq!(document["records"][0]["email"], "a@x.com");
    assert!(document["exported_at"].is_string());
}

#[test]
fn test_stats_reflect_disk_after_save() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();
    db.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")})
        .unwrap();
    db.save().unwrap();

    let stats = db.get_stats().unwrap();
    assert!(stats.persistent);
    assert_eq!(stats.tables["users"].records, 1);
    let disk = stats.disk.unwrap();
    assert_eq!(disk.tables["users"].records, 1);
    assert!(disk.tables["users"].size_bytes > 0);
    // CREATE_TABLE + INSERT were logged as they happened.
    assert_eq!(disk.wal_entries, 2);
}

#[test]
fn test_drop_table_removes_files_and_logs() {
    let dir = TempDir::new().unwrap();
    let mut db = Database::persistent("school", dir.path());
    db.create_table("users", user_fields()).unwrap();
    db.insert("users", indexmap! {"email".to_string() => Value::from("a@x.com")})
        .unwrap();
    db.save().unwrap();

    db.drop_table("users").unwrap();
    assert!(db.list_tables().is_empty());

    let replay = db.replay_wal().unwrap();
    assert_eq!(replay.entries.last().unwrap().operation, WalOp::DropTable);

    // A reload finds no tables.
    let mut restored = Database::persistent("school", dir.path());
    assert_eq!(restored.load().unwrap(), 0);
}
