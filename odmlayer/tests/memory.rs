use odmlayer::{bson::doc, memory::InMemoryStore, prelude::*};
use odmlayer::bson::Bson;
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    name: String,
    age: Option<i64>,
    tags: Option<Vec<String>>,
}

fn user_schema() -> Schema {
    Schema::builder("User")
        .field(Field::string("name").max_length(16))
        .field(Field::integer("age").optional().range(0, 150))
        .field(Field::list("tags").optional())
        .build()
        .unwrap()
}

async fn database() -> Database<InMemoryStore> {
    let backend = InMemoryStore::builder().build().await.unwrap();
    let db = Database::new(
        DatabaseConfig::new("test").safe(SafeMode::from(true)),
        vec![user_schema()],
        backend,
    )
    .unwrap();

    let users = db.model("User").unwrap();
    for (name, age) in [("alice", 40), ("bob", 20), ("alice", 30), ("carol", 25)] {
        users.create(doc! { "name": name, "age": age }).await.unwrap();
    }
    db
}

fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.decode::<User>().unwrap().name)
        .collect()
}

fn ages(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|record| record.decode::<User>().unwrap().age)
        .collect()
}

#[tokio::test]
async fn test_filter_sort_data() {
    let db = database().await;
    let users = db.model("users").unwrap();

    let mut query = users
        .filter(Filter::new().field("name", eq("alice").unwrap()))
        .unwrap()
        .sort(["-age"])
        .unwrap();
    let data = query.data().await.unwrap();

    assert_eq!(ages(data), vec![40, 30]);
    assert!(data.iter().all(|record| !record.is_new()));
}

#[tokio::test]
async fn test_update_with_modifier() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let ack = users
        .filter(Filter::new().field("name", "bob"))
        .unwrap()
        .update(UpdateSpec::new().field("age", inc(1)))
        .await
        .unwrap();
    assert!(ack.acknowledged);
    assert_eq!(ack.n, 1);

    let bob = users.one(Filter::new().field("name", "bob")).await.unwrap();
    assert_eq!(bob.get("age"), Some(&Bson::Int64(21)));
}

#[tokio::test]
async fn test_update_literal_sets_and_list_modifiers() {
    let db = database().await;
    let users = db.model("User").unwrap();

    users
        .filter(Filter::new().field("name", "carol"))
        .unwrap()
        .update(
            UpdateSpec::new()
                .field("name", "caroline")
                .field("tags", push_all(["a", "b", "c"]).unwrap()),
        )
        .await
        .unwrap();
    users
        .filter(Filter::new().field("name", "caroline"))
        .unwrap()
        .update(UpdateSpec::new().field("tags", pull(in_(["b", "c"]).unwrap()).unwrap()))
        .await
        .unwrap();

    let caroline = users
        .one(Filter::new().field("name", "caroline"))
        .await
        .unwrap()
        .decode::<User>()
        .unwrap();
    assert_eq!(caroline.tags, Some(vec!["a".to_string()]));
}

#[tokio::test]
async fn test_slices_translate_to_skip_and_limit() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let mut window = users.all().sort(["age"]).unwrap().slice(1..3).await.unwrap();
    assert_eq!(ages(window.data().await.unwrap()), vec![25, 30]);

    let mut last = users.all().sort(["age"]).unwrap().nth(-1).await.unwrap();
    assert_eq!(ages(last.data().await.unwrap()), vec![40]);

    let mut tail = users.all().sort(["age"]).unwrap().slice(-2..).await.unwrap();
    assert_eq!(ages(tail.data().await.unwrap()), vec![30, 40]);

    let mut empty = users.all().slice(2..2).await.unwrap();
    assert!(empty.is_empty());
    assert!(empty.data().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_subset_projects_fields() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let mut query = users
        .filter(Filter::new().field("name", "bob"))
        .unwrap()
        .subset(["name"])
        .unwrap();
    let rows = query.fetch(CastTarget::Map).await.unwrap();
    let Rows::Maps(rows) = rows else {
        panic!("expected maps");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name").unwrap(), "bob");
    assert_eq!(rows[0].get("age"), Some(&Bson::Null));
    assert_eq!(rows[0].get("_id"), Some(&Bson::Null));
}

#[tokio::test]
async fn test_conditional_filters() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let either = or_([eq("bob").unwrap().bound("name"), gt(35).unwrap().bound("age")]).unwrap();
    let mut query = users.filter(either).unwrap().sort(["age"]).unwrap();
    assert_eq!(ages(query.data().await.unwrap()), vec![20, 40]);

    let mut query = users
        .filter(Filter::new().field("age", gt(20).unwrap()))
        .unwrap()
        .filter(Filter::new().field("age", lt(40).unwrap()))
        .unwrap()
        .sort(["age"])
        .unwrap();
    assert_eq!(ages(query.data().await.unwrap()), vec![25, 30]);

    let mut query = users
        .filter(Filter::new().raw(doc! { "age": { "$mod": [10, 0] } }))
        .unwrap();
    assert_eq!(query.data().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_forbidden_call_order() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let err = users.query().sort(["age"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "\"sort\" method can not be used after \"<none>\" method"
    );

    let err = users.all().limit(1).unwrap().filter(Filter::new()).unwrap_err();
    assert!(matches!(err, OdmError::Query(QueryError::ForbiddenMethod { .. })));
}

#[tokio::test]
async fn test_create_save_remove() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let mut dan = users.new_record(doc! { "name": "dan" }).unwrap();
    assert!(dan.is_new());
    assert!(dan.object_id().is_some());
    dan.save(&db, true).await.unwrap();
    assert!(!dan.is_new());
    assert_eq!(users.count().await.unwrap(), 5);

    dan.set("age", 7).unwrap();
    dan.save(&db, true).await.unwrap();
    let stored = users.one(Filter::new().field("name", "dan")).await.unwrap();
    assert_eq!(stored.get("age"), Some(&Bson::Int64(7)));
    assert_eq!(stored.id(), dan.id());

    let ack = dan.remove(&db).await.unwrap();
    assert_eq!(ack.n, 1);
    assert_eq!(users.count().await.unwrap(), 4);

    let removed = users
        .filter(Filter::new().field("name", "alice"))
        .unwrap()
        .remove()
        .await
        .unwrap();
    assert_eq!(removed.n, 2);
    assert_eq!(users.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_create_validates() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let err = users
        .create(doc! { "name": "a-very-long-user-name" })
        .await
        .unwrap_err();
    assert!(matches!(err, OdmError::Validation(ValidationError::Constraint { .. })));

    let err = users.create(doc! { "name": "x", "email": "x@y" }).await.unwrap_err();
    assert!(matches!(err, OdmError::Initialization(InitializationError::IllegalArgument { .. })));

    assert_eq!(users.count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_one_without_match() {
    let db = database().await;
    let err = db
        .model("User")
        .unwrap()
        .one(Filter::new().field("name", "zed"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Query on \"users\" returned no documents");
}

#[tokio::test]
async fn test_registration_and_lookup() {
    let group = Schema::builder("Group")
        .alias("teams")
        .field(Field::string("title"))
        .build()
        .unwrap();
    let empty = Schema::builder("Empty").build().unwrap();
    let elsewhere = Schema::builder("Log")
        .database("audit")
        .field(Field::string("line"))
        .build()
        .unwrap();

    let db = Database::new(
        DatabaseConfig::default(),
        vec![user_schema(), group, empty, elsewhere],
        InMemoryStore::new(),
    )
    .unwrap();

    assert!(db.model("Group").is_ok());
    assert!(db.model("teams").is_ok());
    assert!(matches!(db.model("Empty"), Err(SchemaError::UnknownSchema { .. })));
    assert!(matches!(db.model("Log"), Err(SchemaError::UnknownSchema { .. })));
    assert!(db.to_string().contains("\"teams\": Group(_id, title)"));

    let clash = Schema::builder("Team")
        .alias("users")
        .field(Field::string("title"))
        .build()
        .unwrap();
    let err = Database::new(
        DatabaseConfig::default(),
        vec![user_schema(), clash],
        InMemoryStore::new(),
    )
    .unwrap_err();
    assert!(matches!(err, OdmError::Schema(SchemaError::CollectionBinding { .. })));
}

#[tokio::test]
async fn test_upsert_through_update() {
    let db = database().await;
    let users = db.model("User").unwrap();

    let ack = users
        .filter(Filter::new().field("name", "erin"))
        .unwrap()
        .update(UpdateSpec::new().field("age", inc(5)).upsert(true).multi(false))
        .await
        .unwrap();
    assert!(ack.upserted.is_some());

    let erin = users.one(Filter::new().field("name", "erin")).await.unwrap();
    assert_eq!(erin.get("age"), Some(&Bson::Int64(5)));
}

#[tokio::test]
async fn test_save_identity_only_record() {
    let tag = Schema::builder("Tag")
        .field(Field::string("label").optional())
        .build()
        .unwrap();
    let db = Database::new(
        DatabaseConfig::new("test").safe(SafeMode::from(true)),
        vec![tag],
        InMemoryStore::new(),
    )
    .unwrap();
    let tags = db.model("tags").unwrap();

    let mut blank = tags.new_record(doc! {}).unwrap();
    blank.save(&db, true).await.unwrap();
    blank.save(&db, true).await.unwrap();
    assert_eq!(tags.count().await.unwrap(), 1);

    let mut first = tags.all().nth(0).await.unwrap();
    let stored = first.next().await.unwrap().unwrap();
    assert_eq!(stored.id(), blank.id());
    assert!(stored.get("label").is_none_or(|label| label == &Bson::Null));
}
