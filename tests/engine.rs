//! End-to-end schema and record operations against in-memory SQLite through the Any driver.

use async_trait::async_trait;
use relational_sdk::config::AbstractType;
use relational_sdk::{
    Action, AppError, Authorizer, CallerContext, CrudService, EngineSettings, EngineState, RecordOutcome,
    RetrieveOptions, SchemaService, TableSchema, Target, WriteOptions,
};
use serde_json::{json, Map, Value};
use sqlx::any::AnyPoolOptions;
use std::sync::Arc;

async fn engine_with(settings: EngineSettings) -> EngineState {
    sqlx::any::install_default_drivers();
    // one connection kept alive for the lifetime of the in-memory database
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open sqlite");
    EngineState::from_pool(pool, settings).await.expect("failed to prepare engine")
}

async fn engine() -> EngineState {
    engine_with(EngineSettings::new("sqlite::memory:")).await
}

fn schema(v: Value) -> TableSchema {
    serde_json::from_value(v).expect("invalid schema json")
}

fn project_schema() -> TableSchema {
    schema(json!({
        "name": "project",
        "field": [
            {"name": "id"},
            {"name": "title", "type": "string", "size": 80, "allow_null": false}
        ]
    }))
}

fn task_schema() -> TableSchema {
    schema(json!({
        "name": "task",
        "label": "Task",
        "field": [
            {"name": "id", "type": "id"},
            {"name": "name", "type": "string", "size": 40, "allow_null": false, "label": "Task Name"},
            {"name": "done", "type": "boolean"},
            {"name": "status", "type": "picklist", "size": 20, "default": "open", "value": ["open", "closed"]},
            {"name": "estimate", "type": "decimal", "precision": 8, "scale": 2},
            {"name": "due", "type": "date"},
            {"name": "project_id", "type": "reference", "ref_table": "project"},
            {"name": "created_date", "type": "datetime"},
            {"name": "created_by_id", "type": "integer"}
        ]
    }))
}

async fn with_tables(state: &EngineState) {
    let out = SchemaService::create_tables(state, &[task_schema(), project_schema()], false, true)
        .await
        .expect("failed to create tables");
    assert!(out.iter().all(RecordOutcome::is_ok));
}

fn rec(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        other => panic!("not an object: {}", other),
    }
}

fn code(o: &RecordOutcome) -> &str {
    o.error().map(|e| e.error.code.as_str()).unwrap_or("ok")
}

async fn seed(state: &EngineState, names: &[&str]) -> Vec<Value> {
    let records = names
        .iter()
        .enumerate()
        .map(|(i, n)| rec(json!({"name": n, "done": i % 2 == 0})))
        .collect();
    CrudService::create(state, &CallerContext::user(7), "task", records, &WriteOptions::default())
        .await
        .expect("failed to seed")
        .into_iter()
        .map(|o| o.value().expect("seed record rejected")["id"].clone())
        .collect()
}

#[tokio::test]
async fn test_schema_round_trip() {
    let state = engine().await;
    with_tables(&state).await;

    let tables = SchemaService::list_tables(&state, None, None).await.unwrap();
    assert_eq!(tables, vec!["project", "task"]);
    let only = SchemaService::list_tables(&state, Some(&["TASK".to_string()][..]), Some(&["task".to_string()][..]))
        .await
        .unwrap();
    assert_eq!(only, vec!["task"]);

    let task = SchemaService::describe_table(&state, "Task").await.unwrap();
    assert_eq!(task.name, "task");
    assert_eq!(task.label, "Task");
    assert_eq!(task.plural, "Tasks");
    assert_eq!(task.primary_key.as_deref(), Some("id"));

    let id = task.field("id").unwrap();
    assert_eq!(id.abstract_type, AbstractType::Id);
    assert!(id.auto_increment && !id.required);

    let name = task.field("name").unwrap();
    assert_eq!(name.abstract_type, AbstractType::String);
    assert_eq!(name.size, Some(40));
    assert_eq!(name.label, "Task Name");
    assert!(name.required);

    let status = task.field("status").unwrap();
    assert_eq!(status.abstract_type, AbstractType::Picklist);
    assert_eq!(status.picklist, vec!["open", "closed"]);
    assert!(!status.required);

    let project_id = task.field("project_id").unwrap();
    assert_eq!(project_id.abstract_type, AbstractType::Reference);
    assert_eq!(project_id.ref_table.as_deref(), Some("project"));

    assert_eq!(task.field("done").unwrap().abstract_type, AbstractType::Boolean);
    assert_eq!(task.field("estimate").unwrap().abstract_type, AbstractType::Decimal);
    assert_eq!(task.field("due").unwrap().abstract_type, AbstractType::Date);

    let children = SchemaService::describe_table_children(&state, "project").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].table, "task");
    assert_eq!(children[0].field, "project_id");

    let both = SchemaService::describe_tables(&state, &["project".into(), "task".into()]).await.unwrap();
    assert_eq!(both[0].name, "project");
    assert_eq!(both[1].name, "task");
}

#[tokio::test]
async fn test_create_table_conflict_and_reserved_names() {
    let state = engine().await;
    SchemaService::create_table(&state, &project_schema()).await.unwrap();
    let err = SchemaService::create_table(&state, &project_schema()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let reserved = schema(json!({"name": "_sys_mine", "field": [{"name": "id"}]}));
    let err = SchemaService::create_table(&state, &reserved).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_create_returns_ids_and_values_round_trip() {
    let state = engine().await;
    with_tables(&state).await;
    let out = CrudService::create(
        &state,
        &CallerContext::user(7),
        "task",
        vec![rec(json!({
            "id": 50,
            "name": "write docs",
            "done": true,
            "estimate": "12.50",
            "due": "2024-05-01",
            "created_by_id": 99
        }))],
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    // auto-increment keys are never taken from input
    assert_eq!(out[0].value().unwrap(), &json!({"id": 1}));

    let set = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        Some(Target::Ids(vec![json!(1)])),
        &RetrieveOptions::default(),
    )
    .await
    .unwrap();
    let row = set.data[0].value().unwrap();
    assert_eq!(row["name"], json!("write docs"));
    assert_eq!(row["done"], json!(true));
    assert_eq!(row["status"], json!("open"));
    assert_eq!(row["estimate"], json!(12.5));
    assert_eq!(row["due"], json!("2024-05-01"));
    assert_eq!(row["created_by_id"], json!(7));
    assert!(row["created_date"].is_string());
    assert!(set.meta.is_none());
}

#[tokio::test]
async fn test_create_with_fields_rereads_rows() {
    let state = engine().await;
    with_tables(&state).await;
    let opts: WriteOptions = serde_json::from_value(json!({"fields": "name,done"})).unwrap();
    let out = CrudService::create(
        &state,
        &CallerContext::anonymous(),
        "task",
        vec![rec(json!({"name": "a", "done": 0}))],
        &opts,
    )
    .await
    .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({"id": 1, "name": "a", "done": false}));

    let err = CrudService::create(
        &state,
        &CallerContext::anonymous(),
        "task",
        vec![rec(json!({"name": "b"}))],
        &WriteOptions { rollback: false, fields: vec!["nope".into()] },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_retrieve_by_ids_keeps_order_and_marks_missing() {
    let state = engine().await;
    with_tables(&state).await;
    seed(&state, &["one", "two", "three"]).await;

    let set = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        Some(Target::ids_from_str("3,99,1")),
        &RetrieveOptions { fields: vec!["name".into()], include_count: true, ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(set.data.len(), 3);
    assert_eq!(set.data[0].value().unwrap(), &json!({"id": 3, "name": "three"}));
    assert_eq!(code(&set.data[1]), "not_found");
    assert_eq!(set.data[2].value().unwrap(), &json!({"id": 1, "name": "one"}));
    assert_eq!(set.meta.unwrap().count, Some(2));
}

#[tokio::test]
async fn test_required_fields_enforced_on_create_only() {
    let state = engine().await;
    with_tables(&state).await;
    let out = CrudService::create(
        &state,
        &CallerContext::anonymous(),
        "task",
        vec![rec(json!({"name": "ok"})), rec(json!({"done": true})), rec(json!({"name": "also ok"}))],
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(code(&out[0]), "ok");
    assert_eq!(code(&out[1]), "validation_error");
    assert_eq!(code(&out[2]), "ok");
    assert_eq!(out[2].value().unwrap(), &json!({"id": 2}));

    let out = CrudService::update(
        &state,
        &CallerContext::anonymous(),
        "task",
        Target::Ids(vec![json!(1)]),
        Some(rec(json!({"done": true}))),
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({"id": 1}));
}

#[tokio::test]
async fn test_rollback_batch_is_atomic() {
    let state = engine().await;
    with_tables(&state).await;
    let err = CrudService::create(
        &state,
        &CallerContext::anonymous(),
        "task",
        vec![rec(json!({"name": "kept?"})), rec(json!({"name": null}))],
        &WriteOptions { rollback: true, fields: vec![] },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let set = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        None,
        &RetrieveOptions { include_count: true, ..Default::default() },
    )
    .await
    .unwrap();
    assert!(set.data.is_empty());
    assert_eq!(set.meta.unwrap().count, Some(0));
}

#[tokio::test]
async fn test_update_by_records_and_missing_ids() {
    let state = engine().await;
    with_tables(&state).await;
    seed(&state, &["one", "two"]).await;

    let out = CrudService::update(
        &state,
        &CallerContext::anonymous(),
        "task",
        Target::Records(vec![
            rec(json!({"ID": 2, "name": "renamed"})),
            rec(json!({"name": "no id"})),
            rec(json!({"id": 42, "name": "ghost"})),
        ]),
        None,
        &WriteOptions { rollback: false, fields: vec!["name".into()] },
    )
    .await
    .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({"id": 2, "name": "renamed"}));
    assert_eq!(code(&out[1]), "validation_error");
    assert_eq!(code(&out[2]), "not_found");

    let err = CrudService::update(
        &state,
        &CallerContext::anonymous(),
        "task",
        Target::Ids(vec![json!(1)]),
        None,
        &WriteOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_update_by_filter() {
    let state = engine().await;
    with_tables(&state).await;
    seed(&state, &["a", "b", "c", "d"]).await;

    let out = CrudService::update(
        &state,
        &CallerContext::anonymous(),
        "task",
        Target::Filter("done = true".into()),
        Some(rec(json!({"status": "closed"}))),
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(out.len(), 2);

    let set = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        Some(Target::Filter("status = 'closed'".into())),
        &RetrieveOptions { fields: vec!["name".into()], ..Default::default() },
    )
    .await
    .unwrap();
    let names: Vec<&Value> = set.data.iter().map(|o| &o.value().unwrap()["name"]).collect();
    assert_eq!(names, vec![&json!("a"), &json!("c")]);
}

#[tokio::test]
async fn test_filtered_retrieve_with_paging_count_and_schema() {
    let state = engine().await;
    with_tables(&state).await;
    seed(&state, &["t1", "t2", "t3", "t4", "t5"]).await;

    let opts: RetrieveOptions = serde_json::from_value(json!({
        "fields": ["name"],
        "order": "name DESC",
        "limit": 2,
        "include_count": true,
        "include_schema": true
    }))
    .unwrap();
    let set = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        Some(Target::Filter("done = true AND NOT name IN ('t9')".into())),
        &opts,
    )
    .await
    .unwrap();
    let names: Vec<&Value> = set.data.iter().map(|o| &o.value().unwrap()["name"]).collect();
    assert_eq!(names, vec![&json!("t5"), &json!("t3")]);
    let meta = set.meta.unwrap();
    assert_eq!(meta.count, Some(3));
    assert_eq!(meta.schema.unwrap().name, "task");

    let page = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        None,
        &RetrieveOptions { limit: Some(2), offset: Some(4), ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].value().unwrap()["name"], json!("t5"));

    let err = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        Some(Target::Filter("missing = 1".into())),
        &RetrieveOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_delete_reads_rows_first_when_fields_requested() {
    let state = engine().await;
    with_tables(&state).await;
    seed(&state, &["one", "two", "three"]).await;

    let out = CrudService::delete(
        &state,
        &CallerContext::anonymous(),
        "task",
        Target::Ids(vec![json!(1), json!(77)]),
        &WriteOptions { rollback: false, fields: vec!["name".into()] },
    )
    .await
    .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({"id": 1, "name": "one"}));
    assert_eq!(code(&out[1]), "not_found");

    let out = CrudService::delete(
        &state,
        &CallerContext::anonymous(),
        "task",
        Target::Filter("name LIKE 't%'".into()),
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(out.len(), 2);

    let set = CrudService::retrieve(&state, &CallerContext::anonymous(), "task", None, &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(set.data.is_empty());
}

#[tokio::test]
async fn test_update_table_adds_columns_only() {
    let state = engine().await;
    with_tables(&state).await;
    let mut def = task_schema();
    def.field.push(serde_json::from_value(json!({"name": "priority", "type": "integer", "label": "Priority"})).unwrap());
    // existing column with a different type is left as it is
    def.field[2] = serde_json::from_value(json!({"name": "done", "type": "string"})).unwrap();
    let desc = SchemaService::update_table(&state, &def).await.unwrap();
    assert_eq!(desc.field("priority").unwrap().abstract_type, AbstractType::Integer);
    assert_eq!(desc.field("done").unwrap().abstract_type, AbstractType::Boolean);

    let err = SchemaService::update_table(&state, &schema(json!({"name": "nothing", "field": []})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_reference_to_missing_table_reported_at_owner() {
    let state = engine().await;
    let orphan = schema(json!({
        "name": "orphan",
        "field": [{"name": "id"}, {"name": "parent_id", "type": "reference", "ref_table": "ghost"}]
    }));
    let out = SchemaService::create_tables(&state, &[project_schema(), orphan.clone()], false, false)
        .await
        .unwrap();
    assert_eq!(code(&out[0]), "ok");
    assert_eq!(code(&out[1]), "validation_error");

    let other = schema(json!({
        "name": "orphan2",
        "field": [{"name": "id"}, {"name": "parent_id", "type": "reference", "ref_table": "ghost"}]
    }));
    let err = SchemaService::create_tables(&state, &[other], false, true).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let tables = SchemaService::list_tables(&state, None, None).await.unwrap();
    assert!(!tables.contains(&"orphan2".to_string()));
}

#[tokio::test]
async fn test_drop_table() {
    let state = engine().await;
    with_tables(&state).await;
    SchemaService::drop_table(&state, "task").await.unwrap();
    assert_eq!(SchemaService::list_tables(&state, None, None).await.unwrap(), vec!["project"]);
    assert!(matches!(
        SchemaService::describe_table(&state, "task").await,
        Err(AppError::NotFound(_))
    ));
    assert!(SchemaService::describe_table_children(&state, "project").await.unwrap().is_empty());
    assert!(matches!(
        SchemaService::drop_table(&state, "_sys_labels").await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_drop_parent_forgets_child_references() {
    let state = engine().await;
    with_tables(&state).await;
    let before = SchemaService::describe_table(&state, "task").await.unwrap();
    assert_eq!(before.field("project_id").unwrap().ref_table.as_deref(), Some("project"));

    SchemaService::drop_table(&state, "project").await.unwrap();
    let after = SchemaService::describe_table(&state, "task").await.unwrap();
    let project_id = after.field("project_id").unwrap();
    assert_eq!(project_id.ref_table, None);
    assert_ne!(project_id.abstract_type, AbstractType::Reference);

    // recreating the parent does not bring the old reference back
    SchemaService::create_table(&state, &project_schema()).await.unwrap();
    assert!(SchemaService::describe_table_children(&state, "project").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_update_checks_existence_only() {
    let state = engine().await;
    let item = schema(json!({
        "name": "item",
        "field": [{"name": "id"}, {"name": "title", "type": "string", "size": 40, "allow_null": false}]
    }));
    SchemaService::create_table(&state, &item).await.unwrap();
    let out = CrudService::create(
        &state,
        &CallerContext::anonymous(),
        "item",
        vec![rec(json!({"title": "first"}))],
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({"id": 1}));

    let out = CrudService::update(
        &state,
        &CallerContext::anonymous(),
        "item",
        Target::Records(vec![rec(json!({"id": 1}))]),
        None,
        &WriteOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({"id": 1}));

    let out = CrudService::update(
        &state,
        &CallerContext::anonymous(),
        "item",
        Target::Ids(vec![json!(1), json!(9)]),
        Some(Map::new()),
        &WriteOptions { rollback: false, fields: vec!["title".into()] },
    )
    .await
    .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({"id": 1, "title": "first"}));
    assert_eq!(code(&out[1]), "not_found");
}

#[tokio::test]
async fn test_keyless_table_create_and_retrieve() {
    let state = engine().await;
    let log = schema(json!({
        "name": "logline",
        "field": [{"name": "msg", "type": "string", "size": 200}, {"name": "level", "type": "integer"}]
    }));
    SchemaService::create_table(&state, &log).await.unwrap();
    let records = vec![rec(json!({"msg": "boot", "level": 1})), rec(json!({"msg": "halt", "level": 3}))];
    let out = CrudService::create(&state, &CallerContext::anonymous(), "logline", records, &WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(out[0].value().unwrap(), &json!({}));

    let all = CrudService::retrieve(&state, &CallerContext::anonymous(), "logline", None, &RetrieveOptions::default())
        .await
        .unwrap();
    assert_eq!(all.data.len(), 2);

    let set = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "logline",
        Some(Target::Filter("level > 2".into())),
        &RetrieveOptions { fields: vec!["msg".into()], include_count: true, ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(set.data.len(), 1);
    assert_eq!(set.data[0].value().unwrap(), &json!({"msg": "halt"}));
    assert_eq!(set.meta.unwrap().count, Some(1));
}

#[tokio::test]
async fn test_retrieve_marks_malformed_ids_missing() {
    let state = engine().await;
    with_tables(&state).await;
    seed(&state, &["one"]).await;

    let set = CrudService::retrieve(
        &state,
        &CallerContext::anonymous(),
        "task",
        Some(Target::ids_from_str("1,abc")),
        &RetrieveOptions { fields: vec!["name".into()], ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(set.data.len(), 2);
    assert_eq!(set.data[0].value().unwrap(), &json!({"id": 1, "name": "one"}));
    assert_eq!(code(&set.data[1]), "not_found");
}

#[tokio::test]
async fn test_table_update_in_open_transaction_is_not_cached() {
    let state = engine().await;
    with_tables(&state).await;
    state.introspector.invalidate_all();

    let mut def = task_schema();
    def.field.push(serde_json::from_value(json!({"name": "priority", "type": "integer"})).unwrap());
    let mut tx = state.pool.begin().await.unwrap();
    relational_sdk::migration::update_table(&mut *tx, &state.introspector, &def).await.unwrap();
    assert!(!state.introspector.is_cached("task"));
    tx.rollback().await.unwrap();

    let desc = SchemaService::describe_table(&state, "task").await.unwrap();
    assert!(desc.field("priority").is_none());
    assert!(state.introspector.is_cached("task"));
}

#[tokio::test]
async fn test_batch_limit() {
    let mut settings = EngineSettings::new("sqlite::memory:");
    settings.max_batch = 2;
    let state = engine_with(settings).await;
    with_tables(&state).await;
    let records = (0..3).map(|i| rec(json!({"name": format!("n{}", i)}))).collect();
    let err = CrudService::create(&state, &CallerContext::anonymous(), "task", records, &WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

struct ReadOnly;

#[async_trait]
impl Authorizer for ReadOnly {
    async fn check(&self, _ctx: &CallerContext, table: &str, action: Action) -> Result<(), AppError> {
        match action {
            Action::Retrieve => Ok(()),
            other => Err(AppError::Permission(format!("{:?} on '{}'", other, table))),
        }
    }
}

#[tokio::test]
async fn test_authorizer_consulted() {
    let state = engine().await.with_authorizer(Arc::new(ReadOnly));
    with_tables(&state).await;
    let err = CrudService::create(
        &state,
        &CallerContext::user(1),
        "task",
        vec![rec(json!({"name": "x"}))],
        &WriteOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
    assert_eq!(err.status_code(), 403);

    let set = CrudService::retrieve(&state, &CallerContext::user(1), "task", None, &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(set.data.is_empty());
}
