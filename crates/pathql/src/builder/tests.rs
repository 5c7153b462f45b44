use std::sync::Mutex;

use super::*;
use crate::client::{ExecutionProvider, ExecutionRequest};
use crate::error::QueryError;
use crate::metamodel::StaticMetamodel;
use crate::predicate::CmpOp;
use crate::row::Row;
use crate::value::Value;

fn meta() -> StaticMetamodel {
    StaticMetamodel::builder()
        .entity("RecursiveEntity", "id", |t| {
            t.basic("name")
                .optional_to_one("parent", "RecursiveEntity")
                .one_to_many("children", "RecursiveEntity")
        })
        .entity("Person", "id", |t| t.basic("name").optional("age"))
        .entity("Document", "id", |t| {
            t.basic("name")
                .optional("age")
                .optional("idx")
                .many_to_one("owner", "Person")
        })
        .cte("TestCTE", "id", |t| t.basic("name").basic("level"))
        .cte("DeletePersonCTE", "id", |t| t.basic("name"))
        .build()
}

fn factory() -> CriteriaBuilderFactory {
    CriteriaBuilderFactory::new(meta(), DialectCapabilities::postgres())
}

/// Records every request and answers with a fixed row set.
#[derive(Default)]
struct RecordingProvider {
    rows: Vec<Row>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl RecordingProvider {
    fn returning(rows: Vec<Row>) -> Self {
        Self {
            rows,
            requests: Mutex::default(),
        }
    }

    fn texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }
}

impl ExecutionProvider for RecordingProvider {
    async fn query(&self, request: &ExecutionRequest) -> QueryResult<Vec<Row>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.rows.clone())
    }

    async fn execute(&self, request: &ExecutionRequest) -> QueryResult<u64> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.rows.len() as u64)
    }
}

fn hierarchy_query(factory: &CriteriaBuilderFactory) -> QueryResult<CriteriaBuilder> {
    factory
        .create("TestCTE", "t")?
        .with_recursive("TestCTE")?
        .from("RecursiveEntity", "e")?
        .bind("id", "e.id")?
        .bind("name", "e.name")?
        .bind("level", "0")?
        .where_null("e.parent")?
        .union_all()?
        .from("TestCTE", "t")?
        .from("RecursiveEntity", "e")?
        .bind("id", "e.id")?
        .bind("name", "e.name")?
        .bind("level", "t.level + 1")?
        .where_expr("t.id", CmpOp::Eq, "e.parent")?
        .end()?
        .where_expr("t.level", CmpOp::Lt, "2")
}

#[test]
fn recursive_cte_from_builder() -> QueryResult<()> {
    let cb = hierarchy_query(&factory())?;
    assert_eq!(
        cb.query_string()?,
        "WITH RECURSIVE TestCTE(id, name, level) AS(\n\
         SELECT e.id, e.name, 0 FROM RecursiveEntity e WHERE e.parent IS NULL\n\
         UNION ALL\n\
         SELECT e.id, e.name, t.level + 1 FROM TestCTE t, RecursiveEntity e WHERE t.id = e.parent\n\
         )\n\
         SELECT t FROM TestCTE t WHERE t.level < 2"
    );
    Ok(())
}

#[test]
fn recursive_cte_requires_union_all() {
    let err = factory()
        .create("TestCTE", "t")
        .and_then(|cb| cb.with_recursive("TestCTE"))
        .and_then(|cte| cte.from("RecursiveEntity", "e"))
        .and_then(|cte| cte.bind("id", "e.id"))
        .and_then(|cte| cte.bind("name", "e.name"))
        .and_then(|cte| cte.bind("level", "0"))
        .and_then(|cte| cte.end())
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn missing_cte_columns_are_listed() {
    let err = factory()
        .create("TestCTE", "t")
        .and_then(|cb| cb.with("TestCTE"))
        .and_then(|cte| cte.from("RecursiveEntity", "e"))
        .and_then(|cte| cte.bind("id", "e.id"))
        .and_then(|cte| cte.end())
        .unwrap_err();
    match err {
        QueryError::CteColumnMismatch { cte, attributes } => {
            assert_eq!(cte, "TestCTE");
            assert_eq!(attributes, vec!["name".to_string(), "level".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn binding_unknown_attribute_fails_at_the_call() {
    let err = factory()
        .insert("Person")
        .and_then(|ib| ib.from("Person", "p"))
        .and_then(|ib| ib.bind("nickname", "p.name"))
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnknownAttribute { ref attribute, .. } if attribute == "nickname"
    ));
}

#[test]
fn with_requires_a_cte_type() {
    let err = factory()
        .create("Person", "p")
        .and_then(|cb| cb.with("Document"))
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[tokio::test]
async fn result_list_on_insert_is_rejected_before_rendering() -> QueryResult<()> {
    let provider = RecordingProvider::default();
    let insert = factory()
        .insert("Person")?
        .from("Person", "p")?
        .bind("name", "p.name")?;

    let err = insert.result_list::<Row>(&provider).await.unwrap_err();
    assert!(err.is_unsupported_operation());
    assert!(provider.texts().is_empty());

    let select = factory().create("Person", "p")?;
    let err = select.execute_update(&provider).await.unwrap_err();
    assert!(err.is_unsupported_operation());
    assert!(provider.texts().is_empty());
    Ok(())
}

#[tokio::test]
async fn insert_binds_values_as_named_parameters() -> QueryResult<()> {
    let provider = RecordingProvider::returning(vec![Row::from_pairs([("id", Value::Int(7))])]);
    let insert = factory()
        .insert("Person")?
        .from("Person", "p")?
        .bind_value("name", "copy")?
        .bind("age", "p.age")?
        .where_eq("p.name", "original")?;

    assert_eq!(
        insert.query_string()?,
        "INSERT INTO Person(age, name)\nSELECT p.age, :name FROM Person p WHERE p.name = :param_0"
    );
    assert_eq!(insert.execute_update(&provider).await?, 1);

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].params.get("name"), Some(&Value::from("copy")));
    assert_eq!(requests[0].params.get("param_0"), Some(&Value::from("original")));
    Ok(())
}

#[tokio::test]
async fn execute_with_returning_counts_rows() -> QueryResult<()> {
    let provider = RecordingProvider::returning(vec![
        Row::from_pairs([("id", Value::Int(1))]),
        Row::from_pairs([("id", Value::Int(2))]),
    ]);
    let update = factory()
        .update("Person", "p")?
        .set_value("name", "renamed")?
        .where_null("p.age")?;

    let result = update.execute_with_returning::<i64>(&provider, &["id"]).await?;
    assert_eq!(result.update_count, 2);
    assert_eq!(result.last(), Some(&2));
    assert_eq!(
        provider.texts(),
        vec!["UPDATE Person p SET p.name = :name WHERE p.age IS NULL RETURNING id".to_string()]
    );
    Ok(())
}

#[test]
fn update_rejects_ordering() -> QueryResult<()> {
    let update = factory()
        .update("Person", "p")?
        .set("name", "'x'")?
        .order_by_asc("p.name")?;
    assert!(update.query_string().unwrap_err().is_unsupported_operation());
    Ok(())
}

#[test]
fn returning_cte_wraps_delete() -> QueryResult<()> {
    let build = |factory: &CriteriaBuilderFactory| -> QueryResult<CriteriaBuilder> {
        factory
            .create("DeletePersonCTE", "d")?
            .with_returning("DeletePersonCTE")?
            .delete("Person", "p")?
            .where_eq("p.name", "bob")?
            .returning("id", "p.id")?
            .returning("name", "p.name")?
            .end()
    };

    assert_eq!(
        build(&factory())?.query_string()?,
        "WITH DeletePersonCTE(id, name) AS(\n\
         DELETE FROM Person p WHERE p.name = :param_0 RETURNING p.id, p.name\n\
         )\n\
         SELECT d FROM DeletePersonCTE d"
    );

    let h2 = CriteriaBuilderFactory::new(meta(), DialectCapabilities::h2());
    let err = build(&h2)?.query_string().unwrap_err();
    assert!(err.is_unsupported_feature());
    assert!(err.to_string().contains("modification statements inside a CTE"));
    Ok(())
}

#[test]
fn correlated_exists_subquery() -> QueryResult<()> {
    let cb = factory().create("Person", "p")?.where_exists(|sq| {
        sq.from("Document", "d")?
            .select("d.id")?
            .where_expr("d.owner", CmpOp::Eq, "p")
    })?;
    assert_eq!(
        cb.query_string()?,
        "SELECT p FROM Person p WHERE EXISTS (SELECT d.id FROM Document d WHERE d.owner = p)"
    );
    Ok(())
}

#[test]
fn ordering_defaults_come_from_config() -> QueryResult<()> {
    let config = EngineConfig::from_toml_str(
        r#"
        [dialect]
        preset = "postgres"

        [ordering]
        nulls_first = true
        "#,
    )?;
    let factory = CriteriaBuilderFactory::from_config(meta(), &config)?;
    let cb = factory.create("Person", "p")?.order_by_desc("p.age")?;
    assert_eq!(
        cb.query_string()?,
        "SELECT p FROM Person p ORDER BY p.age DESC NULLS FIRST"
    );
    Ok(())
}

#[test]
fn registered_macros_expand_in_place() -> QueryResult<()> {
    let mut factory = factory();
    factory.register_macro("DOUBLE", |args| Ok(format!("({} * 2)", args.join(", "))));
    let cb = factory.create("Person", "p")?.select("DOUBLE(p.age)")?;
    assert_eq!(cb.query_string()?, "SELECT (p.age * 2) FROM Person p");
    Ok(())
}

#[tokio::test]
async fn past_end_page_runs_only_the_count() -> QueryResult<()> {
    let provider = RecordingProvider::returning(vec![Row::from_pairs([("count", Value::Int(0))])]);
    let paged = factory()
        .create("RecursiveEntity", "r")?
        .left_join("r.children", "c")?
        .order_by_asc("r.id")?
        .page(0, 10)?;

    let page = paged.result_list::<Row>(&provider).await?;
    assert!(page.is_empty());
    assert_eq!(page.total_size, 0);
    assert_eq!(provider.texts(), vec![paged.page_count_query_string()?]);
    assert!(paged.page_id_query_string()?.is_some());
    Ok(())
}

#[test]
fn entity_join_condition_joins_render_first() {
    let on = crate::predicate::Predicate::expr("p2.name", CmpOp::Eq, "d.owner.name").unwrap();
    let sql = factory()
        .create("Document", "d")
        .unwrap()
        .join_on("Person", "p2", crate::model::JoinKind::Inner, on)
        .unwrap()
        .query_string()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT d FROM Document d JOIN d.owner person JOIN Person p2 ON p2.name = person.name"
    );
}
