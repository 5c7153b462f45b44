mod common;

use common::{ScriptedProvider, factory};
use pathql::prelude::*;
use pathql::{BoundParameters, CriteriaBuilder, ExecutionRequest};

#[derive(Debug, Clone, PartialEq)]
struct Level {
    id: i64,
    name: String,
    level: i64,
}

impl FromRow for Level {
    fn from_row(row: &Row) -> QueryResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            level: row.try_get("level")?,
        })
    }
}

/// `(id, name, parent)` of a root with two children and one grandchild.
const TREE: [(i64, &str, Option<i64>); 4] = [
    (1, "root", None),
    (2, "child 1", Some(1)),
    (3, "child 2", Some(1)),
    (4, "grandchild", Some(2)),
];

/// Evaluates the hierarchy CTE over `TREE` the way a database would, keeping
/// the rows below the bound `max_level`.
fn evaluate_hierarchy(request: &ExecutionRequest) -> QueryResult<Vec<Row>> {
    let max_level = request
        .params
        .get("max_level")
        .and_then(Value::as_i64)
        .ok_or_else(|| QueryError::execution("max_level is not bound"))?;

    let mut frontier: Vec<(i64, &str, i64)> = TREE
        .iter()
        .filter(|(_, _, parent)| parent.is_none())
        .map(|(id, name, _)| (*id, *name, 0))
        .collect();
    let mut out = Vec::new();
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (id, name, level) in frontier {
            out.push((id, name, level));
            next.extend(
                TREE.iter()
                    .filter(|(_, _, parent)| *parent == Some(id))
                    .map(|(child, name, _)| (*child, *name, level + 1)),
            );
        }
        frontier = next;
    }
    Ok(out
        .into_iter()
        .filter(|(_, _, level)| *level < max_level)
        .map(|(id, name, level)| {
            Row::from_pairs([
                ("id", Value::from(id)),
                ("name", Value::from(name)),
                ("level", Value::from(level)),
            ])
        })
        .collect())
}

fn hierarchy(caps: DialectCapabilities) -> QueryResult<CriteriaBuilder> {
    Ok(factory(caps)
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
        .where_expr("t.level", CmpOp::Lt, ":max_level")?
        .order_by_asc("t.id")?
        .set_parameter("max_level", 2_i64))
}

const HIERARCHY_SQL: &str = "WITH RECURSIVE TestCTE(id, name, level) AS(\n\
    SELECT e.id, e.name, 0 FROM RecursiveEntity e WHERE e.parent IS NULL\n\
    UNION ALL\n\
    SELECT e.id, e.name, t.level + 1 FROM TestCTE t, RecursiveEntity e WHERE t.id = e.parent\n\
    )\n\
    SELECT t FROM TestCTE t WHERE t.level < :max_level ORDER BY t.id ASC NULLS LAST";

#[tokio::test]
async fn recursive_cte_stops_below_level_two() -> QueryResult<()> {
    let provider = ScriptedProvider::new().on(HIERARCHY_SQL, evaluate_hierarchy);

    let query = hierarchy(DialectCapabilities::postgres())?;
    assert_eq!(query.query_string()?, HIERARCHY_SQL);

    let levels = query.result_list::<Level>(&provider).await?;
    assert_eq!(levels.len(), 3);
    assert_eq!(
        levels.iter().map(|l| l.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(levels[0].name, "root");
    assert!(levels.iter().all(|l| l.level < 2));

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, HIERARCHY_SQL);
    assert_eq!(
        requests[0].params,
        BoundParameters::Named(vec![("max_level".to_string(), Value::Int(2))])
    );
    Ok(())
}

#[tokio::test]
async fn hierarchy_depth_follows_the_bound_level() -> QueryResult<()> {
    let provider = ScriptedProvider::new().on(HIERARCHY_SQL, evaluate_hierarchy);
    let levels = hierarchy(DialectCapabilities::postgres())?
        .set_parameter("max_level", 3_i64)
        .result_list::<Level>(&provider)
        .await?;
    assert_eq!(
        levels.iter().map(|l| l.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    Ok(())
}

#[test]
fn recursive_keyword_follows_dialect() -> QueryResult<()> {
    let oracle = hierarchy(DialectCapabilities::oracle())?.query_string()?;
    assert!(oracle.starts_with("WITH TestCTE(id, name, level) AS(\n"));

    let postgres = hierarchy(DialectCapabilities::postgres())?.query_string()?;
    assert!(postgres.starts_with("WITH RECURSIVE TestCTE(id, name, level) AS(\n"));
    Ok(())
}

#[test]
fn recursive_cte_needs_dialect_support() -> QueryResult<()> {
    let generic = DialectCapabilities::default();
    let err = hierarchy(generic)?.query_string().unwrap_err();
    assert!(err.is_unsupported_feature());
    Ok(())
}

#[test]
fn recursive_term_reorders_to_anchor_columns() -> QueryResult<()> {
    let query = factory(DialectCapabilities::postgres())
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
        .bind("level", "t.level + 1")?
        .bind("name", "e.name")?
        .bind("id", "e.id")?
        .where_expr("t.id", CmpOp::Eq, "e.parent")?
        .end()?;

    assert!(query.query_string()?.contains(
        "UNION ALL\nSELECT e.id, e.name, t.level + 1 FROM TestCTE t, RecursiveEntity e"
    ));
    Ok(())
}

#[test]
fn limited_cte_needs_dialect_support() -> QueryResult<()> {
    let build = |caps: DialectCapabilities| -> QueryResult<String> {
        factory(caps)
            .create("TestCTE", "t")?
            .with("TestCTE")?
            .from("RecursiveEntity", "e")?
            .bind("id", "e.id")?
            .bind("name", "e.name")?
            .bind("level", "0")?
            .order_by_asc("e.id")?
            .set_max_results(5)
            .end()?
            .query_string()
    };

    assert!(build(DialectCapabilities::postgres())?.contains("LIMIT 5"));
    let err = build(DialectCapabilities::h2()).unwrap_err();
    assert!(err.is_unsupported_feature());
    Ok(())
}

#[test]
fn second_cte_needs_dialect_support() -> QueryResult<()> {
    let build = |caps: DialectCapabilities| -> QueryResult<String> {
        factory(caps)
            .create("TestCTE", "t")?
            .with("TestCTE")?
            .from("RecursiveEntity", "e")?
            .bind("id", "e.id")?
            .bind("name", "e.name")?
            .bind("level", "0")?
            .end()?
            .with("InsertedDocuments")?
            .from("Document", "d")?
            .bind("id", "d.id")?
            .bind("name", "d.name")?
            .end()?
            .query_string()
    };

    let text = build(DialectCapabilities::postgres())?;
    assert!(text.starts_with("WITH TestCTE(id, name, level) AS(\n"));
    assert!(text.contains("InsertedDocuments(id, name) AS(\n"));

    let err = build(DialectCapabilities::h2()).unwrap_err();
    assert!(err.is_unsupported_feature());
    Ok(())
}
