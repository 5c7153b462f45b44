mod common;

use common::{ScriptedProvider, count_row, factory, id_row};
use pathql::prelude::*;
use pathql::{ExecutionRequest, PagedList};

fn entity_rows() -> Vec<Row> {
    ["a", "b", "c"]
        .iter()
        .zip(1_i64..)
        .map(|(name, id)| Row::from_pairs([("id", Value::from(id)), ("name", Value::from(*name))]))
        .collect()
}

fn ordered_entities() -> ScriptedProvider {
    ScriptedProvider::new()
        .on_rows("SELECT COUNT(", vec![count_row(3)])
        .on_rows("SELECT r FROM RecursiveEntity r", entity_rows())
}

async fn fetch(provider: &ScriptedProvider, page: u64, size: u64) -> QueryResult<PagedList<Row>> {
    factory(DialectCapabilities::postgres())
        .create("RecursiveEntity", "r")?
        .order_by_asc("r.name")?
        .page(page, size)?
        .result_list::<Row>(provider)
        .await
}

#[tokio::test]
async fn consecutive_pages_are_disjoint() -> QueryResult<()> {
    let provider = ordered_entities();

    let first = fetch(&provider, 0, 1).await?;
    let second = fetch(&provider, 1, 1).await?;

    assert_eq!(first.total_size, 3);
    assert_eq!(second.total_size, 3);
    assert_eq!(first.total_pages(), 3);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first.rows[0], second.rows[0]);

    let mut seen: Vec<Row> = first.into_rows();
    seen.extend(second.into_rows());
    seen.extend(fetch(&provider, 2, 1).await?.into_rows());
    assert_eq!(seen, entity_rows());
    Ok(())
}

#[tokio::test]
async fn page_without_row_multiplying_joins_skips_the_id_query() -> QueryResult<()> {
    let provider = ordered_entities();
    fetch(&provider, 1, 1).await?;

    assert_eq!(
        provider.texts(),
        vec![
            "SELECT COUNT(r.id) FROM RecursiveEntity r".to_string(),
            "SELECT r FROM RecursiveEntity r ORDER BY r.name ASC NULLS LAST LIMIT 1 OFFSET 1".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn page_past_the_end_runs_only_the_count() -> QueryResult<()> {
    let provider = ordered_entities();
    let page = fetch(&provider, 5, 1).await?;

    assert!(page.is_empty());
    assert_eq!(page.total_size, 3);
    assert_eq!(provider.texts().len(), 1);
    Ok(())
}

/// Persons 1..=3; the object query returns only the requested ids.
fn persons_with_documents() -> ScriptedProvider {
    ScriptedProvider::new()
        .on_rows("SELECT COUNT(", vec![count_row(3)])
        .on_rows("SELECT p.id FROM Person p", (1..=3).map(id_row).collect())
        .on("SELECT p FROM Person p", |request: &ExecutionRequest| {
            let Some(Value::List(ids)) = request.params.get("ids") else {
                return Err(QueryError::execution("object query without id list"));
            };
            Ok(ids
                .iter()
                .filter_map(Value::as_i64)
                .map(id_row)
                .collect())
        })
}

#[tokio::test]
async fn to_many_join_pages_by_identifier() -> QueryResult<()> {
    let provider = persons_with_documents();
    let paged = factory(DialectCapabilities::postgres())
        .create("Person", "p")?
        .left_join("p.documents", "d")?
        .order_by_asc("p.id")?
        .page(1, 2)?;

    assert_eq!(
        paged.page_count_query_string()?,
        "SELECT COUNT(DISTINCT p.id) FROM Person p LEFT JOIN p.documents d"
    );
    assert!(paged.page_id_query_string()?.is_some());
    assert_eq!(
        paged.query_string()?,
        "SELECT p FROM Person p LEFT JOIN p.documents d WHERE p.id IN :ids ORDER BY p.id ASC NULLS LAST"
    );

    let page = paged.result_list::<i64>(&provider).await?;
    assert_eq!(page.rows, vec![3]);
    assert_eq!(page.total_size, 3);
    assert_eq!(page.first_result(), 2);

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].text.starts_with("SELECT p.id FROM Person p LEFT JOIN p.documents d GROUP BY p.id"));
    assert_eq!(requests[2].params.get("ids"), Some(&Value::List(vec![Value::Int(3)])));
    Ok(())
}

#[tokio::test]
async fn caller_parameter_named_ids_survives_the_id_phase() -> QueryResult<()> {
    let names = Value::List(vec![Value::from("alice")]);
    let provider = ScriptedProvider::new()
        .on_rows("SELECT COUNT(", vec![count_row(2)])
        .on_rows("SELECT p.id FROM Person p", vec![id_row(1), id_row(2)])
        .on("SELECT p FROM Person p", |request: &ExecutionRequest| {
            let Some(Value::List(ids)) = request.params.get("ids_1") else {
                return Err(QueryError::execution("object query without id list"));
            };
            Ok(ids.iter().filter_map(Value::as_i64).map(id_row).collect())
        });

    let paged = factory(DialectCapabilities::postgres())
        .create("Person", "p")?
        .left_join("p.documents", "d")?
        .where_in_param("p.name", "ids")?
        .set_parameter("ids", names.clone())
        .page(0, 10)?;
    assert_eq!(
        paged.query_string()?,
        "SELECT p FROM Person p LEFT JOIN p.documents d WHERE p.name IN :ids AND p.id IN :ids_1"
    );

    let page = paged.result_list::<i64>(&provider).await?;
    assert_eq!(page.rows, vec![1, 2]);

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(request.params.get("ids"), Some(&names));
    }
    assert_eq!(
        requests[2].params.get("ids_1"),
        Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
    );
    Ok(())
}

#[tokio::test]
async fn id_rows_without_columns_are_decode_errors() -> QueryResult<()> {
    let provider = ScriptedProvider::new()
        .on_rows("SELECT COUNT(", vec![count_row(1)])
        .on_rows("SELECT p.id FROM Person p", vec![Row::from_pairs(Vec::<(String, Value)>::new())]);

    let err = factory(DialectCapabilities::postgres())
        .create("Person", "p")?
        .left_join("p.documents", "d")?
        .page(0, 10)?
        .result_list::<i64>(&provider)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Decode { .. }));
    assert_eq!(provider.requests().len(), 2);
    Ok(())
}

#[test]
fn id_query_orders_by_aggregates_of_to_many_columns() -> QueryResult<()> {
    let paged = factory(DialectCapabilities::postgres())
        .create("Person", "p")?
        .left_join("p.documents", "d")?
        .order_by_asc("d.name")?
        .page(0, 10)?;
    assert_eq!(
        paged.page_id_query_string()?.as_deref(),
        Some(
            "SELECT p.id FROM Person p LEFT JOIN p.documents d GROUP BY p.id \
             ORDER BY MIN(d.name) ASC NULLS LAST LIMIT 10"
        )
    );
    Ok(())
}

#[test]
fn invalid_page_requests_are_rejected() -> QueryResult<()> {
    let query = factory(DialectCapabilities::postgres()).create("Person", "p")?;
    let err = query.page(0, 0).unwrap_err();
    assert!(matches!(err, QueryError::InvalidPagination(_)));

    // An explicit window is replaced by the page's window.
    let windowed = factory(DialectCapabilities::postgres())
        .create("Person", "p")?
        .set_first_result(10);
    assert_eq!(windowed.page(0, 5)?.query_string()?, "SELECT p FROM Person p LIMIT 5");
    Ok(())
}
