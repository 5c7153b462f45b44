mod common;

use common::{ScriptedProvider, factory};
use pathql::prelude::*;
use pathql::{BoundParameters, ParamStyle};

fn positional(caps: DialectCapabilities) -> DialectCapabilities {
    caps.with_param_style(ParamStyle::Positional)
}

#[tokio::test]
async fn scalar_values_bind_in_text_order() -> QueryResult<()> {
    let provider = ScriptedProvider::new().on("SELECT v.value FROM", |request| {
        let BoundParameters::Positional(values) = &request.params else {
            return Err(QueryError::execution("expected positional parameters"));
        };
        // Every VALUES row passing `v.value > ?`.
        let (bound, rows) = values.split_last().expect("filter parameter");
        let bound = bound.as_i64().unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|v| v.as_i64().is_some_and(|v| v > bound))
            .map(|v| Row::from_pairs([("value", v.clone())]))
            .collect())
    });

    let query = factory(positional(DialectCapabilities::postgres()))
        .select()
        .from_values("v", ValuesSource::scalar("Long", [1_i64, 2, 3]))?
        .select("v.value")?
        .where_expr("v.value", CmpOp::Gt, ":min")?
        .set_parameter("min", 1_i64);

    assert_eq!(
        query.query_string()?,
        "SELECT v.value FROM (VALUES (?), (?), (?)) v WHERE v.value > ?"
    );

    let values = query.result_list::<i64>(&provider).await?;
    assert_eq!(values, vec![2, 3]);
    assert_eq!(
        provider.requests()[0].params,
        BoundParameters::Positional(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(1)
        ])
    );
    Ok(())
}

#[test]
fn values_emulation_follows_dialect() -> QueryResult<()> {
    let build = |caps: DialectCapabilities| -> QueryResult<String> {
        factory(positional(caps))
            .select()
            .from_values("v", ValuesSource::scalar("Long", [1_i64, 2]))?
            .select("v.value")?
            .query_string()
    };

    assert_eq!(
        build(DialectCapabilities::mysql())?,
        "SELECT v.value FROM (SELECT ? value UNION ALL SELECT ?) v"
    );
    assert_eq!(
        build(DialectCapabilities::oracle())?,
        "SELECT v.value FROM (SELECT ? value FROM DUAL UNION ALL SELECT ? FROM DUAL) v"
    );
    assert_eq!(
        build(DialectCapabilities::sql_server())?,
        "SELECT v.value FROM (VALUES (?), (?)) v"
    );
    Ok(())
}

#[test]
fn entity_values_use_named_placeholders() -> QueryResult<()> {
    let source = ValuesSource::entity(
        "Person",
        &["id", "name"],
        vec![
            vec![Value::from(1_i64), Value::from("alice")],
            vec![Value::from(2_i64), Value::from("bob")],
        ],
    );
    let query = factory(DialectCapabilities::postgres())
        .select()
        .from_values("v", source)?
        .select("v.name")?;

    assert_eq!(
        query.query_string()?,
        "SELECT v.name FROM Person(VALUES (:param_0,:param_1), (:param_2,:param_3)) v"
    );
    Ok(())
}

#[test]
fn values_sources_are_validated() {
    let err = factory(DialectCapabilities::postgres())
        .select()
        .from_values("v", ValuesSource::entity("Person", &["nickname"], vec![vec![Value::from("x")]]))
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownAttribute { .. }));

    let empty: [i64; 0] = [];
    let err = factory(DialectCapabilities::postgres())
        .select()
        .from_values("v", ValuesSource::scalar("Long", empty))
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));

    let ragged = ValuesSource::entity("Person", &["id", "name"], vec![vec![Value::from(1_i64)]]);
    let err = factory(DialectCapabilities::postgres())
        .select()
        .from_values("v", ragged)
        .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}
