mod common;

use common::{factory, metamodel};
use pathql::function::FunctionCall;
use pathql::prelude::*;
use pathql::{EngineConfig, FunctionRenderer, LimitStyle, ParamStyle};

fn windowed(caps: DialectCapabilities) -> QueryResult<String> {
    factory(caps)
        .create("RecursiveEntity", "r")?
        .set_first_result(20)
        .set_max_results(10)
        .query_string()
}

#[test]
fn windows_render_per_limit_style() -> QueryResult<()> {
    assert_eq!(
        windowed(DialectCapabilities::postgres())?,
        "SELECT r FROM RecursiveEntity r LIMIT 10 OFFSET 20"
    );
    assert_eq!(
        windowed(DialectCapabilities::db2())?,
        "SELECT r FROM RecursiveEntity r OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );
    assert_eq!(
        windowed(DialectCapabilities::oracle())?,
        "SELECT * FROM (SELECT r, ROW_NUMBER() OVER (ORDER BY NULL) rownum_ FROM RecursiveEntity r) paged_ WHERE rownum_ > 20 AND rownum_ <= 30 ORDER BY rownum_"
    );
    Ok(())
}

#[test]
fn row_number_pages_follow_the_query_order() -> QueryResult<()> {
    let paged = factory(DialectCapabilities::oracle())
        .create("Person", "p")?
        .order_by_asc("p.name")?
        .page(1, 10)?;
    assert_eq!(
        paged.query_string()?,
        "SELECT * FROM (SELECT p, ROW_NUMBER() OVER (ORDER BY p.name ASC NULLS LAST) rownum_ FROM Person p) paged_ WHERE rownum_ > 10 AND rownum_ <= 20 ORDER BY rownum_"
    );
    Ok(())
}

#[test]
fn null_precedence_is_emulated_where_needed() -> QueryResult<()> {
    let ordered = |caps: DialectCapabilities| -> QueryResult<String> {
        factory(caps)
            .create("Person", "p")?
            .order_by("p.age", false, true)?
            .query_string()
    };

    assert_eq!(
        ordered(DialectCapabilities::sqlite())?,
        "SELECT p FROM Person p ORDER BY p.age DESC NULLS FIRST"
    );
    assert_eq!(
        ordered(DialectCapabilities::sql_server())?,
        "SELECT p FROM Person p ORDER BY CASE WHEN p.age IS NULL THEN 0 ELSE 1 END, p.age DESC"
    );
    Ok(())
}

const MYSQL_CONFIG: &str = r#"
[dialect]
preset = "mysql"

[dialect.overrides]
param_style = "positional"

[ordering]
nulls_first = true
"#;

#[test]
fn config_selects_preset_and_overrides() -> QueryResult<()> {
    let config = EngineConfig::from_toml_str(MYSQL_CONFIG)?;
    let factory = CriteriaBuilderFactory::from_config(metamodel(), &config)?;
    assert_eq!(factory.dialect().name, "mysql");
    assert_eq!(factory.dialect().param_style, ParamStyle::Positional);
    assert_eq!(factory.dialect().limit_style, LimitStyle::LimitOffset);

    let paged = factory
        .create("Person", "p")?
        .left_join("p.documents", "d")?
        .where_eq("d.name", "report")?
        .page(0, 10)?;
    assert_eq!(
        paged.page_count_query_string()?,
        "SELECT count(distinct p.id) FROM Person p LEFT JOIN p.documents d WHERE d.name = ?"
    );

    let ordered = factory
        .create("Person", "p")?
        .order_by_asc("p.age")?
        .query_string()?;
    assert_eq!(
        ordered,
        "SELECT p FROM Person p ORDER BY CASE WHEN p.age IS NULL THEN 0 ELSE 1 END, p.age ASC"
    );
    Ok(())
}

#[test]
fn unknown_presets_are_config_errors() {
    let err = EngineConfig::from_toml_str("[dialect]\npreset = \"informix\"\n").unwrap_err();
    assert!(matches!(err, QueryError::Config(ref m) if m.contains("informix")));
}

struct Greatest;

impl FunctionRenderer for Greatest {
    fn render(&self, call: &FunctionCall<'_>) -> QueryResult<String> {
        Ok(format!("MAX({})", call.args.join(", ")))
    }
}

#[test]
fn registered_functions_are_scoped_to_their_factory() -> QueryResult<()> {
    let plain = factory(DialectCapabilities::sqlite());
    let mut custom = factory(DialectCapabilities::sqlite());
    custom.register_function("GREATEST", Greatest);

    let build = |f: &CriteriaBuilderFactory| -> QueryResult<String> {
        f.create("Person", "p")?
            .select("GREATEST(p.age, 0)")?
            .query_string()
    };
    assert_eq!(build(&custom)?, "SELECT MAX(p.age, 0) FROM Person p");
    assert_eq!(build(&plain)?, "SELECT GREATEST(p.age,0) FROM Person p");
    Ok(())
}
