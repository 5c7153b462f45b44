//! Pagination planning.
//!
//! A page of a query is fetched with up to three statements derived from the
//! base model:
//!
//! 1. a count query over the same FROM/WHERE context;
//! 2. an id query selecting the page's root identifiers, only when a join can
//!    multiply root rows (otherwise a LIMIT would cut entities in half);
//! 3. the object query, restricted to the ids from step 2 or windowed directly.

use serde::Serialize;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, PathExpr};
use crate::function::COUNT_TUPLE;
use crate::metamodel::EntityMetadataProvider;
use crate::model::{OrderItem, QueryModel, SelectItem, StatementKind, Window};
use crate::predicate::{InRhs, Predicate};

/// Preferred name of the parameter that carries the id query's results into
/// the object query. A suffix is added when the query already uses it.
pub const IDS_PARAM: &str = "ids";

/// Zero-based page index and page size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationSpec {
    pub page_index: u64,
    pub page_size: u64,
    /// Root attribute that identifies an entity; the type's id when unset.
    pub id_attribute: Option<String>,
}

impl PaginationSpec {
    pub fn new(page_index: u64, page_size: u64) -> QueryResult<Self> {
        if page_size == 0 {
            return Err(QueryError::InvalidPagination(
                "page size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            page_index,
            page_size,
            id_attribute: None,
        })
    }

    /// Page by `attribute` of the root instead of its identifier.
    pub fn with_id_attribute(mut self, attribute: &str) -> Self {
        self.id_attribute = Some(attribute.to_string());
        self
    }

    /// Index of the first row of the page.
    pub fn offset(&self) -> u64 {
        self.page_index.saturating_mul(self.page_size)
    }

    pub fn window(&self) -> Window {
        Window {
            offset: self.offset(),
            limit: Some(self.page_size),
        }
    }

    /// Whether a result with `total` rows has nothing on this page.
    pub fn is_past_end(&self, total: u64) -> bool {
        total == 0 || self.offset() >= total
    }
}

/// The statements that fetch one page.
#[derive(Debug, Clone)]
pub struct PaginationPlan {
    pub spec: PaginationSpec,
    pub count: QueryModel,
    pub id: Option<QueryModel>,
    pub object: QueryModel,
    /// Parameter of `object` that receives the page's identifiers.
    pub ids_param: String,
}

/// Derive the count, id and object queries of a page.
pub fn plan(
    meta: &dyn EntityMetadataProvider,
    model: &QueryModel,
    spec: PaginationSpec,
) -> QueryResult<PaginationPlan> {
    if model.kind != StatementKind::Select {
        return Err(QueryError::unsupported(format!(
            "cannot paginate a {} statement",
            model.kind.name()
        )));
    }
    let root = model
        .first_root()
        .ok_or_else(|| QueryError::InvalidPagination("query has no FROM root".to_string()))?;
    let root_type = &model.node(root).entity;
    let id_attribute = match &spec.id_attribute {
        Some(attribute) => {
            if meta.attribute(root_type, attribute)?.cardinality.is_relation() {
                return Err(QueryError::InvalidPagination(format!(
                    "'{root_type}.{attribute}' is a relation, not an identifier"
                )));
            }
            attribute.clone()
        }
        None => meta
            .managed_type(root_type)
            .and_then(|t| t.id_attribute.clone())
            .ok_or_else(|| {
                QueryError::InvalidPagination(format!("'{root_type}' has no identifier attribute"))
            })?,
    };
    let segments = id_attribute.split('.').map(str::to_string).collect();
    let id_expr = Expr::Path(PathExpr::node(root, segments));

    let count = count_query(model, &id_expr);

    let id = if model.has_row_multiplying_join() {
        let mut ids = model.clone();
        ids.select = vec![SelectItem {
            expr: id_expr.clone(),
            alias: None,
        }];
        ids.distinct = false;
        ids.group_by = vec![id_expr.clone()];
        ids.having = None;
        ids.order_by = model
            .order_by
            .iter()
            .map(|item| grouped_order(item, &id_expr))
            .collect();
        ids.window = spec.window();
        Some(ids)
    } else {
        None
    };

    let ids_param = model.fresh_parameter_name(IDS_PARAM);
    let mut object = model.clone();
    if id.is_some() {
        object.push_where(Predicate::In {
            expr: id_expr,
            rhs: InRhs::Param(ids_param.clone()),
            negated: false,
        });
        object.window = Window::default();
    } else {
        object.window = spec.window();
    }

    debug!(
        target: "pathql.page",
        page = spec.page_index,
        size = spec.page_size,
        id_phase = id.is_some(),
        "planned page"
    );
    Ok(PaginationPlan {
        spec,
        count,
        id,
        object,
        ids_param,
    })
}

/// An ORDER BY term valid under `GROUP BY id`.
///
/// Terms other than the identifier can take several values per group once a
/// join multiplies rows, so they are folded to the value the group would sort
/// by first: the minimum ascending, the maximum descending.
fn grouped_order(item: &OrderItem, id_expr: &Expr) -> OrderItem {
    if &item.expr == id_expr || is_aggregate(&item.expr) {
        return item.clone();
    }
    let name = if item.ascending { "MIN" } else { "MAX" };
    OrderItem {
        expr: Expr::Function {
            name: name.to_string(),
            args: vec![item.expr.clone()],
            distinct: false,
        },
        ..item.clone()
    }
}

fn is_aggregate(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Function { name, .. }
            if ["COUNT", "SUM", "AVG", "MIN", "MAX", COUNT_TUPLE]
                .iter()
                .any(|a| name.eq_ignore_ascii_case(a))
    )
}

fn count_query(model: &QueryModel, id_expr: &Expr) -> QueryModel {
    let mut count = model.clone();
    count.select.clear();
    count.distinct = false;
    count.group_by.clear();
    count.having = None;
    count.order_by.clear();
    count.window = Window::default();

    // Evaluated after stripping so joins that only served the removed clauses
    // no longer force DISTINCT.
    let distinct = count.has_row_multiplying_join();
    count.select.push(SelectItem {
        expr: Expr::Function {
            name: COUNT_TUPLE.to_string(),
            args: vec![id_expr.clone()],
            distinct,
        },
        alias: None,
    });
    count
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedList<T> {
    pub rows: Vec<T>,
    pub total_size: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<T> PagedList<T> {
    pub fn empty(spec: &PaginationSpec, total_size: u64) -> Self {
        Self {
            rows: Vec::new(),
            total_size,
            page: spec.page_index,
            page_size: spec.page_size,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_size.div_ceil(self.page_size)
    }

    pub fn first_result(&self) -> u64 {
        self.page.saturating_mul(self.page_size)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }
}
