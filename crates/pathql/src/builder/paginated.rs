use tracing::{debug, warn};

use crate::client::{ExecutionProvider, ResultShape};
use crate::error::{QueryError, QueryResult};
use crate::pagination::{PagedList, PaginationPlan, PaginationSpec};
use crate::row::FromRow;
use crate::value::Value;

use super::EngineContext;

/// A query split into count, id and object statements for one page.
#[derive(Debug, Clone)]
pub struct PaginatedCriteriaBuilder {
    ctx: EngineContext,
    plan: PaginationPlan,
}

impl PaginatedCriteriaBuilder {
    pub(crate) fn new(ctx: EngineContext, plan: PaginationPlan) -> Self {
        Self { ctx, plan }
    }

    pub fn spec(&self) -> &PaginationSpec {
        &self.plan.spec
    }

    pub fn plan(&self) -> &PaginationPlan {
        &self.plan
    }

    /// Statement counting the root entities of the unpaged query.
    pub fn page_count_query_string(&self) -> QueryResult<String> {
        Ok(self.ctx.render(&self.plan.count)?.text)
    }

    /// Statement selecting the identifiers on the page, if one is needed.
    pub fn page_id_query_string(&self) -> QueryResult<Option<String>> {
        self.plan
            .id
            .as_ref()
            .map(|id| Ok(self.ctx.render(id)?.text))
            .transpose()
    }

    /// Statement fetching the page's objects.
    pub fn query_string(&self) -> QueryResult<String> {
        Ok(self.ctx.render(&self.plan.object)?.text)
    }

    /// Fetch the page.
    ///
    /// The count runs first; a page past the end returns without running
    /// anything else.
    pub fn result_list<T>(
        &self,
        provider: &impl ExecutionProvider,
    ) -> impl std::future::Future<Output = QueryResult<PagedList<T>>> + Send
    where
        T: FromRow + Send,
    {
        async move {
            let spec = &self.plan.spec;
            let request = self.ctx.prepare(&self.plan.count, ResultShape::Scalar)?;
            let total: i64 = provider.query_one(&request).await?.try_get_at(0)?;
            let total = u64::try_from(total).unwrap_or(0);

            if spec.is_past_end(total) {
                debug!(target: "pathql.page", page = spec.page_index, total, "page past the end");
                return Ok(PagedList::empty(spec, total));
            }

            let rows = match &self.plan.id {
                Some(id_query) => {
                    let request = self.ctx.prepare(id_query, ResultShape::Rows)?;
                    let ids = provider
                        .query(&request)
                        .await?
                        .into_iter()
                        .map(|row| {
                            row.values().first().cloned().ok_or_else(|| {
                                QueryError::decode("0", "id query returned a row without columns")
                            })
                        })
                        .collect::<QueryResult<Vec<Value>>>()?;
                    if ids.is_empty() {
                        warn!(
                            target: "pathql.page",
                            page = spec.page_index,
                            total,
                            "id query returned no rows although the count did"
                        );
                        return Ok(PagedList::empty(spec, total));
                    }
                    let mut object = self.plan.object.clone();
                    object.set_parameter(self.plan.ids_param.as_str(), Value::List(ids));
                    let request = self.ctx.prepare(&object, ResultShape::Rows)?;
                    provider.query_as(&request).await?
                }
                None => {
                    let request = self.ctx.prepare(&self.plan.object, ResultShape::Rows)?;
                    provider.query_as(&request).await?
                }
            };

            Ok(PagedList {
                rows,
                total_size: total,
                page: spec.page_index,
                page_size: spec.page_size,
            })
        }
    }
}
