#![allow(dead_code)]

use std::sync::Mutex;

use pathql::{
    CriteriaBuilderFactory, DialectCapabilities, ExecutionProvider, ExecutionRequest, QueryError,
    QueryResult, Row, StaticMetamodel,
};

pub fn metamodel() -> StaticMetamodel {
    StaticMetamodel::builder()
        .entity("RecursiveEntity", "id", |t| {
            t.basic("name")
                .optional_to_one("parent", "RecursiveEntity")
                .one_to_many("children", "RecursiveEntity")
        })
        .entity("Person", "id", |t| {
            t.basic("name")
                .optional("age")
                .one_to_many("documents", "Document")
        })
        .entity("Document", "id", |t| {
            t.basic("name")
                .optional("age")
                .optional("idx")
                .many_to_one("owner", "Person")
        })
        .cte("TestCTE", "id", |t| t.basic("name").basic("level"))
        .cte("InsertedDocuments", "id", |t| t.basic("name"))
        .build()
}

pub fn factory(caps: DialectCapabilities) -> CriteriaBuilderFactory {
    CriteriaBuilderFactory::new(metamodel(), caps)
}

type Responder = Box<dyn Fn(&ExecutionRequest) -> QueryResult<Vec<Row>> + Send + Sync>;

/// In-memory stand-in for a database.
///
/// Each script entry answers the statements whose text starts with its
/// prefix; the longest matching prefix wins. Every request is recorded.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Vec<(String, Responder)>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        prefix: &str,
        responder: impl Fn(&ExecutionRequest) -> QueryResult<Vec<Row>> + Send + Sync + 'static,
    ) -> Self {
        self.scripts.push((prefix.to_string(), Box::new(responder)));
        self
    }

    /// Answer with `rows`, cut to the request's window like a database
    /// applying LIMIT/OFFSET would.
    pub fn on_rows(self, prefix: &str, rows: Vec<Row>) -> Self {
        self.on(prefix, move |request| Ok(request.window.slice(&rows).to_vec()))
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.text).collect()
    }

    fn respond(&self, request: &ExecutionRequest) -> QueryResult<Vec<Row>> {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .iter()
            .filter(|(prefix, _)| request.text.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, responder)| responder(request))
            .unwrap_or_else(|| {
                Err(QueryError::execution(format!(
                    "no script for statement: {}",
                    request.text
                )))
            })
    }
}

impl ExecutionProvider for ScriptedProvider {
    async fn query(&self, request: &ExecutionRequest) -> QueryResult<Vec<Row>> {
        self.respond(request)
    }

    async fn execute(&self, request: &ExecutionRequest) -> QueryResult<u64> {
        Ok(self.respond(request)?.len() as u64)
    }
}

pub fn count_row(count: i64) -> Row {
    Row::from_pairs([("count", count)])
}

pub fn id_row(id: i64) -> Row {
    Row::from_pairs([("id", id)])
}
