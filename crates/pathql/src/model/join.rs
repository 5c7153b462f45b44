//! Join arena and path resolution.
//!
//! Every FROM root and join is a [`JoinNode`] in the model's arena. Paths point
//! at nodes by [`NodeId`], so renaming a node (an explicit join taking over an
//! implicit one) is visible everywhere on the next render.
//!
//! Resolution rules:
//! - embedded segments descend without a join;
//! - a to-one segment joins only when dereferenced past the target's id;
//! - a to-many segment always joins;
//! - implicit joins are LEFT when the relation is optional, INNER otherwise;
//! - resolving the same relation from the same node reuses the node.

use std::collections::BTreeSet;

use super::QueryModel;
use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, PathExpr, PathRoot};
use crate::metamodel::{Cardinality, EntityMetadataProvider, TypeKind};
use crate::predicate::Predicate;
use crate::value::Value;

/// Index of a node in the model's join arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

/// Whether the caller asked for a join or the resolver derived it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOrigin {
    Explicit,
    Implicit,
}

/// Position of a node in the FROM forest.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRole {
    Root,
    /// Join over a relation attribute of `parent`.
    Relation {
        parent: NodeId,
        path: String,
        cardinality: Cardinality,
    },
    /// Join of an unrelated type with an ON clause, attached to a root.
    Entity { root: NodeId },
}

/// Where a node's rows come from.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSource {
    Entity,
    Cte,
    Values(ValuesSource),
}

/// In-memory rows used as a FROM source.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesSource {
    pub type_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Scalar sources expose a single `value` attribute.
    pub scalar: bool,
}

impl ValuesSource {
    /// Scalar rows, e.g. `ValuesSource::scalar("Long", [1, 2, 3])`.
    pub fn scalar<V: Into<Value>>(type_name: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            type_name: type_name.to_string(),
            columns: vec!["value".to_string()],
            rows: values.into_iter().map(|v| vec![v.into()]).collect(),
            scalar: true,
        }
    }

    /// Rows of a managed type; `columns` name the attributes of each row.
    pub fn entity(type_name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            type_name: type_name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            scalar: false,
        }
    }
}

/// A FROM root or join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub alias: String,
    /// Managed type name (or the VALUES type name).
    pub entity: String,
    pub role: NodeRole,
    pub source: NodeSource,
    pub kind: JoinKind,
    pub origin: JoinOrigin,
    pub on: Option<Predicate>,
}

impl JoinNode {
    pub fn is_root(&self) -> bool {
        matches!(self.role, NodeRole::Root)
    }

    pub fn is_implicit(&self) -> bool {
        self.origin == JoinOrigin::Implicit
    }

    /// Joins that can yield more than one row per parent row.
    pub fn multiplies_rows(&self) -> bool {
        matches!(
            self.role,
            NodeRole::Relation {
                cardinality: Cardinality::ToMany,
                ..
            } | NodeRole::Entity { .. }
        )
    }
}

/// Alias visible from an enclosing query.
#[derive(Debug, Clone, PartialEq)]
pub struct OuterAlias {
    pub alias: String,
    pub entity: String,
    pub scalar: bool,
}

/// A FROM root followed by the joins rendered under it.
#[derive(Debug, Clone, PartialEq)]
pub struct RootPlan {
    pub root: NodeId,
    pub joins: Vec<NodeId>,
}

enum Start {
    Node(NodeId, usize),
    Outer(String),
}

impl QueryModel {
    pub(crate) fn find_alias(&self, alias: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.alias == alias).map(NodeId)
    }

    fn alias_taken(&self, alias: &str) -> bool {
        self.find_alias(alias).is_some() || self.outer.iter().any(|o| o.alias == alias)
    }

    fn check_alias(&self, alias: &str) -> QueryResult<()> {
        if self.alias_taken(alias) {
            return Err(QueryError::AliasCollision(alias.to_string()));
        }
        Ok(())
    }

    fn generate_alias(&self, type_name: &str) -> String {
        let base = type_name.to_lowercase();
        if !self.alias_taken(&base) {
            return base;
        }
        (1..)
            .map(|i| format!("{base}_{i}"))
            .find(|candidate| !self.alias_taken(candidate))
            .unwrap_or(base)
    }

    fn push_node(&mut self, node: JoinNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Add a FROM root for a managed type. `None` uses the lower-cased type name.
    pub fn add_root(
        &mut self,
        meta: &dyn EntityMetadataProvider,
        entity: &str,
        alias: Option<&str>,
    ) -> QueryResult<NodeId> {
        let ty = meta.require_type(entity)?;
        let source = match ty.kind {
            TypeKind::Entity => NodeSource::Entity,
            TypeKind::Cte => NodeSource::Cte,
            TypeKind::Embeddable => {
                return Err(QueryError::validation(format!(
                    "embeddable '{entity}' cannot be used as a query source"
                )));
            }
        };
        let alias = alias.map(str::to_string).unwrap_or_else(|| ty.default_alias());
        self.check_alias(&alias)?;
        Ok(self.push_node(JoinNode {
            alias,
            entity: entity.to_string(),
            role: NodeRole::Root,
            source,
            kind: JoinKind::Inner,
            origin: JoinOrigin::Explicit,
            on: None,
        }))
    }

    /// Add a FROM root backed by literal rows.
    pub fn add_values_root(
        &mut self,
        meta: &dyn EntityMetadataProvider,
        alias: &str,
        values: ValuesSource,
    ) -> QueryResult<NodeId> {
        self.check_alias(alias)?;
        if values.rows.is_empty() {
            return Err(QueryError::validation(format!(
                "VALUES source '{alias}' has no rows"
            )));
        }
        if let Some(row) = values.rows.iter().find(|r| r.len() != values.columns.len()) {
            return Err(QueryError::validation(format!(
                "VALUES source '{alias}' expects {} columns per row, got {}",
                values.columns.len(),
                row.len()
            )));
        }
        if !values.scalar {
            let ty = meta.require_type(&values.type_name)?;
            if let Some(col) = values.columns.iter().find(|c| ty.attribute(c).is_none()) {
                return Err(QueryError::unknown_attribute(&values.type_name, col.as_str()));
            }
        }
        Ok(self.push_node(JoinNode {
            alias: alias.to_string(),
            entity: values.type_name.clone(),
            role: NodeRole::Root,
            source: NodeSource::Values(values),
            kind: JoinKind::Inner,
            origin: JoinOrigin::Explicit,
            on: None,
        }))
    }

    /// Join an unrelated managed type with an ON clause.
    ///
    /// The node is attached to the most recently added root.
    pub fn add_entity_join(
        &mut self,
        meta: &dyn EntityMetadataProvider,
        entity: &str,
        alias: &str,
        kind: JoinKind,
        on: Predicate,
    ) -> QueryResult<NodeId> {
        let root = self
            .roots()
            .last()
            .ok_or_else(|| QueryError::validation("entity join requires a FROM root"))?;
        let ty = meta.require_type(entity)?;
        let source = match ty.kind {
            TypeKind::Cte => NodeSource::Cte,
            _ => NodeSource::Entity,
        };
        self.check_alias(alias)?;
        let id = self.push_node(JoinNode {
            alias: alias.to_string(),
            entity: entity.to_string(),
            role: NodeRole::Entity { root },
            source,
            kind,
            origin: JoinOrigin::Explicit,
            on: None,
        });
        let on = self.resolve_predicate(meta, on)?;
        self.nodes[id.0].on = Some(on);
        Ok(id)
    }

    /// Explicitly join a relation path such as `r.children`.
    ///
    /// An implicit join over the same relation is taken over: it gets the
    /// caller's alias and kind and is rendered as an explicit join.
    pub fn join_path(
        &mut self,
        meta: &dyn EntityMetadataProvider,
        path: &str,
        alias: &str,
        kind: JoinKind,
    ) -> QueryResult<NodeId> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        match self.locate_start(meta, &segments)? {
            Start::Node(start, skip) => {
                if skip == segments.len() {
                    return Err(QueryError::validation(format!(
                        "join path '{path}' does not name a relation"
                    )));
                }
                let (node, rest) = self.walk(meta, start, &segments[skip..], Some((alias, kind)))?;
                if !rest.is_empty() {
                    return Err(QueryError::validation(format!(
                        "join path '{path}' must end in a relation"
                    )));
                }
                Ok(node)
            }
            Start::Outer(outer) => Err(QueryError::validation(format!(
                "cannot join '{path}' through outer alias '{outer}'"
            ))),
        }
    }

    /// Resolve every unresolved path of `expr`.
    pub fn resolve_expr(&mut self, meta: &dyn EntityMetadataProvider, expr: Expr) -> QueryResult<Expr> {
        expr.map_paths(&mut |p| self.resolve_path(meta, p))
    }

    /// Resolve every unresolved path of `predicate`.
    pub fn resolve_predicate(
        &mut self,
        meta: &dyn EntityMetadataProvider,
        predicate: Predicate,
    ) -> QueryResult<Predicate> {
        predicate.map_exprs(&mut |e| self.resolve_expr(meta, e))
    }

    /// Resolve one path, creating implicit joins as needed.
    pub fn resolve_path(&mut self, meta: &dyn EntityMetadataProvider, path: PathExpr) -> QueryResult<Expr> {
        if path.root != PathRoot::Unresolved {
            return Ok(Expr::Path(path));
        }
        match self.locate_start(meta, &path.segments)? {
            Start::Node(start, skip) => {
                let (node, segments) = self.walk(meta, start, &path.segments[skip..], None)?;
                Ok(Expr::Path(PathExpr::node(node, segments)))
            }
            Start::Outer(alias) => Ok(Expr::Path(PathExpr {
                root: PathRoot::Outer(alias),
                segments: path.segments[1..].to_vec(),
            })),
        }
    }

    fn node_has_attribute(&self, meta: &dyn EntityMetadataProvider, id: NodeId, name: &str) -> bool {
        let node = &self.nodes[id.0];
        match &node.source {
            NodeSource::Values(v) if v.scalar => name == "value",
            _ => meta
                .managed_type(&node.entity)
                .is_some_and(|t| t.attribute(name).is_some()),
        }
    }

    fn locate_start(&self, meta: &dyn EntityMetadataProvider, segments: &[String]) -> QueryResult<Start> {
        let first = segments
            .first()
            .ok_or_else(|| QueryError::parse("", "empty path"))?;

        if let Some(id) = self.find_alias(first) {
            return Ok(Start::Node(id, 1));
        }
        if self.outer.iter().any(|o| &o.alias == first) {
            return Ok(Start::Outer(first.clone()));
        }

        let candidates: Vec<NodeId> = self
            .roots()
            .filter(|id| self.node_has_attribute(meta, *id, first))
            .collect();
        match candidates.as_slice() {
            [single] => Ok(Start::Node(*single, 0)),
            [] => Err(QueryError::unknown_attribute(
                self.first_root()
                    .map(|r| self.nodes[r.0].entity.clone())
                    .unwrap_or_else(|| "<no FROM root>".to_string()),
                segments.join("."),
            )),
            many => Err(QueryError::AmbiguousPath {
                path: segments.join("."),
                candidates: many.iter().map(|id| self.nodes[id.0].alias.clone()).collect(),
            }),
        }
    }

    /// Walk attribute segments from `start`, joining where the rules require.
    ///
    /// Returns the node the path ends on and the segments left to render
    /// relative to it. With `explicit`, the final segment is joined under the
    /// given alias and kind.
    fn walk(
        &mut self,
        meta: &dyn EntityMetadataProvider,
        start: NodeId,
        rest: &[String],
        explicit: Option<(&str, JoinKind)>,
    ) -> QueryResult<(NodeId, Vec<String>)> {
        let mut current = start;
        let mut owner = self.nodes[start.0].entity.clone();
        let mut pending: Vec<String> = Vec::new();

        if let NodeSource::Values(v) = &self.nodes[start.0].source
            && v.scalar
        {
            return match rest {
                [] => Ok((start, Vec::new())),
                [value] if value == "value" && explicit.is_none() => Ok((start, rest.to_vec())),
                _ => Err(QueryError::unknown_attribute(&owner, rest.join("."))),
            };
        }

        for (i, segment) in rest.iter().enumerate() {
            let is_last = i + 1 == rest.len();
            let ty = meta.require_type(&owner)?;
            let attr = ty
                .attribute(segment)
                .ok_or_else(|| QueryError::unknown_attribute(&owner, segment.as_str()))?
                .clone();

            match (attr.cardinality, attr.target) {
                (Cardinality::Basic, _) | (_, None) => {
                    if !is_last || explicit.is_some() {
                        return Err(QueryError::unknown_attribute(&owner, rest[i..].join(".")));
                    }
                    pending.push(segment.clone());
                }
                (Cardinality::Embedded, Some(target)) => {
                    pending.push(segment.clone());
                    owner = target;
                }
                (cardinality, Some(target)) => {
                    let target_id = meta.require_type(&target)?.id_attribute.clone();
                    let next_is_final_id = i + 2 == rest.len() && target_id.as_deref() == Some(rest[i + 1].as_str());
                    let needs_join = cardinality == Cardinality::ToMany
                        || (is_last && explicit.is_some())
                        || (!is_last && !next_is_final_id);

                    if !needs_join {
                        pending.push(segment.clone());
                        owner = target;
                        continue;
                    }

                    let mut relation = std::mem::take(&mut pending);
                    relation.push(segment.clone());
                    let nullable = attr.nullable || cardinality == Cardinality::ToMany;
                    current = self.join_relation(
                        current,
                        relation.join("."),
                        &target,
                        cardinality,
                        nullable,
                        if is_last { explicit } else { None },
                    )?;
                    owner = target;
                }
            }
        }

        Ok((current, pending))
    }

    fn join_relation(
        &mut self,
        parent: NodeId,
        relation: String,
        target: &str,
        cardinality: Cardinality,
        nullable: bool,
        explicit: Option<(&str, JoinKind)>,
    ) -> QueryResult<NodeId> {
        let mut same_relation = self.nodes.iter().enumerate().filter(|(_, n)| {
            matches!(&n.role, NodeRole::Relation { parent: p, path, .. } if *p == parent && *path == relation)
        });

        match explicit {
            None => {
                if let Some((i, _)) = same_relation.next() {
                    return Ok(NodeId(i));
                }
                let alias = self.generate_alias(target);
                tracing::trace!(
                    target: "pathql.join",
                    parent = %self.nodes[parent.0].alias,
                    relation = %relation,
                    alias = %alias,
                    "implicit join"
                );
                Ok(self.push_node(JoinNode {
                    alias,
                    entity: target.to_string(),
                    role: NodeRole::Relation {
                        parent,
                        path: relation,
                        cardinality,
                    },
                    source: NodeSource::Entity,
                    kind: if nullable { JoinKind::Left } else { JoinKind::Inner },
                    origin: JoinOrigin::Implicit,
                    on: None,
                }))
            }
            Some((alias, kind)) => {
                let implicit = same_relation.find(|(_, n)| n.is_implicit()).map(|(i, _)| i);
                self.check_alias(alias)?;
                if let Some(i) = implicit {
                    let node = &mut self.nodes[i];
                    node.alias = alias.to_string();
                    node.kind = kind;
                    node.origin = JoinOrigin::Explicit;
                    return Ok(NodeId(i));
                }
                Ok(self.push_node(JoinNode {
                    alias: alias.to_string(),
                    entity: target.to_string(),
                    role: NodeRole::Relation {
                        parent,
                        path: relation,
                        cardinality,
                    },
                    source: NodeSource::Entity,
                    kind,
                    origin: JoinOrigin::Explicit,
                    on: None,
                }))
            }
        }
    }

    /// Parent of a join node, if any.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes[id.0].role {
            NodeRole::Root => None,
            NodeRole::Relation { parent, .. } => Some(parent),
            NodeRole::Entity { root } => Some(root),
        }
    }

    fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.parent_of(id) {
            id = parent;
        }
        id
    }

    /// Nodes referenced by paths of this model's clauses and ON predicates.
    fn referenced_nodes(&self) -> BTreeSet<NodeId> {
        let mut used = BTreeSet::new();
        let mut mark = |e: &Expr| {
            e.for_each_path(&mut |p| {
                if let PathRoot::Node(id) = p.root {
                    used.insert(id);
                }
            })
        };
        self.for_each_clause_expr(&mut mark);
        for node in &self.nodes {
            if let Some(on) = &node.on {
                on.for_each_expr(&mut mark);
            }
        }
        used
    }

    /// Nodes that will be rendered: roots, explicit joins, and implicit joins
    /// still referenced by some clause, each with its ancestors.
    pub(crate) fn retained_nodes(&self) -> BTreeSet<NodeId> {
        let referenced = self.referenced_nodes();
        let mut retained = BTreeSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let id = NodeId(i);
            if node.is_implicit() && !referenced.contains(&id) {
                continue;
            }
            let mut cursor = Some(id);
            while let Some(c) = cursor {
                if !retained.insert(c) {
                    break;
                }
                cursor = self.parent_of(c);
            }
        }
        retained
    }

    /// FROM plan: each root with its rendered joins.
    ///
    /// Explicit joins come first in creation order, then implicit ones. A
    /// node's ancestors, and the nodes its ON clause reads, are always emitted
    /// before it.
    pub fn join_plan(&self) -> Vec<RootPlan> {
        let retained = self.retained_nodes();
        self.roots()
            .map(|root| {
                let members: Vec<NodeId> = retained
                    .iter()
                    .copied()
                    .filter(|id| *id != root && self.root_of(*id) == root)
                    .collect();
                let mut joins = Vec::with_capacity(members.len());
                let explicit = members.iter().filter(|id| !self.nodes[id.0].is_implicit());
                let implicit = members.iter().filter(|id| self.nodes[id.0].is_implicit());
                for id in explicit.chain(implicit) {
                    self.emit_on_dependencies(*id, root, &mut joins);
                    self.emit_with_ancestors(*id, root, &mut joins);
                }
                RootPlan { root, joins }
            })
            .collect()
    }

    fn emit_with_ancestors(&self, id: NodeId, root: NodeId, out: &mut Vec<NodeId>) {
        if id == root || out.contains(&id) {
            return;
        }
        if let Some(parent) = self.parent_of(id) {
            self.emit_with_ancestors(parent, root, out);
        }
        out.push(id);
    }

    fn emit_on_dependencies(&self, id: NodeId, root: NodeId, out: &mut Vec<NodeId>) {
        let Some(on) = &self.nodes[id.0].on else {
            return;
        };
        let mut read = BTreeSet::new();
        on.for_each_expr(&mut |e| {
            e.for_each_path(&mut |p| {
                if let PathRoot::Node(dep) = p.root {
                    read.insert(dep);
                }
            })
        });
        for dep in read {
            if self.root_of(dep) == root && !self.is_within(dep, id) {
                self.emit_with_ancestors(dep, root, out);
            }
        }
    }

    /// Whether `id` is `ancestor` or lies below it.
    fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(c) = cursor {
            if c == ancestor {
                return true;
            }
            cursor = self.parent_of(c);
        }
        false
    }

    /// Whether any rendered join can duplicate root rows.
    pub fn has_row_multiplying_join(&self) -> bool {
        self.retained_nodes()
            .iter()
            .any(|id| self.nodes[id.0].multiplies_rows())
    }

    /// Aliases of this model as seen from a nested subquery.
    pub(crate) fn outer_scope(&self) -> Vec<OuterAlias> {
        let mut scope: Vec<OuterAlias> = self
            .nodes
            .iter()
            .map(|n| OuterAlias {
                alias: n.alias.clone(),
                entity: n.entity.clone(),
                scalar: matches!(&n.source, NodeSource::Values(v) if v.scalar),
            })
            .collect();
        scope.extend(self.outer.iter().cloned());
        scope
    }

    /// If `path` denotes an entity (an alias or a to-one relation), the path
    /// selecting that entity's identifier instead.
    pub fn identifier_path(
        &self,
        meta: &dyn EntityMetadataProvider,
        path: &PathExpr,
    ) -> QueryResult<Option<PathExpr>> {
        let (entity, scalar) = match &path.root {
            PathRoot::Node(id) => {
                let node = &self.nodes[id.0];
                (node.entity.clone(), matches!(&node.source, NodeSource::Values(v) if v.scalar))
            }
            PathRoot::Outer(alias) => match self.outer.iter().find(|o| &o.alias == alias) {
                Some(o) => (o.entity.clone(), o.scalar),
                None => return Ok(None),
            },
            PathRoot::Unresolved => return Ok(None),
        };
        if scalar {
            return Ok(None);
        }

        if path.segments.is_empty() {
            let ty = meta.require_type(&entity)?;
            return Ok(match (ty.kind, &ty.id_attribute) {
                (TypeKind::Entity | TypeKind::Cte, Some(id)) => Some(path.clone().with_segment(id.clone())),
                _ => None,
            });
        }

        let info = meta.attribute(&entity, &path.segments.join("."))?;
        if info.cardinality != Cardinality::ToOne {
            return Ok(None);
        }
        let target = info
            .target
            .as_deref()
            .ok_or_else(|| QueryError::unknown_attribute(&entity, info.path.as_str()))?;
        Ok(meta
            .require_type(target)?
            .id_attribute
            .as_ref()
            .map(|id| path.clone().with_segment(id.clone())))
    }
}
