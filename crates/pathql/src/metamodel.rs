//! Managed type metadata consumed by join resolution and CTE planning.
//!
//! The engine never maps attributes to columns itself. It only needs to know,
//! for a type and an attribute path, what the path points at: a basic value,
//! an embeddable, or a relation (to-one or to-many), whether it may be null,
//! and which attribute identifies the target.
//!
//! [`StaticMetamodel`] is an in-memory implementation with a fluent builder:
//!
//! ```ignore
//! let meta = StaticMetamodel::builder()
//!     .entity("Person", "id", |t| t.basic("name").basic("age").one_to_many("documents", "Document"))
//!     .entity("Document", "id", |t| t.basic("name").many_to_one("owner", "Person"))
//!     .build();
//! ```

use std::collections::HashMap;

use crate::error::{QueryError, QueryResult};

/// What kind of managed type a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// A persistent entity with an identifier.
    Entity,
    /// A value type embedded into its owner.
    Embeddable,
    /// A type whose rows come from a common table expression.
    Cte,
}

/// Shape of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Basic,
    Embedded,
    ToOne,
    ToMany,
}

impl Cardinality {
    pub fn is_relation(self) -> bool {
        matches!(self, Cardinality::ToOne | Cardinality::ToMany)
    }
}

/// A single declared attribute of a managed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub cardinality: Cardinality,
    /// Target type for embedded and relation attributes.
    pub target: Option<String>,
    pub nullable: bool,
    /// Generated values (identity columns, defaults) never need a binding.
    pub generated: bool,
}

/// A managed type with its attributes in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedType {
    pub name: String,
    pub kind: TypeKind,
    pub id_attribute: Option<String>,
    pub attributes: Vec<Attribute>,
}

impl ManagedType {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Default alias used when a type is added to FROM without one.
    pub fn default_alias(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Resolved metadata for an attribute path on a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Type that declares the final segment.
    pub owner: String,
    pub path: String,
    pub cardinality: Cardinality,
    pub target: Option<String>,
    pub nullable: bool,
    pub generated: bool,
    /// For to-one relations, the path selecting the target's identifier.
    pub id_path: Option<String>,
}

/// Source of managed type metadata.
pub trait EntityMetadataProvider: Send + Sync {
    /// Look up a managed type by name.
    fn managed_type(&self, name: &str) -> Option<&ManagedType>;

    /// Look up a managed type, failing with [`QueryError::UnknownType`].
    fn require_type(&self, name: &str) -> QueryResult<&ManagedType> {
        self.managed_type(name)
            .ok_or_else(|| QueryError::UnknownType(name.to_string()))
    }

    /// Resolve a dotted attribute path relative to `type_name`.
    ///
    /// Embedded and relation segments are walked into their target type.
    fn attribute(&self, type_name: &str, path: &str) -> QueryResult<AttributeInfo> {
        let mut owner = self.require_type(type_name)?;
        let segments: Vec<&str> = path.split('.').collect();
        let mut nullable = false;

        for (i, segment) in segments.iter().enumerate() {
            let attr = owner
                .attribute(segment)
                .ok_or_else(|| QueryError::unknown_attribute(&owner.name, *segment))?;
            nullable |= attr.nullable || attr.cardinality == Cardinality::ToMany;

            if i + 1 == segments.len() {
                let id_path = match (attr.cardinality, &attr.target) {
                    (Cardinality::ToOne, Some(target)) => self
                        .require_type(target)?
                        .id_attribute
                        .as_ref()
                        .map(|id| format!("{path}.{id}")),
                    _ => None,
                };
                return Ok(AttributeInfo {
                    owner: owner.name.clone(),
                    path: path.to_string(),
                    cardinality: attr.cardinality,
                    target: attr.target.clone(),
                    nullable,
                    generated: attr.generated,
                    id_path,
                });
            }

            match &attr.target {
                Some(target) if attr.cardinality != Cardinality::Basic => {
                    owner = self.require_type(target)?;
                }
                _ => {
                    return Err(QueryError::unknown_attribute(
                        &owner.name,
                        segments[i..].join("."),
                    ));
                }
            }
        }

        Err(QueryError::unknown_attribute(type_name, path))
    }

    /// Attribute paths that must be bound when producing rows of `type_name`.
    ///
    /// Required means non-nullable and not generated. Embeddables are flattened
    /// to dotted paths; collections are never required.
    fn required_attributes(&self, type_name: &str) -> QueryResult<Vec<String>> {
        let ty = self.require_type(type_name)?;
        let mut out = Vec::new();
        collect_required(self, ty, "", &mut out)?;
        Ok(out)
    }
}

fn collect_required<P: EntityMetadataProvider + ?Sized>(
    provider: &P,
    ty: &ManagedType,
    prefix: &str,
    out: &mut Vec<String>,
) -> QueryResult<()> {
    for attr in &ty.attributes {
        if attr.nullable || attr.generated || attr.cardinality == Cardinality::ToMany {
            continue;
        }
        let path = if prefix.is_empty() {
            attr.name.clone()
        } else {
            format!("{prefix}.{}", attr.name)
        };
        match (attr.cardinality, &attr.target) {
            (Cardinality::Embedded, Some(target)) => {
                let embedded = provider.require_type(target)?;
                collect_required(provider, embedded, &path, out)?;
            }
            _ => out.push(path),
        }
    }
    Ok(())
}

/// In-memory metamodel.
#[derive(Debug, Clone, Default)]
pub struct StaticMetamodel {
    types: HashMap<String, ManagedType>,
}

impl StaticMetamodel {
    pub fn builder() -> StaticMetamodelBuilder {
        StaticMetamodelBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl EntityMetadataProvider for StaticMetamodel {
    fn managed_type(&self, name: &str) -> Option<&ManagedType> {
        self.types.get(name)
    }
}

/// Builder for [`StaticMetamodel`].
#[derive(Debug, Default)]
#[must_use]
pub struct StaticMetamodelBuilder {
    types: HashMap<String, ManagedType>,
}

impl StaticMetamodelBuilder {
    /// Add an entity; the id attribute is declared as a generated basic attribute.
    pub fn entity(
        self,
        name: &str,
        id: &str,
        f: impl FnOnce(TypeBuilder) -> TypeBuilder,
    ) -> Self {
        let seed = TypeBuilder::new(name, TypeKind::Entity, Some(id)).generated(id);
        self.add(f(seed))
    }

    pub fn embeddable(self, name: &str, f: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        self.add(f(TypeBuilder::new(name, TypeKind::Embeddable, None)))
    }

    /// Add a CTE type. Its id attribute is a plain required attribute.
    pub fn cte(self, name: &str, id: &str, f: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        let seed = TypeBuilder::new(name, TypeKind::Cte, Some(id)).basic(id);
        self.add(f(seed))
    }

    fn add(mut self, ty: TypeBuilder) -> Self {
        self.types.insert(ty.inner.name.clone(), ty.inner);
        self
    }

    pub fn build(self) -> StaticMetamodel {
        StaticMetamodel { types: self.types }
    }
}

/// Fluent declaration of a type's attributes.
#[derive(Debug)]
#[must_use]
pub struct TypeBuilder {
    inner: ManagedType,
}

impl TypeBuilder {
    fn new(name: &str, kind: TypeKind, id: Option<&str>) -> Self {
        Self {
            inner: ManagedType {
                name: name.to_string(),
                kind,
                id_attribute: id.map(str::to_string),
                attributes: Vec::new(),
            },
        }
    }

    fn push(mut self, name: &str, cardinality: Cardinality, target: Option<&str>, nullable: bool) -> Self {
        self.inner.attributes.push(Attribute {
            name: name.to_string(),
            cardinality,
            target: target.map(str::to_string),
            nullable,
            generated: false,
        });
        self
    }

    /// Required basic attribute.
    pub fn basic(self, name: &str) -> Self {
        self.push(name, Cardinality::Basic, None, false)
    }

    /// Nullable basic attribute.
    pub fn optional(self, name: &str) -> Self {
        self.push(name, Cardinality::Basic, None, true)
    }

    /// Generated basic attribute; never required in a binding.
    pub fn generated(self, name: &str) -> Self {
        let mut this = self.push(name, Cardinality::Basic, None, false);
        if let Some(last) = this.inner.attributes.last_mut() {
            last.generated = true;
        }
        this
    }

    pub fn embedded(self, name: &str, target: &str) -> Self {
        self.push(name, Cardinality::Embedded, Some(target), false)
    }

    /// Required to-one relation.
    pub fn many_to_one(self, name: &str, target: &str) -> Self {
        self.push(name, Cardinality::ToOne, Some(target), false)
    }

    /// Optional to-one relation.
    pub fn optional_to_one(self, name: &str, target: &str) -> Self {
        self.push(name, Cardinality::ToOne, Some(target), true)
    }

    pub fn one_to_many(self, name: &str, target: &str) -> Self {
        self.push(name, Cardinality::ToMany, Some(target), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> StaticMetamodel {
        StaticMetamodel::builder()
            .entity("RecursiveEntity", "id", |t| {
                t.basic("name")
                    .optional_to_one("parent", "RecursiveEntity")
                    .one_to_many("children", "RecursiveEntity")
            })
            .embeddable("Embeddable", |t| {
                t.basic("name")
                    .basic("description")
                    .many_to_one("recursiveEntity", "RecursiveEntity")
            })
            .cte("Advanced", "id", |t| {
                t.embedded("embeddable", "Embeddable")
                    .basic("level")
                    .optional_to_one("parent", "RecursiveEntity")
            })
            .build()
    }

    #[test]
    fn attribute_walks_relations() {
        let meta = meta();
        let info = meta.attribute("RecursiveEntity", "parent.name").unwrap();
        assert_eq!(info.owner, "RecursiveEntity");
        assert_eq!(info.cardinality, Cardinality::Basic);
        assert!(info.nullable);

        let info = meta.attribute("RecursiveEntity", "parent").unwrap();
        assert_eq!(info.id_path.as_deref(), Some("parent.id"));
    }

    #[test]
    fn basic_attributes_cannot_be_dereferenced() {
        let meta = meta();
        let err = meta.attribute("RecursiveEntity", "name.length").unwrap_err();
        assert!(matches!(err, QueryError::UnknownAttribute { .. }));
    }

    #[test]
    fn required_attributes_flatten_embeddables() {
        let meta = meta();
        assert_eq!(
            meta.required_attributes("Advanced").unwrap(),
            vec![
                "id",
                "embeddable.name",
                "embeddable.description",
                "embeddable.recursiveEntity",
                "level"
            ]
        );
        // id is generated for entities
        assert_eq!(meta.required_attributes("RecursiveEntity").unwrap(), vec!["name"]);
    }
}
