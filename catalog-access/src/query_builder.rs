//! Builds catalog-native query text from a [`FilterSet`].
//!
//! Building is pure: the same descriptor, filters and limit always yield the
//! same text. Categories the catalog does not map are ignored, and only
//! categories whose table alias is in scope for the requested object type
//! are projected or filtered.

use std::fmt;

use crate::catalog::{CatalogDescriptor, CatalogSchema, ObjectTypeRule, QueryDialect};
use crate::category::{Category, ObjectType};
use crate::filter::{BoundKind, FilterSet};

/// Query text in a catalog's native language. Never re-parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryText(String);

impl QueryText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for QueryText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for QueryText {
    fn from(text: String) -> Self {
        QueryText(text)
    }
}

impl AsRef<str> for QueryText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors raised while building a query.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QueryBuildError {
    #[error("Invalid object_types={object_type} is specified for catalog {catalog}")]
    InvalidObjectType { catalog: String, object_type: String },
}

/// Conjunction of predicates; empty parts are dropped.
#[derive(Debug, Default)]
struct WhereClause(Vec<String>);

impl WhereClause {
    fn push(&mut self, predicate: impl Into<String>) {
        let predicate = predicate.into();
        if !predicate.trim().is_empty() {
            self.0.push(predicate.trim().to_string());
        }
    }

    fn render(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.join(" AND "))
    }
}

/// Resolve the object type to a rule. `None` means no restriction.
fn resolve_object_type<'a>(
    descriptor: &'a CatalogDescriptor,
    requested: Option<&str>,
) -> Result<Option<&'a ObjectTypeRule>, QueryBuildError> {
    let Some(requested) = requested else {
        return Ok(None);
    };
    let invalid = || QueryBuildError::InvalidObjectType {
        catalog: descriptor.name.to_string(),
        object_type: requested.to_string(),
    };

    match requested.parse::<ObjectType>().map_err(|_| invalid())? {
        ObjectType::Undefined => Ok(None),
        object_type => descriptor
            .object_type_rule(object_type)
            .map(Some)
            .ok_or_else(invalid),
    }
}

fn circle_predicate(
    descriptor: &CatalogDescriptor,
    (ra, dec, radius): (f64, f64, f64),
) -> Option<String> {
    let ra_expr = descriptor.field(Category::RA)?.expression;
    let dec_expr = descriptor.field(Category::Dec)?.expression;
    Some(match descriptor.dialect {
        QueryDialect::Adql => format!(
            "1=CONTAINS(POINT('ICRS', {ra_expr}, {dec_expr}), CIRCLE('ICRS', {ra}, {dec}, {radius}))"
        ),
        QueryDialect::Postgres => {
            format!("q3c_radial_query({ra_expr}, {dec_expr}, {ra}, {dec}, {radius})")
        }
    })
}

/// Build the query text for `descriptor`.
///
/// # Arguments
///
/// * `descriptor` - Catalog to query
/// * `filters` - Bounds, object type and cone filter
/// * `limit` - Maximum number of rows, if any
///
/// # Errors
///
/// [`QueryBuildError::InvalidObjectType`] when the object type is not one the
/// catalog recognizes.
pub fn build(
    descriptor: &CatalogDescriptor,
    filters: &FilterSet,
    limit: Option<u32>,
) -> Result<QueryText, QueryBuildError> {
    let rule = resolve_object_type(descriptor, filters.object_type())?;
    let scope = rule.map_or(descriptor.default_scope, |r| r.scope);
    let in_scope = |alias: &str| scope.iter().any(|s| *s == alias);

    let mut where_clause = WhereClause::default();
    if let Some(predicate) = rule.and_then(|r| r.predicate) {
        where_clause.push(predicate);
    }

    for field in descriptor.field_map().iter().filter(|f| in_scope(f.table_alias)) {
        if field.category == Category::ObjectsInCircle {
            if let Some(circle) = filters.circle().and_then(|c| c.complete()) {
                if let Some(predicate) = circle_predicate(descriptor, circle) {
                    where_clause.push(predicate);
                }
            }
            continue;
        }
        if field.expression.is_empty() {
            continue;
        }
        for kind in [BoundKind::Min, BoundKind::Max] {
            if let Some(value) = filters.bound(field.category, kind) {
                where_clause.push(format!("{} {} {}", field.expression, kind.operator(), value));
            }
        }
    }

    let mut projection = vec![format!(
        "{} AS {}",
        descriptor.id_expression,
        descriptor.id_column()
    )];
    projection.extend(
        descriptor
            .companion_fields
            .iter()
            .map(|f| format!("{} AS {}", f.expression, f.alias)),
    );
    projection.extend(
        descriptor
            .field_map()
            .iter()
            .filter(|f| in_scope(f.table_alias) && !f.expression.is_empty())
            .map(|f| format!("{} AS {}", f.expression, f.category.name())),
    );

    let top = match (descriptor.dialect, limit) {
        (QueryDialect::Adql, Some(n)) => format!("TOP {n} "),
        _ => String::new(),
    };

    let mut query = format!("SELECT {top}{}\nFROM {}", projection.join(", "), descriptor.source_table);
    if let Some(join) = rule.and_then(|r| r.join) {
        query.push_str("\n\t");
        query.push_str(join);
    }
    if let Some(clause) = where_clause.render() {
        query.push_str("\nWHERE ");
        query.push_str(&clause);
    }
    if let (QueryDialect::Postgres, Some(n)) = (descriptor.dialect, limit) {
        query.push_str(&format!("\nLIMIT {n}"));
    }

    log::debug!("Built {} query:\n{}", descriptor.name, query);
    Ok(QueryText(query))
}
