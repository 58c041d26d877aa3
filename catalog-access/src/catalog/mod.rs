//! Static catalog descriptors.
//!
//! Each supported catalog is described by an immutable [`CatalogDescriptor`]:
//! the native expression for every category it supports, the object-type rule
//! table and the companion fields it always projects. Query building and
//! cross-matching are driven entirely by these values.

mod gaia;
mod sdss;
mod simbad;
mod stellaris;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::astrometry::Epoch;
use crate::category::{Category, ObjectType};

pub use gaia::GAIA;
pub use sdss::SDSS;
pub use simbad::SIMBAD;
pub use stellaris::STELLARIS;

/// Key used by callers to select a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKey {
    Gaia,
    Simbad,
    Sdss,
    Stellaris,
}

impl CatalogKey {
    pub const ALL: [CatalogKey; 4] = [
        CatalogKey::Gaia,
        CatalogKey::Simbad,
        CatalogKey::Sdss,
        CatalogKey::Stellaris,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKey::Gaia => "gaia",
            CatalogKey::Simbad => "simbad",
            CatalogKey::Sdss => "sdss",
            CatalogKey::Stellaris => "stellaris",
        }
    }

    /// The descriptor for this catalog.
    pub fn descriptor(&self) -> &'static CatalogDescriptor {
        match self {
            CatalogKey::Gaia => &GAIA,
            CatalogKey::Simbad => &SIMBAD,
            CatalogKey::Sdss => &SDSS,
            CatalogKey::Stellaris => &STELLARIS,
        }
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        CatalogKey::ALL
            .into_iter()
            .find(|key| key.as_str() == lowered)
            .ok_or_else(|| s.to_string())
    }
}

/// Query language flavour a catalog speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryDialect {
    /// IVOA ADQL: `SELECT TOP n`, `CONTAINS(POINT, CIRCLE)`.
    Adql,
    /// PostgreSQL with q3c: trailing `LIMIT n`, `q3c_radial_query`.
    Postgres,
}

/// Native column expression for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub category: Category,
    /// Native expression; empty for pseudo-categories that only filter.
    pub expression: &'static str,
    /// Table alias the expression belongs to.
    pub table_alias: &'static str,
}

impl FieldMapping {
    pub const fn new(category: Category, expression: &'static str, table_alias: &'static str) -> Self {
        Self {
            category,
            expression,
            table_alias,
        }
    }
}

/// What selecting an object type does to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectTypeRule {
    pub object_type: ObjectType,
    /// Table aliases whose categories become usable.
    pub scope: &'static [&'static str],
    /// Extra join appended to the source-table clause.
    pub join: Option<&'static str>,
    /// Predicate restricting rows to this object type.
    pub predicate: Option<&'static str>,
}

/// A column projected ahead of the category columns regardless of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanionField {
    pub expression: &'static str,
    pub alias: &'static str,
}

/// Immutable per-catalog metadata.
#[derive(Debug, Clone)]
pub struct CatalogDescriptor {
    pub key: CatalogKey,
    pub name: &'static str,
    /// Output name of the identifier column.
    pub id_column: &'static str,
    /// Native identifier expression.
    pub id_expression: &'static str,
    /// Reference epoch of stored positions, if the catalog defines one.
    pub epoch: Option<Epoch>,
    pub dialect: QueryDialect,
    /// Source-table clause including joins that are always present.
    pub source_table: &'static str,
    /// Aliases in scope when no object type is requested.
    pub default_scope: &'static [&'static str],
    pub fields: &'static [FieldMapping],
    pub object_types: &'static [ObjectTypeRule],
    pub companion_fields: &'static [CompanionField],
    /// Value of the TAP `FORMAT` parameter yielding a TABLEDATA VOTable.
    pub response_format: &'static str,
}

/// The capability set query building and cross-matching rely on.
pub trait CatalogSchema {
    fn name(&self) -> &str;
    fn id_column(&self) -> &str;
    fn epoch(&self) -> Option<Epoch>;
    fn field_map(&self) -> &[FieldMapping];

    /// Mapping for `category`, if the catalog supports it.
    fn field(&self, category: Category) -> Option<&FieldMapping> {
        self.field_map().iter().find(|f| f.category == category)
    }
}

impl CatalogSchema for CatalogDescriptor {
    fn name(&self) -> &str {
        self.name
    }

    fn id_column(&self) -> &str {
        self.id_column
    }

    fn epoch(&self) -> Option<Epoch> {
        self.epoch
    }

    fn field_map(&self) -> &[FieldMapping] {
        self.fields
    }
}

impl CatalogDescriptor {
    /// Rule for `object_type`, if this catalog recognizes it.
    pub fn object_type_rule(&self, object_type: ObjectType) -> Option<&ObjectTypeRule> {
        self.object_types
            .iter()
            .find(|rule| rule.object_type == object_type)
    }

    /// Output names of the identifier and companion columns, in projection order.
    pub fn identity_columns(&self) -> Vec<&'static str> {
        std::iter::once(self.id_column)
            .chain(self.companion_fields.iter().map(|f| f.alias))
            .collect()
    }
}
