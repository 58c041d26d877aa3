//! SIMBAD through the CDS TAP service.
//!
//! Every SIMBAD row carries its cross-identifier, object-type code and
//! object-type description, so these companions are joined and projected
//! unconditionally.

use super::{
    CatalogDescriptor, CatalogKey, CompanionField, FieldMapping, ObjectTypeRule, QueryDialect,
};
use crate::astrometry::Epoch;
use crate::category::{Category, ObjectType};

pub static SIMBAD: CatalogDescriptor = CatalogDescriptor {
    key: CatalogKey::Simbad,
    name: "simbad",
    id_column: "simbad_id",
    id_expression: "bs.main_id",
    epoch: Some(Epoch::julian_year(2000.0)),
    dialect: QueryDialect::Adql,
    source_table: "basic AS bs\n\tINNER JOIN ident ON bs.oid = ident.oidref\n\tINNER JOIN otypedef ON bs.otype = otypedef.otype",
    default_scope: &["bs"],
    fields: &[
        FieldMapping::new(Category::RA, "bs.ra", "bs"),
        FieldMapping::new(Category::Dec, "bs.dec", "bs"),
        FieldMapping::new(Category::PMRA, "bs.pmra", "bs"),
        FieldMapping::new(Category::PMDec, "bs.pmdec", "bs"),
        FieldMapping::new(Category::Parallax, "bs.plx_value", "bs"),
        // km/s
        FieldMapping::new(Category::RadialVelocity, "bs.rvz_radvel", "bs"),
        FieldMapping::new(Category::ObjectsInCircle, "", "bs"),
    ],
    object_types: &[
        ObjectTypeRule {
            object_type: ObjectType::Star,
            scope: &["bs"],
            join: None,
            predicate: Some("bs.otype LIKE '*%'"),
        },
        ObjectTypeRule {
            object_type: ObjectType::Galaxy,
            scope: &["bs"],
            join: None,
            predicate: Some("bs.otype = 'G'"),
        },
        ObjectTypeRule {
            object_type: ObjectType::Quasar,
            scope: &["bs"],
            join: None,
            predicate: Some("bs.otype = 'QSO'"),
        },
    ],
    companion_fields: &[
        CompanionField {
            expression: "ident.id",
            alias: "simbad_name",
        },
        CompanionField {
            expression: "bs.otype",
            alias: "simbad_otype",
        },
        CompanionField {
            expression: "otypedef.description",
            alias: "simbad_type_description",
        },
    ],
    response_format: "votable/td",
};
