//! The Stellaris catalog: a PostgreSQL mirror of Gaia-derived columns.

use super::{CatalogDescriptor, CatalogKey, FieldMapping, ObjectTypeRule, QueryDialect};
use crate::category::{Category, ObjectType};

pub static STELLARIS: CatalogDescriptor = CatalogDescriptor {
    key: CatalogKey::Stellaris,
    name: "stellaris",
    id_column: "stellaris_id",
    id_expression: "gs.source_id",
    epoch: None,
    dialect: QueryDialect::Postgres,
    source_table: "stellaris.sources AS gs",
    default_scope: &["gs"],
    fields: &[
        FieldMapping::new(Category::RA, "gs.ra", "gs"),
        FieldMapping::new(Category::Dec, "gs.dec", "gs"),
        FieldMapping::new(Category::Parallax, "gs.parallax", "gs"),
        FieldMapping::new(Category::ProperMotion, "gs.pm", "gs"),
        FieldMapping::new(Category::GMagnitude, "gs.phot_g_mean_mag", "gs"),
        FieldMapping::new(Category::BPMagnitude, "gs.phot_bp_mean_mag", "gs"),
        FieldMapping::new(Category::RPMagnitude, "gs.phot_rp_mean_mag", "gs"),
        FieldMapping::new(Category::RadialVelocity, "gs.radial_velocity", "gs"),
        FieldMapping::new(Category::ObjectsInCircle, "", "gs"),
        FieldMapping::new(Category::Mass, "obj.mass_flame", "obj"),
        FieldMapping::new(Category::Radius, "obj.radius_flame", "obj"),
        FieldMapping::new(Category::Luminosity, "obj.lum_flame", "obj"),
        FieldMapping::new(Category::Temperature, "obj.teff_gspphot", "obj"),
        FieldMapping::new(Category::Gravity, "obj.logg_gspphot", "obj"),
    ],
    object_types: &[ObjectTypeRule {
        object_type: ObjectType::Star,
        scope: &["gs", "obj"],
        join: Some(
            "INNER JOIN stellaris.astrophysical_parameters AS obj ON obj.source_id = gs.source_id",
        ),
        predicate: None,
    }],
    companion_fields: &[],
    response_format: "votable",
};
