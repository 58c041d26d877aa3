//! Gaia DR3 through the ESA TAP service.

use super::{CatalogDescriptor, CatalogKey, FieldMapping, ObjectTypeRule, QueryDialect};
use crate::astrometry::Epoch;
use crate::category::{Category, ObjectType};

pub static GAIA: CatalogDescriptor = CatalogDescriptor {
    key: CatalogKey::Gaia,
    name: "gaia",
    id_column: "gaia_id",
    id_expression: "gs.source_id",
    // DR3 positions are at J2016.0; the older DR2-era J2015.5 does not apply
    // to gaiadr3.gaia_source.
    epoch: Some(Epoch::julian_year(2016.0)),
    dialect: QueryDialect::Adql,
    source_table: "gaiadr3.gaia_source AS gs",
    default_scope: &["gs"],
    fields: &[
        // gaiadr3.gaia_source AS gs
        FieldMapping::new(Category::RA, "gs.ra", "gs"),
        FieldMapping::new(Category::Dec, "gs.dec", "gs"),
        FieldMapping::new(Category::PMRA, "gs.pmra", "gs"),
        FieldMapping::new(Category::PMDec, "gs.pmdec", "gs"),
        FieldMapping::new(Category::Parallax, "gs.parallax", "gs"),
        FieldMapping::new(Category::ProperMotion, "gs.pm", "gs"),
        FieldMapping::new(Category::GMagnitude, "gs.phot_g_mean_mag", "gs"),
        FieldMapping::new(Category::BPMagnitude, "gs.phot_bp_mean_mag", "gs"),
        FieldMapping::new(Category::RPMagnitude, "gs.phot_rp_mean_mag", "gs"),
        FieldMapping::new(Category::RadialVelocity, "gs.radial_velocity", "gs"),
        FieldMapping::new(Category::ObjectsInCircle, "", "gs"),
        // gaiadr3.astrophysical_parameters AS obj, stars only
        FieldMapping::new(Category::Mass, "obj.mass_flame", "obj"),
        FieldMapping::new(Category::Radius, "obj.radius_flame", "obj"),
        FieldMapping::new(Category::Luminosity, "obj.lum_flame", "obj"),
        FieldMapping::new(Category::Temperature, "obj.teff_gspphot", "obj"),
        FieldMapping::new(Category::Gravity, "obj.logg_gspphot", "obj"),
    ],
    object_types: &[
        ObjectTypeRule {
            object_type: ObjectType::Star,
            scope: &["gs", "obj"],
            join: Some(
                "INNER JOIN gaiadr3.astrophysical_parameters AS obj ON obj.source_id = gs.source_id",
            ),
            predicate: None,
        },
        ObjectTypeRule {
            object_type: ObjectType::Galaxy,
            scope: &["gs"],
            join: None,
            predicate: Some(
                "gs.classprob_dsc_combmod_galaxy > 0.8 AND ABS(gs.parallax) < 0.1 AND ABS(gs.pmra) < 0.1 AND ABS(gs.pmdec) < 0.1",
            ),
        },
        ObjectTypeRule {
            object_type: ObjectType::Quasar,
            scope: &["gs"],
            join: None,
            predicate: Some(
                "gs.classprob_dsc_combmod_quasar > 0.8 AND ABS(gs.parallax) < 0.1 AND ABS(gs.pmra) < 0.1 AND ABS(gs.pmdec) < 0.1",
            ),
        },
    ],
    companion_fields: &[],
    response_format: "votable_plain",
};
