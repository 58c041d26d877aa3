//! SDSS DR16. No categories are mapped yet and no service is configured by
//! default, so queries against it report "Not supported".

use super::{CatalogDescriptor, CatalogKey, QueryDialect};

pub static SDSS: CatalogDescriptor = CatalogDescriptor {
    key: CatalogKey::Sdss,
    name: "sdss",
    id_column: "sdss_id",
    id_expression: "p.objID",
    epoch: None,
    dialect: QueryDialect::Adql,
    source_table: "PhotoObj AS p",
    default_scope: &["p"],
    fields: &[],
    object_types: &[],
    companion_fields: &[],
    response_format: "votable",
};
