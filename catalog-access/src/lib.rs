//! Catalog-agnostic access to astronomical catalogs
//!
//! This crate builds catalog-native queries from a shared vocabulary of
//! physical categories, runs them against TAP services and cross-matches the
//! results of one catalog against another, propagating positions between the
//! catalogs' epochs.

pub mod astrometry;
pub mod catalog;
pub mod category;
pub mod config;
pub mod crossmatch;
pub mod error;
pub mod executor;
pub mod filter;
pub mod query_builder;
pub mod service;
pub mod table;
pub mod tap;
pub mod votable;

pub use astrometry::{adjust_to_epoch, AstrometryError, Epoch, SkyMotion};
pub use catalog::{CatalogDescriptor, CatalogKey, CatalogSchema, GAIA, SDSS, SIMBAD, STELLARIS};
pub use category::{Category, ObjectType};
pub use config::{ConfigError, ServiceConfig};
pub use crossmatch::{CrossMatchCoordinator, CrossMatchOutcome, CrossMatchSettings};
pub use error::{CatalogQueryError, CrossMatchError, CrossMatchStage, ErrorClass, StellarisError};
pub use executor::{CatalogQueryExecutor, QueryOutcome};
pub use filter::{CircleFilter, FilterError, FilterSet, RequestParams};
pub use query_builder::{build, QueryBuildError, QueryText};
pub use service::{CatalogService, CrossMatchResponse, QueryResponse};
pub use table::{Column, DataType, ResultTable, Row, TableError, Value};
pub use tap::{TapService, TransportError, UreqTapService};
pub use votable::VoTableError;
