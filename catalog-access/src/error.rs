//! Error taxonomy shared by the query and cross-match paths.
//!
//! Every failure that reaches a caller is one of four kinds: an input error
//! detected before any remote call, a catalog query error, a cross-match error
//! or an unclassified system error. The catalog and cross-match kinds carry
//! the catalog names and query text known at the point of failure together
//! with a short phase label.

use std::fmt;

use crate::filter::FilterError;
use crate::query_builder::QueryBuildError;

/// Phase labels attached to catalog query failures.
pub mod phase {
    /// Transport failure: connection refused, timeout, malformed exchange.
    pub const PROCESSING: &str = "Error processing request";
    /// Non-success status or unparsable payload.
    pub const API_FAILED: &str = "API request failed";
    /// Catalog has no configured remote service.
    pub const NOT_SUPPORTED: &str = "Not supported";
    /// Cross-match aborted because the source query failed.
    pub const SOURCE_FAILED: &str = "Request to source catalog failed";
    pub const INPUT: &str = "Input error";
    pub const SYSTEM: &str = "System error";
}

/// A failed query against one catalog.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{detail}")]
pub struct CatalogQueryError {
    pub catalog: String,
    /// Query text sent, or empty when the failure preceded building it.
    pub query: String,
    pub phase: String,
    pub detail: String,
}

impl CatalogQueryError {
    pub fn new(
        catalog: impl Into<String>,
        query: impl Into<String>,
        phase: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            query: query.into(),
            phase: phase.into(),
            detail: detail.into(),
        }
    }

    pub fn status_phase(&self) -> &str {
        &self.phase
    }
}

/// Stage of the cross-match workflow at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossMatchStage {
    QuerySource,
    AdjustAstrometry,
    SubmitJob,
    AwaitJob,
    MergeResults,
}

impl CrossMatchStage {
    pub fn name(&self) -> &'static str {
        match self {
            CrossMatchStage::QuerySource => "QuerySource",
            CrossMatchStage::AdjustAstrometry => "AdjustAstrometry",
            CrossMatchStage::SubmitJob => "SubmitJob",
            CrossMatchStage::AwaitJob => "AwaitJob",
            CrossMatchStage::MergeResults => "MergeResults",
        }
    }
}

impl fmt::Display for CrossMatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed cross-match.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{detail}")]
pub struct CrossMatchError {
    pub stage: CrossMatchStage,
    pub source_catalog: String,
    pub source_query: String,
    pub target_catalog: String,
    pub crossmatch_query: String,
    pub phase: String,
    pub detail: String,
    /// Source query failure this error wraps, if any.
    #[source]
    pub cause: Option<CatalogQueryError>,
}

impl CrossMatchError {
    pub fn status_phase(&self) -> &str {
        &self.phase
    }
}

/// How a failure is reported at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Input,
    Catalog,
    System,
}

impl ErrorClass {
    /// Response status code used for this class.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorClass::Input => 400,
            ErrorClass::Catalog => 401,
            ErrorClass::System => 500,
        }
    }
}

/// Top-level error returned by [`crate::service::CatalogService`].
#[derive(Debug, thiserror::Error)]
pub enum StellarisError {
    #[error("{0}")]
    Input(String),

    #[error(transparent)]
    CatalogQuery(#[from] CatalogQueryError),

    #[error(transparent)]
    CrossMatch(#[from] CrossMatchError),

    #[error("{0}")]
    System(String),
}

impl StellarisError {
    pub fn input(message: impl Into<String>) -> Self {
        StellarisError::Input(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StellarisError::Input(_) => ErrorClass::Input,
            StellarisError::CatalogQuery(_) | StellarisError::CrossMatch(_) => ErrorClass::Catalog,
            StellarisError::System(_) => ErrorClass::System,
        }
    }

    pub fn status_phase(&self) -> &str {
        match self {
            StellarisError::Input(_) => phase::INPUT,
            StellarisError::CatalogQuery(e) => e.status_phase(),
            StellarisError::CrossMatch(e) => e.status_phase(),
            StellarisError::System(_) => phase::SYSTEM,
        }
    }
}

impl From<FilterError> for StellarisError {
    fn from(e: FilterError) -> Self {
        StellarisError::Input(e.to_string())
    }
}

impl From<QueryBuildError> for StellarisError {
    fn from(e: QueryBuildError) -> Self {
        StellarisError::Input(e.to_string())
    }
}
