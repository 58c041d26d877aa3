//! Entry points for a request boundary (CLI or web layer).
//!
//! [`CatalogService`] validates caller input, builds queries, runs them
//! through the executor or the cross-match coordinator and turns the outcome
//! into a serializable response envelope with a status code.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::catalog::{CatalogDescriptor, CatalogKey};
use crate::config::ServiceConfig;
use crate::crossmatch::{CrossMatchCoordinator, CrossMatchOutcome};
use crate::error::{phase, CrossMatchError, CrossMatchStage, StellarisError};
use crate::executor::{CatalogQueryExecutor, QueryOutcome};
use crate::filter::{FilterError, FilterSet, RequestParams};
use crate::query_builder::{self, QueryText};
use crate::table::Row;
use crate::tap::UreqTapService;

const SUCCESS: &str = "success";
const DB_NAME_KEY: &str = "db_name";
const DB_NAME_SRC_KEY: &str = "db_name_src";
const QUERY_PARAMS_KEY: &str = "query_params";

/// Envelope returned for catalog queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub catalog: String,
    pub query: String,
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub status: String,
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn success(outcome: QueryOutcome) -> Self {
        Self {
            catalog: outcome.catalog,
            query: outcome.query,
            columns: outcome.columns,
            data: outcome.rows,
            status: SUCCESS.to_string(),
            error: None,
        }
    }

    pub fn failure(error: &StellarisError) -> Self {
        let (catalog, query) = match error {
            StellarisError::CatalogQuery(e) => (e.catalog.clone(), e.query.clone()),
            StellarisError::CrossMatch(e) => (e.source_catalog.clone(), e.source_query.clone()),
            StellarisError::Input(_) | StellarisError::System(_) => Default::default(),
        };
        Self {
            catalog,
            query,
            columns: Vec::new(),
            data: Vec::new(),
            status: error.status_phase().to_string(),
            error: Some(error.to_string()),
        }
    }
}

/// Envelope returned for cross-matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossMatchResponse {
    pub catalog_source: String,
    pub query_source: String,
    pub catalog_to_match: String,
    pub crossmatch_query: String,
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub status: String,
    pub error: Option<String>,
}

impl CrossMatchResponse {
    pub fn success(outcome: CrossMatchOutcome) -> Self {
        Self {
            catalog_source: outcome.source_catalog,
            query_source: outcome.source_query,
            catalog_to_match: outcome.target_catalog,
            crossmatch_query: outcome.crossmatch_query,
            columns: outcome.columns,
            data: outcome.rows,
            status: SUCCESS.to_string(),
            error: None,
        }
    }

    pub fn failure(error: &StellarisError) -> Self {
        let mut response = Self {
            catalog_source: String::new(),
            query_source: String::new(),
            catalog_to_match: String::new(),
            crossmatch_query: String::new(),
            columns: Vec::new(),
            data: Vec::new(),
            status: error.status_phase().to_string(),
            error: Some(error.to_string()),
        };
        match error {
            StellarisError::CrossMatch(e) => {
                response.catalog_source = e.source_catalog.clone();
                response.query_source = e.source_query.clone();
                response.catalog_to_match = e.target_catalog.clone();
                response.crossmatch_query = e.crossmatch_query.clone();
            }
            StellarisError::CatalogQuery(e) => {
                response.catalog_source = e.catalog.clone();
                response.query_source = e.query.clone();
            }
            StellarisError::Input(_) | StellarisError::System(_) => {}
        }
        response
    }
}

/// Resolve a caller-supplied catalog name.
pub fn parse_catalog_key(field: &str, value: Option<&str>) -> Result<CatalogKey, StellarisError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StellarisError::input(format!("Absent {field} in the request")))?;
    value
        .parse()
        .map_err(|_| StellarisError::input(format!("Not supported DB name: {value}")))
}

fn parse_filter_object(filter_json: &str) -> Result<Map<String, Json>, FilterError> {
    match serde_json::from_str(filter_json) {
        Ok(Json::Object(object)) => Ok(object),
        Ok(_) => Err(FilterError::NotAnObject),
        Err(e) => Err(FilterError::InvalidJson(e.to_string())),
    }
}

/// Split a request body into its catalog key and validated parameters.
///
/// `query_params` may be a JSON object or a string holding one.
fn parse_request(body: &str, catalog_field: &str) -> Result<(CatalogKey, RequestParams), StellarisError> {
    let request: Json = serde_json::from_str(body)
        .map_err(|e| StellarisError::input(format!("Invalid JSON for the request: {e}")))?;
    let key = parse_catalog_key(catalog_field, request.get(catalog_field).and_then(Json::as_str))?;

    let params = match request.get(QUERY_PARAMS_KEY) {
        Some(Json::String(text)) if !text.trim().is_empty() => RequestParams::from_json_str(text)?,
        Some(object @ Json::Object(_)) => RequestParams::from_json_str(&object.to_string())?,
        _ => {
            return Err(StellarisError::input(format!(
                "Absent '{QUERY_PARAMS_KEY}' in the request"
            )))
        }
    };
    Ok((key, params))
}

/// Catalog queries and cross-matches over a fixed set of services.
#[derive(Clone)]
pub struct CatalogService {
    executor: CatalogQueryExecutor,
    coordinator: Option<CrossMatchCoordinator>,
    target: CatalogKey,
}

impl CatalogService {
    /// Assemble a service from already-constructed parts.
    ///
    /// `coordinator` is `None` when the cross-match target has no service.
    pub fn new(
        executor: CatalogQueryExecutor,
        coordinator: Option<CrossMatchCoordinator>,
        target: CatalogKey,
    ) -> Self {
        Self {
            executor,
            coordinator,
            target,
        }
    }

    /// Connect to every catalog with a configured endpoint.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StellarisError> {
        let timeout = config.http_timeout.0;
        let mut executor = CatalogQueryExecutor::new();
        for key in CatalogKey::ALL {
            if let Some(url) = config.endpoints.url(key) {
                let service = UreqTapService::new(url, timeout)
                    .map_err(|e| StellarisError::System(e.to_string()))?;
                log::debug!("{key} served by {}", service.base_url());
                executor = executor.with_service(key, Arc::new(service));
            }
        }

        let target = config.crossmatch.target;
        let coordinator = executor.service(target).map(|service| {
            CrossMatchCoordinator::new(executor.clone(), service, config.crossmatch.settings())
        });
        Ok(Self::new(executor, coordinator, target))
    }

    /// Catalog every cross-match runs against.
    pub fn crossmatch_target(&self) -> CatalogKey {
        self.target
    }

    /// Build the query text for `key` without running it.
    pub fn build_query(
        &self,
        key: CatalogKey,
        params: &RequestParams,
    ) -> Result<QueryText, StellarisError> {
        Ok(query_builder::build(key.descriptor(), &params.filters, params.limit)?)
    }

    /// Run a filtered query against one catalog.
    ///
    /// # Arguments
    ///
    /// * `catalog_key` - Catalog name, case-insensitive
    /// * `filter_json` - JSON object of bounds, `object_types` and cone filter
    /// * `limit` - Maximum number of rows
    /// * `chunk_size` - Accepted in place of `limit`; results are not paged
    pub fn query_catalog(
        &self,
        catalog_key: &str,
        filter_json: &str,
        limit: Option<u32>,
        chunk_size: Option<u32>,
    ) -> Result<QueryOutcome, StellarisError> {
        let key = parse_catalog_key(DB_NAME_KEY, Some(catalog_key))?;
        let filters = FilterSet::from_json(&parse_filter_object(filter_json)?)?;
        let params = RequestParams::new(filters, limit, chunk_size)?;
        self.run_query(key, &params)
    }

    /// Cross-match the rows selected from `source_key` against the
    /// configured target catalog.
    pub fn cross_match(
        &self,
        source_key: &str,
        filter_json: &str,
        limit: Option<u32>,
        chunk_size: Option<u32>,
    ) -> Result<CrossMatchOutcome, StellarisError> {
        let key = parse_catalog_key(DB_NAME_SRC_KEY, Some(source_key))?;
        let filters = FilterSet::from_json(&parse_filter_object(filter_json)?)?;
        let params = RequestParams::new(filters, limit, chunk_size)?;
        self.run_cross_match(key, &params)
    }

    pub fn run_query(
        &self,
        key: CatalogKey,
        params: &RequestParams,
    ) -> Result<QueryOutcome, StellarisError> {
        let descriptor = key.descriptor();
        let query = self.build_query(key, params)?;
        log::info!("Query request for {}", descriptor.name);
        Ok(self.executor.query(descriptor, &query)?)
    }

    pub fn run_cross_match(
        &self,
        key: CatalogKey,
        params: &RequestParams,
    ) -> Result<CrossMatchOutcome, StellarisError> {
        let source = key.descriptor();
        let target = self.target.descriptor();
        let query = self.build_query(key, params)?;
        log::info!("Cross-match request {} -> {}", source.name, target.name);

        let Some(coordinator) = &self.coordinator else {
            return Err(unsupported_target(source, target).into());
        };
        Ok(coordinator.cross_match(source, &query, target)?)
    }

    /// Handle a query request body `{"db_name": ..., "query_params": ...}`.
    ///
    /// # Returns
    ///
    /// The status code (200, or the error class code) and the envelope.
    pub fn process_query(&self, body: &str) -> (u16, QueryResponse) {
        let result = parse_request(body, DB_NAME_KEY).and_then(|(key, params)| self.run_query(key, &params));
        match result {
            Ok(outcome) => (200, QueryResponse::success(outcome)),
            Err(e) => {
                log::warn!("Query request failed ({}): {e}", e.status_phase());
                (e.class().status_code(), QueryResponse::failure(&e))
            }
        }
    }

    /// Handle a cross-match request body `{"db_name_src": ..., "query_params": ...}`.
    pub fn process_cross_match(&self, body: &str) -> (u16, CrossMatchResponse) {
        let result = parse_request(body, DB_NAME_SRC_KEY)
            .and_then(|(key, params)| self.run_cross_match(key, &params));
        match result {
            Ok(outcome) => (200, CrossMatchResponse::success(outcome)),
            Err(e) => {
                log::warn!("Cross-match request failed ({}): {e}", e.status_phase());
                (e.class().status_code(), CrossMatchResponse::failure(&e))
            }
        }
    }
}

fn unsupported_target(source: &CatalogDescriptor, target: &CatalogDescriptor) -> CrossMatchError {
    CrossMatchError {
        stage: CrossMatchStage::SubmitJob,
        source_catalog: source.name.to_string(),
        source_query: String::new(),
        target_catalog: target.name.to_string(),
        crossmatch_query: String::new(),
        phase: phase::NOT_SUPPORTED.to_string(),
        detail: format!("Cross-matching against {} is not supported", target.name),
        cause: None,
    }
}
