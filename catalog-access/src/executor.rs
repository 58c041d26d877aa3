//! Catalog Query Executor: runs built queries against a catalog's service.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{CatalogDescriptor, CatalogKey};
use crate::error::{phase, CatalogQueryError};
use crate::query_builder::QueryText;
use crate::table::{ResultTable, Row};
use crate::tap::{AdqlRequest, HttpReply, TapService};
use crate::votable;

/// Result of one catalog query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub catalog: String,
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub table: ResultTable,
}

/// Decode a successful VOTable reply, or classify the failure.
pub(crate) fn decode_reply(reply: &HttpReply) -> Result<ResultTable, String> {
    if !reply.is_success() {
        return Err(format!("HTTP error {}: {}", reply.status, reply.excerpt()));
    }
    votable::parse(&reply.body).map_err(|e| e.to_string())
}

/// Routes queries to the service registered for each catalog.
#[derive(Clone, Default)]
pub struct CatalogQueryExecutor {
    services: HashMap<CatalogKey, Arc<dyn TapService>>,
}

impl CatalogQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the service answering queries for `key`.
    pub fn with_service(mut self, key: CatalogKey, service: Arc<dyn TapService>) -> Self {
        self.services.insert(key, service);
        self
    }

    pub fn service(&self, key: CatalogKey) -> Option<Arc<dyn TapService>> {
        self.services.get(&key).cloned()
    }

    pub fn supports(&self, key: CatalogKey) -> bool {
        self.services.contains_key(&key)
    }

    /// Run `query` against the catalog described by `descriptor`.
    ///
    /// # Returns
    ///
    /// The parsed table with the identifier column first, plus its column
    /// names and rows as ordered records.
    ///
    /// # Errors
    ///
    /// A [`CatalogQueryError`] tagged with the catalog name, the query text
    /// and one of the phases in [`crate::error::phase`].
    pub fn query(
        &self,
        descriptor: &CatalogDescriptor,
        query: &QueryText,
    ) -> Result<QueryOutcome, CatalogQueryError> {
        let Some(service) = self.services.get(&descriptor.key) else {
            return Err(CatalogQueryError::new(
                descriptor.name,
                "",
                phase::NOT_SUPPORTED,
                format!("Catalog {} is not supported", descriptor.name),
            ));
        };

        let request = AdqlRequest::new(query.as_str(), descriptor.response_format);
        log::info!("Querying {}", descriptor.name);
        let reply = service.run_sync(&request).map_err(|e| {
            log::warn!("Request to {} failed: {e}", descriptor.name);
            CatalogQueryError::new(descriptor.name, query.as_str(), phase::PROCESSING, e.to_string())
        })?;

        let mut table = decode_reply(&reply).map_err(|detail| {
            log::warn!("{} returned an unusable reply: {detail}", descriptor.name);
            CatalogQueryError::new(descriptor.name, query.as_str(), phase::API_FAILED, detail)
        })?;
        table.reorder_front(&[descriptor.id_column]);
        log::info!("{} returned {} rows", descriptor.name, table.num_rows());

        Ok(QueryOutcome {
            catalog: descriptor.name.to_string(),
            query: query.as_str().to_string(),
            columns: table.column_names(),
            rows: table.records(),
            table,
        })
    }
}
