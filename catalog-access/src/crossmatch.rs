//! Cross-Match Coordinator.
//!
//! Runs a source catalog query, propagates the source positions to the target
//! catalog's epoch, uploads them to the target service as a bridging table,
//! runs a positional join there as an asynchronous job and left-joins the job
//! result back onto the source rows.
//!
//! The stages run strictly in sequence; each failure is reported with the
//! stage it happened in and all catalog and query context known so far.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::astrometry::{self, ADJUSTED_DEC, ADJUSTED_RA};
use crate::catalog::{CatalogDescriptor, CatalogSchema};
use crate::category::Category;
use crate::error::{phase, CatalogQueryError, CrossMatchError, CrossMatchStage};
use crate::executor::{decode_reply, CatalogQueryExecutor};
use crate::query_builder::QueryText;
use crate::table::{ResultTable, Row};
use crate::tap::{AdqlRequest, JobHandle, JobPhase, TableUpload, TapService};

/// Phase reported when the positional join matched nothing.
pub const EMPTY_RESULT: &str = "Cross matching result is empty";

/// Tunables of the cross-match workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossMatchSettings {
    /// Radius of the positional join, in degrees.
    pub match_radius_deg: f64,
    pub poll_interval: Duration,
    /// Longest time to wait for the remote job before aborting it.
    pub job_timeout: Duration,
    /// Name the bridging table is uploaded under.
    pub upload_table: String,
}

impl Default for CrossMatchSettings {
    fn default() -> Self {
        Self {
            match_radius_deg: 0.001,
            poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(300),
            upload_table: "tmp_table".to_string(),
        }
    }
}

/// Result of a successful cross-match.
#[derive(Debug, Clone)]
pub struct CrossMatchOutcome {
    pub source_catalog: String,
    pub source_query: String,
    pub target_catalog: String,
    pub crossmatch_query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub table: ResultTable,
}

/// Catalog and query context of one cross-match, used to tag failures.
struct Attempt<'a> {
    source: &'a CatalogDescriptor,
    target: &'a CatalogDescriptor,
    source_query: String,
    crossmatch_query: String,
}

impl Attempt<'_> {
    fn fail(
        &self,
        stage: CrossMatchStage,
        phase: impl Into<String>,
        detail: impl Into<String>,
    ) -> CrossMatchError {
        let error = CrossMatchError {
            stage,
            source_catalog: self.source.name.to_string(),
            source_query: self.source_query.clone(),
            target_catalog: self.target.name.to_string(),
            crossmatch_query: self.crossmatch_query.clone(),
            phase: phase.into(),
            detail: detail.into(),
            cause: None,
        };
        log::warn!(
            "Cross-match {} -> {} failed at {}: {}",
            error.source_catalog,
            error.target_catalog,
            stage,
            error.detail
        );
        error
    }

    fn source_failed(&self, cause: CatalogQueryError) -> CrossMatchError {
        let mut error = self.fail(
            CrossMatchStage::QuerySource,
            phase::SOURCE_FAILED,
            cause.to_string(),
        );
        error.source_query.clear();
        error.cause = Some(cause);
        error
    }
}

/// Positional-join query run by the target service against the uploaded
/// bridging table.
///
/// Projects the target's identity columns, its position as
/// `<target>_ra`/`<target>_dec` and the uploaded source identifier.
pub fn crossmatch_query(
    source: &CatalogDescriptor,
    target: &CatalogDescriptor,
    settings: &CrossMatchSettings,
) -> Option<QueryText> {
    let ra = target.field(Category::RA)?.expression;
    let dec = target.field(Category::Dec)?.expression;
    let upload = settings.upload_table.as_str();

    let mut projection = vec![format!("{} AS {}", target.id_expression, target.id_column)];
    projection.extend(
        target
            .companion_fields
            .iter()
            .map(|f| format!("{} AS {}", f.expression, f.alias)),
    );
    projection.push(format!("{ra} AS {}_ra", target.name));
    projection.push(format!("{dec} AS {}_dec", target.name));
    projection.push(format!("{upload}.{}", source.id_column));

    Some(QueryText::from(format!(
        "SELECT {}\nFROM {}\n\tINNER JOIN TAP_UPLOAD.{upload} ON 1=CONTAINS(POINT('ICRS', {ra}, {dec}), CIRCLE('ICRS', {upload}.{ADJUSTED_RA}, {upload}.{ADJUSTED_DEC}, {}))",
        projection.join(", "),
        target.source_table,
        settings.match_radius_deg,
    )))
}

/// Drives one source catalog against one target service.
///
/// The target service handle is injected so that several coordinators (or
/// tests) can point at different endpoints.
#[derive(Clone)]
pub struct CrossMatchCoordinator {
    executor: CatalogQueryExecutor,
    target_service: Arc<dyn TapService>,
    settings: CrossMatchSettings,
}

impl CrossMatchCoordinator {
    pub fn new(
        executor: CatalogQueryExecutor,
        target_service: Arc<dyn TapService>,
        settings: CrossMatchSettings,
    ) -> Self {
        Self {
            executor,
            target_service,
            settings,
        }
    }

    pub fn settings(&self) -> &CrossMatchSettings {
        &self.settings
    }

    /// Cross-match the rows returned by `source_query` against `target`.
    ///
    /// # Arguments
    ///
    /// * `source` - Catalog the source query runs against
    /// * `source_query` - Built query; its result must carry RA, Dec, PMRA and PMDec
    /// * `target` - Catalog served by this coordinator's target service
    ///
    /// # Returns
    ///
    /// Every source row, with the source identifier first, then the target
    /// identity columns, then the remaining columns. Source rows with several
    /// matches appear once per match; unmatched rows carry nulls.
    pub fn cross_match(
        &self,
        source: &CatalogDescriptor,
        source_query: &QueryText,
        target: &CatalogDescriptor,
    ) -> Result<CrossMatchOutcome, CrossMatchError> {
        let mut attempt = Attempt {
            source,
            target,
            source_query: source_query.as_str().to_string(),
            crossmatch_query: String::new(),
        };
        log::info!("Cross-matching {} against {}", source.name, target.name);

        // QuerySource
        let outcome = self
            .executor
            .query(source, source_query)
            .map_err(|e| attempt.source_failed(e))?;
        let mut table = outcome.table;

        // AdjustAstrometry
        let stage = CrossMatchStage::AdjustAstrometry;
        let from = source
            .epoch()
            .ok_or_else(|| attempt.fail(stage, stage.name(), format!("Catalog {} has no reference epoch", source.name)))?;
        let to = target
            .epoch()
            .ok_or_else(|| attempt.fail(stage, stage.name(), format!("Catalog {} has no reference epoch", target.name)))?;
        astrometry::adjust_to_epoch(&mut table, from, to)
            .map_err(|e| attempt.fail(stage, stage.name(), e.to_string()))?;

        // SubmitJob
        let stage = CrossMatchStage::SubmitJob;
        let query = crossmatch_query(source, target, &self.settings).ok_or_else(|| {
            attempt.fail(stage, stage.name(), format!("Catalog {} has no RA/Dec columns", target.name))
        })?;
        attempt.crossmatch_query = query.as_str().to_string();
        log::debug!("Cross-match query:\n{query}");

        let upload = table
            .select(&[source.id_column, ADJUSTED_RA, ADJUSTED_DEC])
            .map_err(|e| attempt.fail(stage, stage.name(), e.to_string()))?;
        let request = AdqlRequest::new(query.as_str(), target.response_format);
        let job = self
            .target_service
            .submit_job(
                &request,
                TableUpload {
                    name: &self.settings.upload_table,
                    table: &upload,
                },
            )
            .map_err(|e| attempt.fail(stage, stage.name(), e.to_string()))?;

        let merged = self.run_and_merge(&attempt, &job, &table);
        self.discard(&job);
        let merged = merged?;

        log::info!(
            "Cross-match {} -> {} produced {} rows",
            source.name,
            target.name,
            merged.num_rows()
        );
        Ok(CrossMatchOutcome {
            source_catalog: source.name.to_string(),
            source_query: attempt.source_query,
            target_catalog: target.name.to_string(),
            crossmatch_query: attempt.crossmatch_query,
            columns: merged.column_names(),
            rows: merged.records(),
            table: merged,
        })
    }

    /// Start `job`, wait for it and merge its result onto `source_table`.
    fn run_and_merge(
        &self,
        attempt: &Attempt<'_>,
        job: &JobHandle,
        source_table: &ResultTable,
    ) -> Result<ResultTable, CrossMatchError> {
        let stage = CrossMatchStage::SubmitJob;
        self.target_service
            .run_job(job)
            .map_err(|e| attempt.fail(stage, stage.name(), e.to_string()))?;

        // AwaitJob
        let job_phase = self.await_job(attempt, job)?;
        if job_phase != JobPhase::Completed {
            let summary = self
                .target_service
                .job_error_summary(job)
                .unwrap_or_else(|e| format!("Job ended in phase {job_phase}: {e}"));
            return Err(attempt.fail(CrossMatchStage::AwaitJob, job_phase.to_string(), summary));
        }

        // MergeResults
        let stage = CrossMatchStage::MergeResults;
        let reply = self
            .target_service
            .fetch_job_result(job)
            .map_err(|e| attempt.fail(stage, stage.name(), e.to_string()))?;
        let result = decode_reply(&reply).map_err(|detail| attempt.fail(stage, stage.name(), detail))?;
        if result.is_empty() {
            return Err(attempt.fail(
                stage,
                EMPTY_RESULT,
                format!("Job finished {job_phase} with no matching rows"),
            ));
        }

        let mut merged = source_table
            .left_join(&result, attempt.source.id_column)
            .map_err(|e| attempt.fail(stage, stage.name(), e.to_string()))?;
        if merged.is_empty() {
            return Err(attempt.fail(
                stage,
                EMPTY_RESULT,
                format!("Job finished {job_phase} with no matching rows"),
            ));
        }

        let mut leading = vec![attempt.source.id_column];
        leading.extend(attempt.target.identity_columns());
        merged.reorder_front(&leading);
        Ok(merged)
    }

    /// Poll until the job reaches a terminal phase. On timeout the job is
    /// aborted.
    fn await_job(&self, attempt: &Attempt<'_>, job: &JobHandle) -> Result<JobPhase, CrossMatchError> {
        let stage = CrossMatchStage::AwaitJob;
        let start = Instant::now();

        loop {
            let job_phase = self
                .target_service
                .job_phase(job)
                .map_err(|e| attempt.fail(stage, stage.name(), e.to_string()))?;
            if job_phase.is_terminal() {
                log::debug!("Job {job} finished in phase {job_phase} after {:?}", start.elapsed());
                return Ok(job_phase);
            }
            if start.elapsed() >= self.settings.job_timeout {
                if let Err(e) = self.target_service.abort_job(job) {
                    log::warn!("Failed to abort job {job}: {e}");
                }
                return Err(attempt.fail(
                    stage,
                    stage.name(),
                    format!(
                        "Job still {job_phase} after {:?}",
                        self.settings.job_timeout
                    ),
                ));
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    /// Delete the remote job. Failures are logged only.
    fn discard(&self, job: &JobHandle) {
        if let Err(e) = self.target_service.delete_job(job) {
            log::warn!("Failed to delete job {job}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GAIA, SDSS, SIMBAD};

    #[test]
    fn test_crossmatch_query_template() {
        let query = crossmatch_query(&GAIA, &SIMBAD, &CrossMatchSettings::default()).unwrap();
        let text = query.as_str();
        assert!(text.starts_with(
            "SELECT bs.main_id AS simbad_id, ident.id AS simbad_name, bs.otype AS simbad_otype, \
             otypedef.description AS simbad_type_description, bs.ra AS simbad_ra, \
             bs.dec AS simbad_dec, tmp_table.gaia_id\nFROM basic AS bs"
        ));
        assert!(text.ends_with(
            "INNER JOIN TAP_UPLOAD.tmp_table ON 1=CONTAINS(POINT('ICRS', bs.ra, bs.dec), \
             CIRCLE('ICRS', tmp_table.adjusted_ra, tmp_table.adjusted_dec, 0.001))"
        ));
    }

    #[test]
    fn test_crossmatch_query_uses_settings() {
        let settings = CrossMatchSettings {
            match_radius_deg: 0.0005,
            upload_table: "bridge".to_string(),
            ..Default::default()
        };
        let text = crossmatch_query(&GAIA, &SIMBAD, &settings).unwrap().into_string();
        assert!(text.contains("bridge.gaia_id"));
        assert!(text.contains("CIRCLE('ICRS', bridge.adjusted_ra, bridge.adjusted_dec, 0.0005)"));
    }

    #[test]
    fn test_target_without_position_has_no_template() {
        assert!(crossmatch_query(&GAIA, &SDSS, &CrossMatchSettings::default()).is_none());
    }
}
