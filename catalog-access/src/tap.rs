//! Client for IVOA Table Access Protocol services.
//!
//! [`TapService`] is the seam between the query/cross-match logic and the
//! network: synchronous queries return the raw HTTP reply for the executor to
//! classify, asynchronous (UWS) job operations return typed results.
//! [`UreqTapService`] is the blocking HTTP implementation.

use std::fmt;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use ureq::Agent;
use url::Url;

use crate::table::ResultTable;
use crate::votable::{self, VoTableError};

const MULTIPART_BOUNDARY: &str = "----catalog-access-upload-7d1f3a9c2b";
const ERROR_EXCERPT_LEN: usize = 500;

/// Failures talking to a TAP service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error (status {status}): {message}")]
    ServerError { status: u16, message: String },
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(t) => TransportError::Timeout(t.to_string()),
            ureq::Error::Io(e) => TransportError::Connection(e.to_string()),
            e @ (ureq::Error::ConnectionFailed | ureq::Error::HostNotFound) => {
                TransportError::Connection(e.to_string())
            }
            e => TransportError::Protocol(e.to_string()),
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Leading part of the body as text, for error messages.
    pub fn excerpt(&self) -> String {
        excerpt(&self.body)
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(ERROR_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One query in a catalog's query language.
#[derive(Debug, Clone, PartialEq)]
pub struct AdqlRequest {
    pub query: String,
    /// Value of the `FORMAT` parameter.
    pub format: String,
}

impl AdqlRequest {
    pub fn new(query: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            format: format.into(),
        }
    }

    fn params(&self) -> [(&'static str, &str); 4] {
        [
            ("REQUEST", "doQuery"),
            ("LANG", "ADQL"),
            ("FORMAT", self.format.as_str()),
            ("QUERY", self.query.as_str()),
        ]
    }
}

/// A table uploaded alongside an asynchronous job, visible to the query as
/// `TAP_UPLOAD.<name>`.
#[derive(Debug, Clone, Copy)]
pub struct TableUpload<'a> {
    pub name: &'a str,
    pub table: &'a ResultTable,
}

/// Location of a submitted asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub url: String,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// UWS execution phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Queued,
    Running,
    Completed,
    Error,
    Aborted,
    Other(String),
}

impl JobPhase {
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "PENDING" => JobPhase::Pending,
            "QUEUED" => JobPhase::Queued,
            "EXECUTING" | "RUNNING" => JobPhase::Running,
            "COMPLETED" => JobPhase::Completed,
            "ERROR" => JobPhase::Error,
            "ABORTED" => JobPhase::Aborted,
            _ => JobPhase::Other(text.trim().to_string()),
        }
    }

    /// Whether the job will not change phase again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Error | JobPhase::Aborted)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Pending => f.write_str("PENDING"),
            JobPhase::Queued => f.write_str("QUEUED"),
            JobPhase::Running => f.write_str("RUNNING"),
            JobPhase::Completed => f.write_str("COMPLETED"),
            JobPhase::Error => f.write_str("ERROR"),
            JobPhase::Aborted => f.write_str("ABORTED"),
            JobPhase::Other(s) => f.write_str(s),
        }
    }
}

/// Remote query and job protocol of one catalog service.
///
/// Implementations must be shareable across threads; the coordinator and
/// executor hold them behind `Arc`.
pub trait TapService: Send + Sync {
    /// Run a synchronous query. Non-success statuses are returned, not raised.
    fn run_sync(&self, request: &AdqlRequest) -> Result<HttpReply, TransportError>;

    /// Create an asynchronous job with one uploaded table. The job is not
    /// started.
    fn submit_job(
        &self,
        request: &AdqlRequest,
        upload: TableUpload<'_>,
    ) -> Result<JobHandle, TransportError>;

    fn run_job(&self, job: &JobHandle) -> Result<(), TransportError>;

    fn job_phase(&self, job: &JobHandle) -> Result<JobPhase, TransportError>;

    /// Result document of a completed job.
    fn fetch_job_result(&self, job: &JobHandle) -> Result<HttpReply, TransportError>;

    /// Human-readable reason for a failed job.
    fn job_error_summary(&self, job: &JobHandle) -> Result<String, TransportError>;

    fn abort_job(&self, job: &JobHandle) -> Result<(), TransportError>;

    fn delete_job(&self, job: &JobHandle) -> Result<(), TransportError>;
}

/// Blocking HTTP TAP client.
#[derive(Debug, Clone)]
pub struct UreqTapService {
    base_url: Url,
    /// Follows redirects; used for queries and result downloads.
    agent: Agent,
    /// Returns redirects as-is so job locations can be read.
    no_redirect: Agent,
}

impl UreqTapService {
    /// Create a client for the service rooted at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - TAP service root, e.g. "https://gea.esac.esa.int/tap-server/tap"
    /// * `timeout` - Upper bound for each HTTP exchange
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let trimmed = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&trimmed)
            .map_err(|e| TransportError::Protocol(format!("Invalid service URL {base_url}: {e}")))?;

        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let no_redirect: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .build()
            .into();

        Ok(Self {
            base_url,
            agent,
            no_redirect,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    fn job_url(job: &JobHandle, suffix: &str) -> String {
        format!("{}/{}", job.url.trim_end_matches('/'), suffix)
    }

    fn read_reply(mut response: ureq::http::Response<ureq::Body>) -> Result<HttpReply, TransportError> {
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_vec()?;
        Ok(HttpReply { status, body })
    }

    fn expect_success(reply: HttpReply) -> Result<HttpReply, TransportError> {
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(TransportError::ServerError {
                status: reply.status,
                message: reply.excerpt(),
            })
        }
    }

    fn multipart_body(request: &AdqlRequest, upload: TableUpload<'_>) -> String {
        let upload_param = format!("{0},param:{0}", upload.name);
        let mut body = String::new();
        for (name, value) in request
            .params()
            .into_iter()
            .chain([("UPLOAD", upload_param.as_str())])
        {
            body.push_str(&format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{0}\"; filename=\"{0}.xml\"\r\nContent-Type: application/x-votable+xml\r\n\r\n",
            upload.name
        ));
        body.push_str(&votable::write(upload.table, upload.name));
        body.push_str(&format!("\r\n--{MULTIPART_BOUNDARY}--\r\n"));
        body
    }
}

/// Text of the first `jobId` element in a UWS job document.
fn uws_job_id(document: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(document);
    let mut buf = Vec::new();
    let mut in_job_id = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => in_job_id = e.local_name().as_ref() == b"jobId",
            Ok(Event::Text(ref e)) if in_job_id => {
                let id = e.unescape().ok()?.trim().to_string();
                return (!id.is_empty()).then_some(id);
            }
            Ok(Event::End(_)) => in_job_id = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

impl TapService for UreqTapService {
    fn run_sync(&self, request: &AdqlRequest) -> Result<HttpReply, TransportError> {
        let url = self.endpoint("sync")?;
        log::debug!("POST {url}");
        let response = self.agent.post(url.as_str()).send_form(request.params())?;
        Self::read_reply(response)
    }

    fn submit_job(
        &self,
        request: &AdqlRequest,
        upload: TableUpload<'_>,
    ) -> Result<JobHandle, TransportError> {
        let url = self.endpoint("async")?;
        log::debug!(
            "POST {url} with upload {} ({} rows)",
            upload.name,
            upload.table.num_rows()
        );
        let body = Self::multipart_body(request, upload);
        let response = self
            .no_redirect
            .post(url.as_str())
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .send(body.as_bytes())?;

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let reply = Self::expect_success_or_redirect(Self::read_reply(response)?)?;

        let job_url = match location {
            Some(location) => url
                .join(&location)
                .map_err(|e| TransportError::Protocol(format!("Invalid job location {location}: {e}")))?,
            None => {
                let id = uws_job_id(&reply.body).ok_or_else(|| {
                    TransportError::Protocol("Job creation returned neither Location nor jobId".into())
                })?;
                self.endpoint(&format!("async/{id}"))?
            }
        };
        log::info!("Created TAP job {job_url}");
        Ok(JobHandle {
            url: job_url.to_string(),
        })
    }

    fn run_job(&self, job: &JobHandle) -> Result<(), TransportError> {
        let response = self
            .no_redirect
            .post(Self::job_url(job, "phase"))
            .send_form([("PHASE", "RUN")])?;
        Self::expect_success_or_redirect(Self::read_reply(response)?).map(|_| ())
    }

    fn job_phase(&self, job: &JobHandle) -> Result<JobPhase, TransportError> {
        let response = self.agent.get(Self::job_url(job, "phase")).call()?;
        let reply = Self::expect_success(Self::read_reply(response)?)?;
        Ok(JobPhase::parse(&String::from_utf8_lossy(&reply.body)))
    }

    fn fetch_job_result(&self, job: &JobHandle) -> Result<HttpReply, TransportError> {
        let response = self.agent.get(Self::job_url(job, "results/result")).call()?;
        Self::read_reply(response)
    }

    fn job_error_summary(&self, job: &JobHandle) -> Result<String, TransportError> {
        let response = self.agent.get(Self::job_url(job, "error")).call()?;
        let reply = Self::expect_success(Self::read_reply(response)?)?;
        Ok(match votable::parse(&reply.body) {
            Err(VoTableError::QueryStatus(message)) => message,
            _ => reply.excerpt(),
        })
    }

    fn abort_job(&self, job: &JobHandle) -> Result<(), TransportError> {
        let response = self
            .no_redirect
            .post(Self::job_url(job, "phase"))
            .send_form([("PHASE", "ABORT")])?;
        Self::expect_success_or_redirect(Self::read_reply(response)?).map(|_| ())
    }

    fn delete_job(&self, job: &JobHandle) -> Result<(), TransportError> {
        let response = self.no_redirect.delete(&job.url).call()?;
        Self::expect_success_or_redirect(Self::read_reply(response)?).map(|_| ())
    }
}

impl UreqTapService {
    /// UWS answers state changes with `303 See Other`.
    fn expect_success_or_redirect(reply: HttpReply) -> Result<HttpReply, TransportError> {
        if (300..400).contains(&reply.status) {
            Ok(reply)
        } else {
            Self::expect_success(reply)
        }
    }
}
