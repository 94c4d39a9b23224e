//! The remote query service seam: everything the executor needs from a warehouse.

use crate::error::{RemoteError, Result};
use crate::query::Query;
use crate::value::{Field, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of one submitted job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl fmt::Display for JobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}:{}.{}", self.project_id, loc, self.job_id),
            None => write!(f, "{}:{}", self.project_id, self.job_id),
        }
    }
}

/// Everything needed to create a query job remotely.
#[derive(Clone, Debug)]
pub struct JobRequest<'a> {
    pub job_id: String,
    pub query: &'a Query,
    pub max_bytes_billed: Option<u64>,
    pub use_legacy_sql: bool,
    pub location: Option<String>,
}

/// Remote-side job status as observed by one poll.
#[derive(Clone, Debug, PartialEq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed(RemoteError),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed(_))
    }
}

/// One page of rows from a completed job.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowPage {
    pub schema: Vec<Field>,
    pub rows: Vec<Vec<Value>>,
    pub next_page_token: Option<String>,
}

/// Outbound collaborator: a remote tabular warehouse that runs query jobs.
///
/// Implementations block; `poll_job` must return within roughly `timeout`
/// even if the job is still running.
pub trait QueryService {
    /// Create the job. A placeholder without a binding is reported as `QueryError::Configuration`.
    fn insert_job(&self, request: &JobRequest<'_>) -> Result<JobReference>;

    /// Wait at most `timeout` for the job to finish, then report its status.
    fn poll_job(&self, job: &JobReference, timeout: Duration) -> Result<JobStatus>;

    /// Total row count of a completed job's result.
    fn total_rows(&self, job: &JobReference) -> Result<u64>;

    /// Read one page of results. `page_token = None` starts from the first row.
    fn read_page(&self, job: &JobReference, page_token: Option<&str>, max_results: Option<u32>) -> Result<RowPage>;
}

impl<S: QueryService + ?Sized> QueryService for &S {
    fn insert_job(&self, request: &JobRequest<'_>) -> Result<JobReference> {
        (**self).insert_job(request)
    }
    fn poll_job(&self, job: &JobReference, timeout: Duration) -> Result<JobStatus> {
        (**self).poll_job(job, timeout)
    }
    fn total_rows(&self, job: &JobReference) -> Result<u64> {
        (**self).total_rows(job)
    }
    fn read_page(&self, job: &JobReference, page_token: Option<&str>, max_results: Option<u32>) -> Result<RowPage> {
        (**self).read_page(job, page_token, max_results)
    }
}

impl<S: QueryService + ?Sized> QueryService for Box<S> {
    fn insert_job(&self, request: &JobRequest<'_>) -> Result<JobReference> {
        (**self).insert_job(request)
    }
    fn poll_job(&self, job: &JobReference, timeout: Duration) -> Result<JobStatus> {
        (**self).poll_job(job, timeout)
    }
    fn total_rows(&self, job: &JobReference) -> Result<u64> {
        (**self).total_rows(job)
    }
    fn read_page(&self, job: &JobReference, page_token: Option<&str>, max_results: Option<u32>) -> Result<RowPage> {
        (**self).read_page(job, page_token, max_results)
    }
}
