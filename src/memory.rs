//! Scripted in-process warehouse. Jobs complete on a simulated clock, so polls never sleep.
//! Used by the tests and by the demo binary when no credentials are configured.

use crate::error::{QueryError, RemoteError, Result};
use crate::query::{QueryParam, DEFAULT_COMMENT_COLUMNS};
use crate::result::Row;
use crate::service::{JobReference, JobRequest, JobStatus, QueryService, RowPage};
use crate::value::{Field, FieldType, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Canned behaviour for jobs whose query text matches.
#[derive(Clone, Debug, Default)]
pub struct ScriptedJob {
    schema: Vec<Field>,
    rows: Vec<Row>,
    latency: Duration,
    failure: Option<RemoteError>,
    bytes_processed: u64,
    interruptions: BTreeMap<usize, usize>, // page index -> failures left
}

impl ScriptedJob {
    pub fn rows(schema: Vec<Field>, rows: Vec<Row>) -> Self {
        Self { schema, rows, ..Default::default() }
    }
    /// Simulated time from submission until the job is terminal.
    pub fn completes_after(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
    pub fn fails_with(mut self, err: RemoteError) -> Self {
        self.failure = Some(err);
        self
    }
    /// Bytes the job would bill; above the request's ceiling the job fails remotely.
    pub fn bytes_processed(mut self, bytes: u64) -> Self {
        self.bytes_processed = bytes;
        self
    }
    /// Reading page `page` (0-based) fails `times` times before it succeeds.
    pub fn interrupt_page(mut self, page: usize, times: usize) -> Self {
        self.interruptions.insert(page, times);
        self
    }
}

/// What the service saw for one `insert_job`.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub query: String,
    pub params: BTreeMap<String, QueryParam>,
    pub max_bytes_billed: Option<u64>,
    pub location: Option<String>,
}

struct SimJob {
    script: ScriptedJob,
    ceiling: Option<u64>,
    clock: Duration,
}

impl SimJob {
    fn finished(&self) -> bool { self.clock >= self.script.latency }

    fn terminal_status(&self) -> JobStatus {
        if let Some(err) = &self.script.failure {
            return JobStatus::Failed(err.clone());
        }
        if let Some(limit) = self.ceiling {
            if self.script.bytes_processed > limit {
                return JobStatus::Failed(
                    RemoteError::new(format!(
                        "Query exceeded limit for bytes billed: {limit}. {} or higher required.",
                        self.script.bytes_processed
                    ))
                    .with_reason("bytesBilledLimitExceeded"),
                );
            }
        }
        JobStatus::Done
    }
}

#[derive(Default)]
struct State {
    routes: Vec<(String, ScriptedJob)>,
    fallback: Option<ScriptedJob>,
    jobs: HashMap<String, SimJob>,
    submitted: Vec<SubmittedJob>,
    polls: u64,
    page_reads: u64,
}

pub struct InMemoryService {
    project_id: String,
    default_page_size: u32,
    state: Mutex<State>,
}

impl InMemoryService {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self { project_id: project_id.into(), default_page_size: 1000, state: Mutex::new(State::default()) }
    }

    /// Rows per page when the reader does not ask for a size.
    pub fn page_size(mut self, rows: u32) -> Self {
        self.default_page_size = rows.max(1);
        self
    }

    /// Script for every query not matched by `respond_to`.
    pub fn respond(self, job: ScriptedJob) -> Self {
        self.state.lock().fallback = Some(job);
        self
    }

    /// Script for queries whose text contains `needle`. First registered match wins.
    pub fn respond_to(self, needle: impl Into<String>, job: ScriptedJob) -> Self {
        self.state.lock().routes.push((needle.into(), job));
        self
    }

    pub fn submitted(&self) -> Vec<SubmittedJob> { self.state.lock().submitted.clone() }
    pub fn jobs_submitted(&self) -> usize { self.state.lock().submitted.len() }
    pub fn polls(&self) -> u64 { self.state.lock().polls }
    pub fn page_reads(&self) -> u64 { self.state.lock().page_reads }

    /// Simulated time that has passed for a job.
    pub fn simulated_elapsed(&self, job_id: &str) -> Option<Duration> {
        self.state.lock().jobs.get(job_id).map(|j| j.clock)
    }

    fn reference(&self, job_id: &str, location: Option<String>) -> JobReference {
        JobReference { project_id: self.project_id.clone(), job_id: job_id.to_string(), location }
    }
}

fn not_found(job: &JobReference) -> QueryError {
    QueryError::transport(format!("Not found: Job {job}"))
}

impl QueryService for InMemoryService {
    fn insert_job(&self, request: &JobRequest<'_>) -> Result<JobReference> {
        let query = request.query;
        if request.use_legacy_sql && !query.params().is_empty() {
            return Err(QueryError::configuration("Query parameters cannot be used in legacy SQL queries"));
        }
        if let Some(name) = query.unbound_placeholders().first() {
            return Err(QueryError::configuration(format!("Query parameter '{name}' not found")));
        }

        let mut st = self.state.lock();
        if st.jobs.contains_key(&request.job_id) {
            return Err(QueryError::configuration(format!("Already Exists: Job {}", request.job_id)));
        }
        let script = st
            .routes
            .iter()
            .find(|(needle, _)| query.text().contains(needle.as_str()))
            .map(|(_, s)| s.clone())
            .or_else(|| st.fallback.clone())
            .ok_or_else(|| QueryError::configuration("no table matches the query"))?;

        st.submitted.push(SubmittedJob {
            job_id: request.job_id.clone(),
            query: query.text().to_string(),
            params: query.params().clone(),
            max_bytes_billed: request.max_bytes_billed,
            location: request.location.clone(),
        });
        st.jobs.insert(
            request.job_id.clone(),
            SimJob { script, ceiling: request.max_bytes_billed, clock: Duration::ZERO },
        );
        Ok(self.reference(&request.job_id, request.location.clone()))
    }

    fn poll_job(&self, job: &JobReference, timeout: Duration) -> Result<JobStatus> {
        let mut st = self.state.lock();
        st.polls += 1;
        let sim = st.jobs.get_mut(&job.job_id).ok_or_else(|| not_found(job))?;
        if !sim.finished() {
            let remaining = sim.script.latency - sim.clock;
            sim.clock += remaining.min(timeout);
        }
        if sim.finished() { Ok(sim.terminal_status()) } else { Ok(JobStatus::Running) }
    }

    fn total_rows(&self, job: &JobReference) -> Result<u64> {
        let st = self.state.lock();
        let sim = st.jobs.get(&job.job_id).ok_or_else(|| not_found(job))?;
        if !sim.finished() {
            return Err(QueryError::transport(format!("job {job} is not complete")));
        }
        Ok(sim.script.rows.len() as u64)
    }

    fn read_page(&self, job: &JobReference, page_token: Option<&str>, max_results: Option<u32>) -> Result<RowPage> {
        let mut st = self.state.lock();
        st.page_reads += 1;
        let sim = st.jobs.get_mut(&job.job_id).ok_or_else(|| not_found(job))?;
        if !sim.finished() || sim.terminal_status() != JobStatus::Done {
            return Err(QueryError::transport(format!("job {job} has no result to read")));
        }

        let size = max_results.unwrap_or(self.default_page_size).max(1) as usize;
        let offset = match page_token {
            None => 0,
            Some(t) => t.parse::<usize>().map_err(|_| QueryError::transport(format!("invalid page token {t:?}")))?,
        };
        let page_index = offset / size;
        if let Some(left) = sim.script.interruptions.get_mut(&page_index) {
            if *left > 0 {
                *left -= 1;
                return Err(QueryError::transient(format!("connection reset while reading page {page_index} of {job}")));
            }
        }

        let rows = &sim.script.rows;
        let end = (offset + size).min(rows.len());
        let start = offset.min(end);
        Ok(RowPage {
            schema: sim.script.schema.clone(),
            rows: rows[start..end].to_vec(),
            next_page_token: if end < rows.len() { Some(end.to_string()) } else { None },
        })
    }
}

/// Schema of the comment columns selected by default.
pub fn comment_schema() -> Vec<Field> {
    DEFAULT_COMMENT_COLUMNS
        .iter()
        .map(|name| {
            let t = match *name {
                "created_utc" | "score" => FieldType::Integer,
                _ => FieldType::String,
            };
            Field::new(*name, t)
        })
        .collect()
}

/// A few 2005 comments shaped like the public dataset, for dry runs.
pub fn demo_comment_rows(subreddit: &str, n: usize) -> Vec<Row> {
    let authors = ["kn0thing", "spez", "[deleted]", "jedberg", "KeyserSosa"];
    (0..n)
        .map(|i| {
            let id = format!("c{:05}", i);
            vec![
                Value::from(format!("sample comment {i}")),
                Value::from(authors[i % authors.len()]),
                Value::Int(1_134_028_003 + (i as i64) * 97),
                Value::from(id),
                Value::from(format!("t3_{:05}", i / 3)),
                Value::from(format!("t3_{:05}", i / 3)),
                Value::from(subreddit),
                Value::Int((i as i64 * 7) % 23 - 2),
            ]
        })
        .collect()
}
