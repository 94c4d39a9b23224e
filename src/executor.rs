//! Query executor: submit a parameterized job, wait for it with bounded polls,
//! and materialize its rows.

use crate::config::{ExecutorOptions, MIN_POLL_INTERVAL};
use crate::error::{QueryError, Result};
use crate::job::{Job, JobState};
use crate::progress::{make_count_progress, make_poll_spinner};
use crate::query::Query;
use crate::result::ResultSet;
use crate::rows::Rows;
use crate::service::{JobRequest, JobStatus, QueryService};
use crate::util::{init_tracing_once, next_job_id};
use indicatif::ProgressBar;
use std::thread::sleep;
use std::time::Duration;

/// Runs query jobs against an explicitly owned client.
/// The caller creates the client, hands it over here, and gets it back with `into_client`.
pub struct QueryExecutor<S: QueryService> {
    client: S,
    opts: ExecutorOptions,
}

impl<S: QueryService> QueryExecutor<S> {
    pub fn new(client: S) -> Self {
        Self::with_options(client, ExecutorOptions::default())
    }

    pub fn with_options(client: S, opts: ExecutorOptions) -> Self {
        init_tracing_once();
        Self { client, opts }
    }

    // -------- Builder methods --------
    pub fn max_bytes_billed(mut self, bytes: u64) -> Self { self.opts = self.opts.with_max_bytes_billed(bytes); self }
    pub fn poll_interval(mut self, interval: Duration) -> Self { self.opts = self.opts.with_poll_interval(interval); self }
    pub fn job_id_prefix(mut self, prefix: impl AsRef<str>) -> Self { self.opts = self.opts.with_job_id_prefix(prefix); self }
    pub fn location(mut self, location: impl Into<String>) -> Self { self.opts = self.opts.with_location(location); self }
    pub fn page_size(mut self, rows: u32) -> Self { self.opts = self.opts.with_page_size(rows); self }
    pub fn fetch_retries(mut self, retries: usize) -> Self { self.opts = self.opts.with_fetch_retries(retries); self }
    pub fn retry_delay(mut self, delay: Duration) -> Self { self.opts = self.opts.with_retry_delay(delay); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }

    pub fn options(&self) -> &ExecutorOptions { &self.opts }
    pub fn client(&self) -> &S { &self.client }
    pub fn into_client(self) -> S { self.client }

    // -------- Operations --------

    /// Create a billable remote job for `query`.
    /// A placeholder without a binding is rejected by the service as `QueryError::Configuration`.
    pub fn submit(&self, query: &Query, max_bytes_billed: Option<u64>) -> Result<Job> {
        let request = JobRequest {
            job_id: next_job_id(&self.opts.job_id_prefix),
            query,
            max_bytes_billed,
            use_legacy_sql: self.opts.use_legacy_sql,
            location: self.opts.location.clone(),
        };
        tracing::debug!(job_id=%request.job_id, params=query.params().len(), ?max_bytes_billed, "submitting query job");
        let reference = self.client.insert_job(&request).map_err(|e| {
            tracing::warn!(job_id=%request.job_id, error=%e, "job submission rejected");
            e
        })?;
        tracing::info!(job=%reference, "submitted query job");
        Ok(Job::submitted(reference))
    }

    /// Poll until the job is terminal. Each poll waits at most `poll_interval`
    /// (never less than `MIN_POLL_INTERVAL`).
    /// Calling this again on a terminal job returns the same outcome without contacting the service.
    pub fn await_completion<'j>(&self, job: &'j mut Job, poll_interval: Duration) -> Result<&'j Job> {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        if job.is_complete() {
            return Ok(job);
        }
        if let JobState::Failed(e) = job.state() {
            return Err(QueryError::RemoteExecution(e.clone()));
        }

        let label = self.label_for(job);
        let spinner = if self.opts.progress { Some(make_poll_spinner(&label)) } else { None };

        loop {
            job.record_poll();
            let status = match self.client.poll_job(job.reference(), poll_interval) {
                Ok(s) => s,
                Err(e) => {
                    if let Some(pb) = &spinner { pb.abandon_with_message(format!("{label}: poll failed")); }
                    return Err(e);
                }
            };
            tracing::debug!(job=%job.reference(), poll=job.polls(), ?status, "polled job");

            match status {
                JobStatus::Done => {
                    job.finish(JobState::Complete);
                    if let Some(pb) = &spinner { pb.finish_with_message(format!("{label}: done")); }
                    tracing::info!(job=%job.reference(), polls=job.polls(), elapsed=?job.elapsed(), "job complete");
                    return Ok(job);
                }
                JobStatus::Failed(err) => {
                    job.finish(JobState::Failed(err.clone()));
                    if let Some(pb) = &spinner { pb.abandon_with_message(format!("{label}: failed")); }
                    tracing::warn!(job=%job.reference(), polls=job.polls(), error=%err, "job failed");
                    return Err(QueryError::RemoteExecution(err));
                }
                JobStatus::Pending | JobStatus::Running => {
                    if let Some(pb) = &spinner {
                        pb.set_message(format!("{label} (waiting, poll {})", job.polls()));
                    }
                }
            }
        }
    }

    /// Materialize every row of a completed job. All or nothing: an interrupted
    /// pagination yields `QueryError::TransientFetch` and no partial result.
    pub fn unpack(&self, job: &Job) -> Result<ResultSet> {
        match job.state() {
            JobState::Complete => {}
            JobState::Failed(e) => return Err(QueryError::RemoteExecution(e.clone())),
            other => {
                return Err(QueryError::configuration(format!("job {} has not completed ({other:?})", job.id())));
            }
        }

        // Total comes from job metadata before iteration starts.
        let total = self.client.total_rows(job.reference())?;
        tracing::info!(job=%job.reference(), total_rows=total, "unpacking result");

        let pb = if self.opts.progress { Some(make_count_progress(total, &self.label_for(job))) } else { None };
        let outcome = self.drain(job, total, pb.as_ref());
        if let Some(pb) = pb {
            match &outcome {
                Ok(rs) => pb.finish_with_message(format!("{} rows", rs.len())),
                Err(_) => pb.abandon_with_message("interrupted"),
            }
        }
        outcome
    }

    fn drain(&self, job: &Job, total: u64, pb: Option<&ProgressBar>) -> Result<ResultSet> {
        let mut rows_iter = Rows::new(&self.client, job.reference().clone(), self.opts.page_size);
        let schema = rows_iter.schema()?.to_vec();
        let mut rows = Vec::with_capacity(total.min(1 << 20) as usize);
        for row in rows_iter.by_ref() {
            rows.push(row?);
            if let Some(pb) = pb { pb.inc(1); }
        }
        if rows.len() as u64 != total {
            tracing::warn!(job=%job.reference(), expected=total, read=rows.len(), "row count differs from job metadata");
        }
        tracing::debug!(job=%job.reference(), pages=rows_iter.pages_read(), rows=rows.len(), "drained result");
        ResultSet::new(schema, rows)
    }

    /// `unpack`, re-opening the row iterator after transient fetch errors
    /// up to `fetch_retries` times with linear backoff.
    pub fn unpack_with_retry(&self, job: &Job) -> Result<ResultSet> {
        let mut attempt = 0usize;
        loop {
            match self.unpack(job) {
                Err(e) if e.is_retryable() && attempt < self.opts.fetch_retries => {
                    attempt += 1;
                    tracing::warn!(job=%job.reference(), attempt, error=%e, "result fetch interrupted; retrying");
                    sleep(self.opts.retry_delay.saturating_mul(attempt as u32));
                }
                other => return other,
            }
        }
    }

    /// Submit, wait, and unpack using the configured options.
    pub fn run(&self, query: &Query) -> Result<ResultSet> {
        let mut job = self.submit(query, self.opts.max_bytes_billed)?;
        self.await_completion(&mut job, self.opts.poll_interval)?;
        self.unpack_with_retry(&job)
    }

    fn label_for(&self, job: &Job) -> String {
        self.opts.progress_label.clone().unwrap_or_else(|| format!("Job {}", job.id()))
    }
}
