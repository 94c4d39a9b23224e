//! BigQuery REST v2 backend over blocking HTTP.

use crate::config::RestConfig;
use crate::error::{QueryError, RemoteError, Result};
use crate::service::{JobReference, JobRequest, JobStatus, QueryService, RowPage};
use crate::value::Field;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatusResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResource {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<RemoteError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResults {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    total_rows: Option<String>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Json,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<RemoteError>,
}

/// Client for `https://bigquery.googleapis.com/bigquery/v2`.
pub struct RestService {
    cfg: RestConfig,
    http: Client,
}

impl RestService {
    pub fn new(cfg: RestConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| QueryError::transport(format!("building HTTP client: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/projects/{}/{}", self.cfg.api_base, self.cfg.project_id, tail)
    }

    fn authed(&self, rb: RequestBuilder, wait: Duration) -> RequestBuilder {
        rb.bearer_auth(&self.cfg.access_token).timeout(wait + self.cfg.http_slack)
    }

    fn get_job(&self, job: &JobReference) -> Result<JobResource> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(loc) = &job.location { params.push(("location", loc.clone())); }
        let resp = self
            .authed(self.http.get(self.url(&format!("jobs/{}", job.job_id))).query(&params), Duration::ZERO)
            .send()
            .map_err(|e| QueryError::transport(format!("jobs.get {job}: {e}")))?;
        if !resp.status().is_success() {
            let (status, err) = api_error(resp);
            return Err(QueryError::transport(format!("jobs.get {job}: HTTP {status}: {err}")));
        }
        resp.json().map_err(|e| QueryError::transport(format!("jobs.get {job}: bad payload: {e}")))
    }

    fn job_status(&self, job: &JobReference) -> Result<JobStatus> {
        let res = self.get_job(job)?;
        Ok(status_of(res.status.as_ref()))
    }

    fn query_results(&self, job: &JobReference, params: Vec<(&str, String)>, wait: Duration) -> reqwest::Result<Response> {
        let mut params = params;
        if let Some(loc) = &job.location { params.push(("location", loc.clone())); }
        self.authed(self.http.get(self.url(&format!("queries/{}", job.job_id))).query(&params), wait).send()
    }
}

fn status_of(status: Option<&JobStatusResource>) -> JobStatus {
    match status {
        Some(s) if s.state.eq_ignore_ascii_case("DONE") => match &s.error_result {
            Some(err) => JobStatus::Failed(err.clone()),
            None => JobStatus::Done,
        },
        Some(s) if s.state.eq_ignore_ascii_case("RUNNING") => JobStatus::Running,
        _ => JobStatus::Pending,
    }
}

/// Read the `{"error": {...}}` envelope. The first detailed error wins over the summary.
fn api_error(resp: Response) -> (StatusCode, RemoteError) {
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    let err = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(env) => env.error.errors.into_iter().next().unwrap_or_else(|| RemoteError::new(env.error.message)),
        Err(_) => RemoteError::new(if text.is_empty() { status.to_string() } else { text }),
    };
    (status, err)
}

/// Errors while reading a finished job's results: overload and server faults are worth a retry.
fn fetch_error(status: StatusCode, msg: String) -> QueryError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        QueryError::TransientFetch(msg)
    } else {
        QueryError::Transport(msg)
    }
}

fn millis(d: Duration) -> String {
    d.as_millis().min(u32::MAX as u128).to_string()
}

impl QueryService for RestService {
    fn insert_job(&self, request: &JobRequest<'_>) -> Result<JobReference> {
        let query = request.query;
        let parameters: Vec<Json> = query
            .params()
            .iter()
            .map(|(name, p)| {
                json!({
                    "name": name,
                    "parameterType": { "type": p.param_type().as_str() },
                    "parameterValue": { "value": p.value_string() },
                })
            })
            .collect();

        let mut config = json!({
            "query": query.text(),
            "useLegacySql": request.use_legacy_sql,
        });
        if !parameters.is_empty() {
            config["parameterMode"] = json!("NAMED");
            config["queryParameters"] = Json::Array(parameters);
        }
        if let Some(limit) = request.max_bytes_billed {
            // int64 fields travel as strings
            config["maximumBytesBilled"] = json!(limit.to_string());
        }
        let mut job_ref = json!({ "projectId": self.cfg.project_id, "jobId": request.job_id });
        if let Some(loc) = &request.location {
            job_ref["location"] = json!(loc);
        }
        let body = json!({ "jobReference": job_ref, "configuration": { "query": config } });

        let resp = self
            .authed(self.http.post(self.url("jobs")).json(&body), Duration::ZERO)
            .send()
            .map_err(|e| QueryError::transport(format!("jobs.insert {}: {e}", request.job_id)))?;

        if !resp.status().is_success() {
            let (status, err) = api_error(resp);
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::CONFLICT => QueryError::Configuration(err.to_string()),
                _ => QueryError::transport(format!("jobs.insert {}: HTTP {status}: {err}", request.job_id)),
            });
        }
        let job: JobResource =
            resp.json().map_err(|e| QueryError::transport(format!("jobs.insert {}: bad payload: {e}", request.job_id)))?;

        // Parameter and syntax problems can come back as an already-failed job.
        if let Some(JobStatusResource { error_result: Some(err), .. }) = &job.status {
            if err.reason.as_deref() == Some("invalidQuery") {
                return Err(QueryError::Configuration(err.to_string()));
            }
        }
        Ok(job.job_reference)
    }

    fn poll_job(&self, job: &JobReference, timeout: Duration) -> Result<JobStatus> {
        let params = vec![("timeoutMs", millis(timeout)), ("maxResults", "0".to_string())];
        let resp = match self.query_results(job, params, timeout) {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Ok(JobStatus::Running),
            Err(e) => return Err(QueryError::transport(format!("getQueryResults {job}: {e}"))),
        };
        if !resp.status().is_success() {
            // A failed job surfaces here as an HTTP error; the job resource has the real payload.
            let (status, err) = api_error(resp);
            return match self.job_status(job)? {
                JobStatus::Failed(remote) => Ok(JobStatus::Failed(remote)),
                _ => Err(QueryError::transport(format!("getQueryResults {job}: HTTP {status}: {err}"))),
            };
        }
        let res: QueryResults =
            resp.json().map_err(|e| QueryError::transport(format!("getQueryResults {job}: bad payload: {e}")))?;
        if !res.job_complete {
            return Ok(JobStatus::Running);
        }
        self.job_status(job)
    }

    fn total_rows(&self, job: &JobReference) -> Result<u64> {
        let params = vec![("timeoutMs", "0".to_string()), ("maxResults", "0".to_string())];
        let resp = self
            .query_results(job, params, Duration::ZERO)
            .map_err(|e| QueryError::transient(format!("reading row count of {job}: {e}")))?;
        if !resp.status().is_success() {
            let (status, err) = api_error(resp);
            return Err(fetch_error(status, format!("reading row count of {job}: HTTP {status}: {err}")));
        }
        let res: QueryResults =
            resp.json().map_err(|e| QueryError::transient(format!("reading row count of {job}: {e}")))?;
        match res.total_rows.as_deref() {
            Some(n) => n.parse().map_err(|_| QueryError::transport(format!("getQueryResults {job}: bad totalRows {n:?}"))),
            None => Ok(0),
        }
    }

    fn read_page(&self, job: &JobReference, page_token: Option<&str>, max_results: Option<u32>) -> Result<RowPage> {
        let mut params = vec![("timeoutMs", "0".to_string())];
        if let Some(n) = max_results { params.push(("maxResults", n.to_string())); }
        if let Some(t) = page_token { params.push(("pageToken", t.to_string())); }

        let resp = self
            .query_results(job, params, Duration::ZERO)
            .map_err(|e| QueryError::transient(format!("reading results of {job}: {e}")))?;
        if !resp.status().is_success() {
            let (status, err) = api_error(resp);
            return Err(fetch_error(status, format!("reading results of {job}: HTTP {status}: {err}")));
        }
        // A truncated body is an interrupted read, not a malformed response.
        let res: QueryResults =
            resp.json().map_err(|e| QueryError::transient(format!("reading results of {job}: {e}")))?;
        if !res.job_complete {
            return Err(QueryError::transport(format!("results of {job} requested before completion")));
        }

        let schema = res.schema.map(|s| s.fields).unwrap_or_default();
        let mut rows = Vec::with_capacity(res.rows.len());
        for row in res.rows {
            let mut out = Vec::with_capacity(row.f.len());
            for (field, cell) in schema.iter().zip(row.f.iter()) {
                out.push(field.decode(&cell.v).map_err(QueryError::Transport)?);
            }
            if row.f.len() != schema.len() {
                return Err(QueryError::transport(format!(
                    "results of {job}: row has {} cells, schema has {} fields",
                    row.f.len(),
                    schema.len()
                )));
            }
            rows.push(out);
        }
        Ok(RowPage { schema, rows, next_page_token: res.page_token })
    }
}
