mod config;
mod date;
mod error;
mod query;
mod value;

mod service;
mod job;
mod rows;
mod result;
mod executor;

mod memory;
mod rest;

mod progress;
mod concurrency;
mod export;
mod util;

pub use crate::config::{ExecutorOptions, RestConfig, DEFAULT_API_BASE, MIN_POLL_INTERVAL};
pub use crate::date::{iter_year_months, CommentsTable, YearMonth};
pub use crate::error::{QueryError, RemoteError, Result};
pub use crate::query::{normalize_subreddit, CommentsQuery, ParamType, Query, QueryParam, COMMENTS_DATASET, DEFAULT_COMMENT_COLUMNS};
pub use crate::value::{Field, FieldType, Value};

pub use crate::service::{JobReference, JobRequest, JobStatus, QueryService, RowPage};
pub use crate::job::{Job, JobState};
pub use crate::rows::Rows;
pub use crate::result::{ResultSet, Row};
pub use crate::executor::QueryExecutor;

// Backends: scripted in-process warehouse and the REST client.
pub use crate::memory::{comment_schema, demo_comment_rows, InMemoryService, ScriptedJob, SubmittedJob};
pub use crate::rest::RestService;

// Expose multiprogress so binaries can stack bars from parallel executors.
pub use crate::progress::set_global_multiprogress;

// parallel helper: one executor per query
pub use crate::concurrency::run_queries_limited;

// result consumers
pub use crate::export::{write_json_array, write_jsonl, write_tsv};

pub use crate::util::init_tracing_once;
