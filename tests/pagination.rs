#[path = "common/mod.rs"]
mod common;

use common::*;
use rbq::{InMemoryService, QueryError, ResultSet, Rows, ScriptedJob, Value};
use std::time::Duration;

/// Five rows read two at a time: three pages, the first one also supplying the schema.
#[test]
fn drains_every_page_in_order() {
    let svc = InMemoryService::new("proj").respond(ScriptedJob::rows(six_column_schema(), comment_rows("test", 5)));
    let exec = quiet_executor(&svc).page_size(2);

    let rs = exec.run(&subreddit_query("test", 5)).unwrap();

    assert_eq!(svc.page_reads(), 3);
    let ids: Vec<&str> = rs.column("id").unwrap().filter_map(|v| v.as_str()).collect();
    assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4"]);
}

/// An empty result still carries its column names.
#[test]
fn empty_result_keeps_columns() {
    let svc = InMemoryService::new("proj").respond(ScriptedJob::rows(six_column_schema(), vec![]));
    let rs = quiet_executor(&svc).run(&subreddit_query("nobody", 10)).unwrap();

    assert!(rs.is_empty());
    assert_eq!(rs.width(), 6);
}

/// Page 1 fails once. The first unpack reports TransientFetch and returns nothing;
/// a second unpack of the same job re-reads from the start and succeeds.
#[test]
fn interrupted_pagination_is_transient_and_rereadable() {
    let svc = InMemoryService::new("proj")
        .respond(ScriptedJob::rows(six_column_schema(), comment_rows("test", 5)).interrupt_page(1, 1));
    let exec = quiet_executor(&svc).page_size(2).fetch_retries(0);

    let mut job = exec.submit(&subreddit_query("test", 5), None).unwrap();
    exec.await_completion(&mut job, Duration::from_secs(1)).unwrap();

    let err = exec.unpack(&job).unwrap_err();
    assert!(matches!(err, QueryError::TransientFetch(_)));
    assert!(err.is_retryable());

    let rs = exec.unpack(&job).unwrap();
    assert_eq!(rs.len(), 5);
    assert_eq!(svc.jobs_submitted(), 1, "the job itself is never resubmitted");
    assert_eq!(svc.page_reads(), 2 + 3);
}

/// `run` retries the fetch on its own while attempts remain.
#[test]
fn run_retries_transient_fetches() {
    let svc = InMemoryService::new("proj")
        .respond(ScriptedJob::rows(six_column_schema(), comment_rows("test", 5)).interrupt_page(2, 2));
    let exec = quiet_executor(&svc).page_size(2).fetch_retries(3);

    let rs = exec.run(&subreddit_query("test", 5)).unwrap();
    assert_eq!(rs.len(), 5);
    assert_eq!(svc.jobs_submitted(), 1);
}

/// Once retries run out the transient error is returned as-is.
#[test]
fn run_gives_up_after_configured_retries() {
    let svc = InMemoryService::new("proj")
        .respond(ScriptedJob::rows(six_column_schema(), comment_rows("test", 5)).interrupt_page(0, 5));
    let exec = quiet_executor(&svc).page_size(2).fetch_retries(2);

    let err = exec.run(&subreddit_query("test", 5)).unwrap_err();
    assert!(matches!(err, QueryError::TransientFetch(_)));
    assert_eq!(svc.page_reads(), 3);
}

/// A row narrower than the schema is rejected instead of producing a ragged result.
#[test]
fn ragged_rows_are_rejected() {
    let mut rows = comment_rows("test", 3);
    rows[1].pop();
    let svc = InMemoryService::new("proj").respond(ScriptedJob::rows(six_column_schema(), rows.clone()));

    assert!(quiet_executor(&svc).run(&subreddit_query("test", 3)).is_err());
    assert!(ResultSet::new(six_column_schema(), rows).is_err());
}

/// The row iterator can be driven directly; it yields rows lazily and reports pages read.
#[test]
fn row_iterator_is_lazy() {
    let svc = InMemoryService::new("proj").respond(ScriptedJob::rows(six_column_schema(), comment_rows("test", 5)));
    let exec = quiet_executor(&svc);
    let mut job = exec.submit(&subreddit_query("test", 5), None).unwrap();
    exec.await_completion(&mut job, Duration::from_secs(1)).unwrap();

    let mut rows = Rows::new(&svc, job.reference().clone(), Some(2));
    assert_eq!(rows.pages_read(), 0);
    let first = rows.next().unwrap().unwrap();
    assert_eq!(first[3], Value::from("c0"));
    assert_eq!(rows.pages_read(), 1);

    let rest: Vec<_> = rows.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(rest.len(), 4);
    assert_eq!(rows.pages_read(), 3);
}
