//! Concurrency helper: run several queries at once, each on its own executor.

use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::query::Query;
use crate::result::ResultSet;
use crate::service::QueryService;
use rayon::prelude::*;

/// Run `queries` with at most `limit` jobs in flight. `make(i)` builds a fresh
/// executor for query `i`; nothing is shared between executors.
/// Results come back in input order, one per query.
pub fn run_queries_limited<S, F>(queries: &[Query], limit: usize, make: F) -> Vec<Result<ResultSet>>
where
    S: QueryService,
    F: Fn(usize) -> QueryExecutor<S> + Sync,
{
    let run_one = |i: usize| make(i).run(&queries[i]);

    if limit <= 1 {
        return (0..queries.len()).map(run_one).collect();
    }
    let mut out = Vec::with_capacity(queries.len());
    let indices: Vec<usize> = (0..queries.len()).collect();
    for chunk in indices.chunks(limit) {
        let mut part: Vec<Result<ResultSet>> = chunk.par_iter().map(|&i| run_one(i)).collect();
        out.append(&mut part);
    }
    out
}
