#![allow(dead_code)]

use rbq::{Field, FieldType, InMemoryService, Query, QueryExecutor, Row, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

/// The parameterized comments query used across tests: `@subreddit` and `@lim`.
pub const SUBREDDIT_QUERY: &str = "select body, author, created_utc, id, subreddit, score\n\
     from `fh-bigquery.reddit_comments.2005`\n\
     where (subreddit = @subreddit)\n\
     limit @lim";

pub fn subreddit_query(sub: &str, lim: i64) -> Query {
    Query::new(SUBREDDIT_QUERY).bind_string("subreddit", sub).bind_int64("lim", lim)
}

/// Six comment columns: body, author, created_utc, id, subreddit, score.
pub fn six_column_schema() -> Vec<Field> {
    vec![
        Field::new("body", FieldType::String),
        Field::new("author", FieldType::String),
        Field::new("created_utc", FieldType::Integer),
        Field::new("id", FieldType::String),
        Field::new("subreddit", FieldType::String),
        Field::new("score", FieldType::Integer),
    ]
}

/// `n` rows matching `six_column_schema`, all in `sub`.
pub fn comment_rows(sub: &str, n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            vec![
                Value::from(format!("comment number {i}")),
                Value::from(["alice", "bob", "charlie"][i % 3]),
                Value::Int(1_136_074_600 + i as i64),
                Value::from(format!("c{i}")),
                Value::from(sub),
                Value::Int(i as i64),
            ]
        })
        .collect()
}

/// Executor without progress bars, 1s polls and no retry sleeps.
pub fn quiet_executor(svc: &InMemoryService) -> QueryExecutor<&InMemoryService> {
    QueryExecutor::new(svc)
        .progress(false)
        .poll_interval(Duration::from_secs(1))
        .retry_delay(Duration::ZERO)
        .job_id_prefix("test_")
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}
