use anyhow::{Context, Result};
use rbq::{
    comment_schema, demo_comment_rows, init_tracing_once, write_jsonl, CommentsQuery, CommentsTable, InMemoryService,
    QueryExecutor, QueryService, RestConfig, RestService, ScriptedJob,
};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OUT: &str = "./rbq_out/example.jsonl";

fn client() -> Result<Box<dyn QueryService>> {
    match (std::env::var("RBQ_PROJECT"), std::env::var("RBQ_ACCESS_TOKEN")) {
        (Ok(project), Ok(token)) if !project.trim().is_empty() && !token.trim().is_empty() => {
            tracing::info!(project=%project, "using BigQuery REST backend");
            let svc = RestService::new(RestConfig::new(project.trim(), token.trim()))
                .context("creating REST client")?;
            Ok(Box::new(svc))
        }
        _ => {
            tracing::warn!("RBQ_PROJECT / RBQ_ACCESS_TOKEN not set; running against the in-memory demo warehouse");
            let demo = ScriptedJob::rows(comment_schema(), demo_comment_rows("reddit.com", 100))
                .completes_after(Duration::from_millis(2500))
                .bytes_processed(48_000_000);
            Ok(Box::new(InMemoryService::new("demo").respond(demo)))
        }
    }
}

fn main() -> Result<()> {
    init_tracing_once();
    let out = std::env::var("RBQ_OUT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_OUT));

    let query = CommentsQuery::new(CommentsTable::Year(2005))
        .subreddit("reddit.com")
        .limit(100)
        .build();

    let executor = QueryExecutor::new(client()?)
        .max_bytes_billed(1_000_000_000)
        .poll_interval(Duration::from_secs(1))
        .job_id_prefix("example");

    let result = executor.run(&query).context("running example query")?;
    println!("Fetched {} rows x {} columns: {}", result.len(), result.width(), result.columns().join(", "));

    let n = write_jsonl(&result, &out)?;
    println!("Wrote {n} rows to {}", out.display());
    Ok(())
}
