//! REST backend against a tiny local HTTP stub that speaks just enough of the v2 jobs API.

use rbq::{CommentsQuery, CommentsTable, QueryError, QueryExecutor, RestConfig, RestService, Value};
use serde_json::{json, Value as Json};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

struct Request {
    method: String,
    target: String,
    body: String,
}

type Handler = dyn Fn(&Request) -> (u16, Json) + Send + Sync;

/// Serve each connection on its own thread with `handler`; returns the base URL and a log of requests.
fn serve(handler: Arc<Handler>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let log2 = log.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let handler = handler.clone();
            let log = log2.clone();
            thread::spawn(move || {
                let req = read_request(&stream);
                log.lock().unwrap().push(format!("{} {} {}", req.method, req.target, req.body));
                let (status, body) = handler(&req);
                write_response(stream, status, &body.to_string());
            });
        }
    });
    (format!("http://{addr}/bigquery/v2"), log)
}

fn read_request(stream: &TcpStream) -> Request {
    let mut r = BufReader::new(stream);
    let mut line = String::new();
    r.read_line(&mut line).unwrap();
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();

    let mut len = 0usize;
    loop {
        let mut h = String::new();
        r.read_line(&mut h).unwrap();
        let h = h.trim_end();
        if h.is_empty() { break; }
        if let Some((k, v)) = h.split_once(':') {
            if k.eq_ignore_ascii_case("content-length") { len = v.trim().parse().unwrap(); }
        }
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).unwrap();
    Request { method, target, body: String::from_utf8(body).unwrap() }
}

fn write_response(mut stream: TcpStream, status: u16, body: &str) {
    let head = format!(
        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    // The client may already have given up on a slow response.
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body.as_bytes());
}

fn job_id_of(target: &str) -> String {
    let path = target.split('?').next().unwrap();
    path.rsplit('/').next().unwrap().to_string()
}

/// A finished job with three rows over two pages. `page_two` answers the `tok2` page read.
fn two_page_job(req: &Request, page_two: &dyn Fn() -> (u16, Json)) -> (u16, Json) {
    let schema = json!({"fields": [{"name": "author", "type": "STRING"}, {"name": "score", "type": "INTEGER"}]});
    if req.method == "POST" {
        let body: Json = serde_json::from_str(&req.body).unwrap();
        return (200, json!({"jobReference": {"projectId": "p", "jobId": body["jobReference"]["jobId"]}}));
    }
    if req.target.contains("/jobs/") {
        return (200, json!({"jobReference": {"projectId": "p", "jobId": job_id_of(&req.target)}, "status": {"state": "DONE"}}));
    }
    if req.target.contains("maxResults=0") {
        return (200, json!({"jobComplete": true, "totalRows": "3", "schema": schema}));
    }
    if req.target.contains("pageToken=tok2") {
        return page_two();
    }
    (200, json!({"jobComplete": true, "totalRows": "3", "schema": schema, "pageToken": "tok2",
        "rows": [{"f": [{"v": "alice"}, {"v": "1"}]}, {"f": [{"v": "bob"}, {"v": "2"}]}]}))
}

fn last_page() -> (u16, Json) {
    (200, json!({"jobComplete": true, "totalRows": "3",
        "schema": {"fields": [{"name": "author", "type": "STRING"}, {"name": "score", "type": "INTEGER"}]},
        "rows": [{"f": [{"v": "charlie"}, {"v": "3"}]}]}))
}

fn unavailable() -> (u16, Json) {
    (503, json!({"error": {"code": 503, "message": "Service unavailable"}}))
}

fn rest_executor(base: &str) -> QueryExecutor<RestService> {
    let svc = RestService::new(RestConfig::new("p", "token").with_api_base(base)).unwrap();
    QueryExecutor::new(svc).progress(false).poll_interval(Duration::from_millis(50)).retry_delay(Duration::ZERO)
}

/// Full round trip: insert with named parameters and a billing ceiling, two polls,
/// a total from job metadata, then two pages decoded by the schema.
#[test]
fn runs_a_parameterized_job_end_to_end() {
    let status_polls = Arc::new(Mutex::new(0u32));
    let sp = status_polls.clone();
    let handler: Arc<Handler> = Arc::new(move |req: &Request| -> (u16, Json) {
        let schema = json!({"fields": [
            {"name": "author", "type": "STRING"},
            {"name": "score", "type": "INTEGER"},
            {"name": "created_utc", "type": "TIMESTAMP"}
        ]});
        if req.method == "POST" {
            let body: Json = serde_json::from_str(&req.body).unwrap();
            let id = body["jobReference"]["jobId"].clone();
            return (200, json!({"jobReference": {"projectId": "p", "jobId": id}, "status": {"state": "RUNNING"}}));
        }
        let id = job_id_of(&req.target);
        if req.target.contains("/jobs/") {
            return (200, json!({"jobReference": {"projectId": "p", "jobId": id}, "status": {"state": "DONE"}}));
        }
        if req.target.contains("maxResults=0") {
            let mut n = sp.lock().unwrap();
            *n += 1;
            let complete = *n > 1;
            return (200, json!({"jobComplete": complete, "totalRows": "3", "schema": schema}));
        }
        if req.target.contains("pageToken=tok2") {
            return (200, json!({"jobComplete": true, "totalRows": "3", "schema": schema,
                "rows": [{"f": [{"v": "charlie"}, {"v": null}, {"v": "1.1360747E9"}]}]}));
        }
        (200, json!({"jobComplete": true, "totalRows": "3", "schema": schema, "pageToken": "tok2",
            "rows": [
                {"f": [{"v": "alice"}, {"v": "2"}, {"v": "1.1360746E9"}]},
                {"f": [{"v": "bob"}, {"v": "5"}, {"v": "1.1360746E9"}]}
            ]}))
    });
    let (base, log) = serve(handler);

    let q = CommentsQuery::new(CommentsTable::Year(2005)).subreddit("programming").limit(3).build();
    let rs = rest_executor(&base).max_bytes_billed(1000).page_size(2).run(&q).unwrap();

    assert_eq!(rs.columns(), &["author", "score", "created_utc"]);
    assert_eq!(rs.len(), 3);
    assert_eq!(rs.get(1, "score"), Some(&Value::Int(5)));
    assert_eq!(rs.get(2, "score"), Some(&Value::Null));

    let log = log.lock().unwrap();
    let insert = log.iter().find(|l| l.starts_with("POST")).unwrap();
    let body: Json = serde_json::from_str(insert.splitn(3, ' ').nth(2).unwrap()).unwrap();
    let cfg = &body["configuration"]["query"];
    assert_eq!(cfg["parameterMode"], "NAMED");
    assert_eq!(cfg["useLegacySql"], false);
    assert_eq!(cfg["maximumBytesBilled"], "1000");
    let params = cfg["queryParameters"].as_array().unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0]["name"], "lim");
    assert_eq!(params[0]["parameterType"]["type"], "INT64");
    assert_eq!(params[0]["parameterValue"]["value"], "3");
    assert!(log.iter().any(|l| l.contains("timeoutMs=50")));
}

/// A 400 on insert is a configuration problem carrying the remote message.
#[test]
fn rejected_insert_is_configuration_error() {
    let handler: Arc<Handler> = Arc::new(|_req: &Request| -> (u16, Json) {
        (400, json!({"error": {"code": 400, "message": "Query parameter 'lim' not found at [4:7]",
            "errors": [{"reason": "invalidQuery", "message": "Query parameter 'lim' not found at [4:7]"}]}}))
    });
    let (base, _log) = serve(handler);

    let q = rbq::Query::new("select 1 limit @lim");
    match rest_executor(&base).submit(&q, None) {
        Err(QueryError::Configuration(msg)) => assert!(msg.contains("'lim' not found"), "{msg}"),
        other => panic!("expected Configuration, got {other:?}"),
    }
}

/// A failed job shows up as an HTTP error on getQueryResults; jobs.get supplies the payload.
#[test]
fn failed_job_reports_error_result() {
    let handler: Arc<Handler> = Arc::new(|req: &Request| -> (u16, Json) {
        if req.method == "POST" {
            let body: Json = serde_json::from_str(&req.body).unwrap();
            return (200, json!({"jobReference": {"projectId": "p", "jobId": body["jobReference"]["jobId"]}}));
        }
        if req.target.contains("/jobs/") {
            return (200, json!({"jobReference": {"projectId": "p", "jobId": job_id_of(&req.target)},
                "status": {"state": "DONE", "errorResult": {"reason": "notFound", "location": "fh-bigquery.reddit_comments.1999", "message": "Not found: Table"}}}));
        }
        (404, json!({"error": {"code": 404, "message": "Not found: Table"}}))
    });
    let (base, log) = serve(handler);

    let q = CommentsQuery::new(CommentsTable::Year(1999)).build();
    let err = rest_executor(&base).run(&q).unwrap_err();
    let remote = err.remote().expect("remote payload");
    assert_eq!(remote.reason.as_deref(), Some("notFound"));
    assert!(remote.message.contains("Not found"));
    assert!(!log.lock().unwrap().iter().any(|l| l.contains("timeoutMs=0&")));
}

/// A 503 on the second page interrupts the read; `run` reopens from the first page and gets every row.
#[test]
fn unavailable_page_is_retried_from_the_start() {
    let failures = Arc::new(Mutex::new(1u32));
    let f = failures.clone();
    let handler: Arc<Handler> = Arc::new(move |req: &Request| -> (u16, Json) {
        two_page_job(req, &|| {
            let mut left = f.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return unavailable();
            }
            last_page()
        })
    });
    let (base, log) = serve(handler);

    let rs = rest_executor(&base).page_size(2).run(&rbq::Query::new("select author, score from t")).unwrap();
    assert_eq!(rs.len(), 3);
    assert_eq!(rs.get(2, "author").and_then(|v| v.as_str()), Some("charlie"));

    let log = log.lock().unwrap();
    let first_pages = log.iter().filter(|l| l.contains("maxResults=2") && !l.contains("pageToken")).count();
    let second_pages = log.iter().filter(|l| l.contains("pageToken=tok2")).count();
    assert_eq!(first_pages, 2);
    assert_eq!(second_pages, 2);
}

/// A single `unpack` that hits a 503 fails as a transient fetch and hands back nothing.
#[test]
fn interrupted_unpack_is_transient() {
    let handler: Arc<Handler> = Arc::new(|req: &Request| -> (u16, Json) { two_page_job(req, &unavailable) });
    let (base, _log) = serve(handler);

    let exec = rest_executor(&base).page_size(2);
    let mut job = exec.submit(&rbq::Query::new("select author, score from t"), None).unwrap();
    exec.await_completion(&mut job, Duration::from_millis(50)).unwrap();
    match exec.unpack(&job) {
        Err(QueryError::TransientFetch(msg)) => assert!(msg.contains("503"), "{msg}"),
        other => panic!("expected TransientFetch, got {other:?}"),
    }
    assert!(exec.unpack_with_retry(&job).unwrap_err().is_retryable());
}

/// A row-count read that hits a 503 is just as retryable as a page read.
#[test]
fn unavailable_row_count_is_transient() {
    let handler: Arc<Handler> = Arc::new(|req: &Request| -> (u16, Json) {
        if req.target.contains("timeoutMs=0&maxResults=0") {
            return unavailable();
        }
        two_page_job(req, &last_page)
    });
    let (base, _log) = serve(handler);

    let exec = rest_executor(&base);
    let mut job = exec.submit(&rbq::Query::new("select author, score from t"), None).unwrap();
    exec.await_completion(&mut job, Duration::from_millis(50)).unwrap();
    assert!(matches!(exec.unpack(&job), Err(QueryError::TransientFetch(_))));
}

/// A status wait that outlives the HTTP timeout counts as "still running" and is polled again.
#[test]
fn slow_poll_counts_as_running() {
    let slow = Arc::new(Mutex::new(true));
    let s = slow.clone();
    let handler: Arc<Handler> = Arc::new(move |req: &Request| -> (u16, Json) {
        if req.target.contains("timeoutMs=50&") {
            let first = std::mem::replace(&mut *s.lock().unwrap(), false);
            if first {
                thread::sleep(Duration::from_millis(1500));
            }
        }
        two_page_job(req, &last_page)
    });
    let (base, log) = serve(handler);

    let svc = RestService::new(
        RestConfig::new("p", "token").with_api_base(&base).with_http_slack(Duration::from_millis(300)),
    )
    .unwrap();
    let exec = QueryExecutor::new(svc).progress(false).retry_delay(Duration::ZERO).page_size(2);
    let mut job = exec.submit(&rbq::Query::new("select author, score from t"), None).unwrap();

    exec.await_completion(&mut job, Duration::from_millis(50)).unwrap();
    assert!(job.is_complete());
    assert_eq!(job.polls(), 2);
    assert_eq!(log.lock().unwrap().iter().filter(|l| l.contains("timeoutMs=50&")).count(), 2);
}
