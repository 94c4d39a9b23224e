//! Parameterized query text, typed bindings, and the comments-table query builder.

use crate::date::CommentsTable;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Columns selected by `CommentsQuery` unless overridden.
pub const DEFAULT_COMMENT_COLUMNS: [&str; 8] =
    ["body", "author", "created_utc", "id", "link_id", "parent_id", "subreddit", "score"];

pub const COMMENTS_DATASET: &str = "fh-bigquery.reddit_comments";

/// Declared type of a scalar parameter, as the warehouse names it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    String,
    Int64,
    Float64,
    Bool,
    Timestamp,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "STRING",
            ParamType::Int64 => "INT64",
            ParamType::Float64 => "FLOAT64",
            ParamType::Bool => "BOOL",
            ParamType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed scalar binding for one `@name` placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryParam {
    String(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Timestamp(OffsetDateTime),
}

impl QueryParam {
    pub fn param_type(&self) -> ParamType {
        match self {
            QueryParam::String(_) => ParamType::String,
            QueryParam::Int64(_) => ParamType::Int64,
            QueryParam::Float64(_) => ParamType::Float64,
            QueryParam::Bool(_) => ParamType::Bool,
            QueryParam::Timestamp(_) => ParamType::Timestamp,
        }
    }

    /// Wire form of the value; the warehouse takes every scalar as a string.
    pub fn value_string(&self) -> String {
        match self {
            QueryParam::String(s) => s.clone(),
            QueryParam::Int64(v) => v.to_string(),
            QueryParam::Float64(v) => v.to_string(),
            QueryParam::Bool(v) => v.to_string(),
            QueryParam::Timestamp(ts) => ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string()),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self { QueryParam::String(s.to_string()) }
}
impl From<String> for QueryParam {
    fn from(s: String) -> Self { QueryParam::String(s) }
}
impl From<i64> for QueryParam {
    fn from(v: i64) -> Self { QueryParam::Int64(v) }
}
impl From<f64> for QueryParam {
    fn from(v: f64) -> Self { QueryParam::Float64(v) }
}
impl From<bool> for QueryParam {
    fn from(v: bool) -> Self { QueryParam::Bool(v) }
}
impl From<OffsetDateTime> for QueryParam {
    fn from(v: OffsetDateTime) -> Self { QueryParam::Timestamp(v) }
}

/// Query text with named placeholders plus its bindings.
/// Bindings are name-ordered so the submitted payload is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    text: String,
    params: BTreeMap<String, QueryParam>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), params: BTreeMap::new() }
    }

    /// Bind `name` (with or without the leading `@`). Rebinding replaces the value.
    pub fn bind(mut self, name: impl AsRef<str>, param: impl Into<QueryParam>) -> Self {
        let name = name.as_ref().trim().trim_start_matches('@').to_string();
        self.params.insert(name, param.into());
        self
    }
    pub fn bind_string(self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.bind(name, QueryParam::String(value.into()))
    }
    pub fn bind_int64(self, name: impl AsRef<str>, value: i64) -> Self {
        self.bind(name, QueryParam::Int64(value))
    }

    pub fn text(&self) -> &str { &self.text }
    pub fn params(&self) -> &BTreeMap<String, QueryParam> { &self.params }
    pub fn param(&self, name: &str) -> Option<&QueryParam> { self.params.get(name) }

    /// Distinct `@name` references in order of first appearance.
    /// Quoted strings, backtick identifiers, comments and `@@system` variables are skipped.
    pub fn placeholders(&self) -> Vec<String> {
        let stripped = strip_quoted(&self.text);
        let bytes = stripped.as_bytes();
        let mut out: Vec<String> = Vec::new();
        for m in placeholder_re().find_iter(&stripped) {
            if m.as_str().starts_with("@@") { continue; }
            if m.start() > 0 {
                let prev = bytes[m.start() - 1];
                if prev.is_ascii_alphanumeric() || prev == b'_' || prev == b'@' { continue; }
            }
            let name = &m.as_str()[1..];
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    /// Placeholders referenced by the text that have no binding.
    pub fn unbound_placeholders(&self) -> Vec<String> {
        self.placeholders().into_iter().filter(|p| !self.params.contains_key(p)).collect()
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@{1,2}[A-Za-z_][A-Za-z0-9_]*").expect("static regex"))
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`|--[^\n]*|#[^\n]*|/\*(?s:.*?)\*/"#)
            .expect("static regex")
    })
}

/// Blank out literals and comments, keeping byte offsets stable.
fn strip_quoted(text: &str) -> String {
    quoted_re()
        .replace_all(text, |caps: &regex::Captures| " ".repeat(caps[0].len()))
        .into_owned()
}

/// Trim and drop a leading "r/". Case is preserved: the warehouse compares case-sensitively.
#[inline]
pub fn normalize_subreddit(s: &str) -> String {
    let s = s.trim();
    let s = s.strip_prefix("r/").or_else(|| s.strip_prefix("/r/")).unwrap_or(s);
    s.to_string()
}

/// One parameterized query over the public Reddit comments dataset.
/// Replaces one-helper-per-table variants with a single builder.
#[derive(Clone, Debug)]
pub struct CommentsQuery {
    pub table: CommentsTable,
    pub subreddit: Option<String>,
    pub limit: u64,
    pub columns: Vec<String>,
}

impl Default for CommentsQuery {
    fn default() -> Self {
        Self {
            table: CommentsTable::All,
            subreddit: None,
            limit: 100,
            columns: DEFAULT_COMMENT_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CommentsQuery {
    pub fn new(table: CommentsTable) -> Self {
        Self { table, ..Default::default() }
    }
    pub fn subreddit(mut self, sub: impl AsRef<str>) -> Self {
        self.subreddit = Some(normalize_subreddit(sub.as_ref()));
        self
    }
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = n;
        self
    }
    pub fn columns<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cols: Vec<String> = cols.into_iter().map(Into::into).collect();
        if !cols.is_empty() {
            self.columns = cols;
        }
        self
    }

    /// Render the template and its bindings.
    pub fn build(&self) -> Query {
        let mut text = format!(
            "select  {}\nfrom `{}.{}`\n",
            self.columns.join(", "),
            COMMENTS_DATASET,
            self.table
        );
        if self.subreddit.is_some() {
            text.push_str("where (subreddit = @subreddit)\n");
        }
        text.push_str("limit @lim\n");

        let lim = i64::try_from(self.limit).unwrap_or(i64::MAX);
        let mut q = Query::new(text).bind_int64("lim", lim);
        if let Some(sub) = &self.subreddit {
            q = q.bind_string("subreddit", sub.clone());
        }
        q
    }
}
