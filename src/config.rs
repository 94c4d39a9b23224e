use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Lower bound for a single status wait.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Executor options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct ExecutorOptions {
    pub max_bytes_billed: Option<u64>, // billing ceiling; None leaves the project default
    pub poll_interval: Duration,       // upper bound of each status wait
    pub job_id_prefix: String,
    pub use_legacy_sql: bool,
    pub location: Option<String>,      // e.g. "US"; forwarded with every job call
    pub page_size: Option<u32>,        // rows per result page; None lets the service decide
    pub fetch_retries: usize,          // extra unpack attempts after a transient fetch error
    pub retry_delay: Duration,         // multiplied by the attempt number
    pub progress: bool,                // show spinner / row bar
    pub progress_label: Option<String>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_bytes_billed: Some(1_000_000_000),
            poll_interval: Duration::from_secs(1),
            job_id_prefix: "default".to_string(),
            use_legacy_sql: false,
            location: None,
            page_size: None,
            fetch_retries: 3,
            retry_delay: Duration::from_millis(500),
            progress: true,
            progress_label: None,
        }
    }
}

impl ExecutorOptions {
    pub fn with_max_bytes_billed(mut self, bytes: u64) -> Self {
        self.max_bytes_billed = Some(bytes);
        self
    }
    pub fn without_billing_limit(mut self) -> Self {
        self.max_bytes_billed = None;
        self
    }
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }
    /// Job ids are `<prefix><utc stamp>_<seq>`; characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn with_job_id_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.job_id_prefix = prefix
            .as_ref()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self
    }
    pub fn with_legacy_sql(mut self, yes: bool) -> Self {
        self.use_legacy_sql = yes;
        self
    }
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
    pub fn with_page_size(mut self, rows: u32) -> Self {
        self.page_size = Some(rows.max(1));
        self
    }
    pub fn with_fetch_retries(mut self, retries: usize) -> Self {
        self.fetch_retries = retries;
        self
    }
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
}

/// Connection settings for the REST backend. The access token is opaque:
/// obtaining and refreshing it is the caller's business.
#[derive(Clone)]
pub struct RestConfig {
    pub project_id: String,
    pub access_token: String,
    pub api_base: String,
    pub http_slack: Duration, // added to the poll timeout for the HTTP client timeout
    pub user_agent: String,
}

impl RestConfig {
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: access_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            http_slack: Duration::from_secs(30),
            user_agent: concat!("rbq/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
    pub fn with_api_base(mut self, base: impl AsRef<str>) -> Self {
        self.api_base = base.as_ref().trim_end_matches('/').to_string();
        self
    }
    pub fn with_http_slack(mut self, slack: Duration) -> Self {
        self.http_slack = slack;
        self
    }
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }
}

impl std::fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConfig")
            .field("project_id", &self.project_id)
            .field("access_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("http_slack", &self.http_slack)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
