//! Upstream timeline API.
//!
//! [`Upstream`] is the seam the ingestion, reconciliation and profile code
//! talks to. [`HttpUpstream`] implements it over the v1.1 REST endpoints
//! with app-only bearer authentication. Calls are blocking and strictly
//! sequential; nothing here retries.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::{ArchiveError, Result};
use crate::model::{SourceItem, SourceUser};

/// Most items one timeline page may return.
pub const MAX_TIMELINE_COUNT: u32 = 200;

/// Most ids one batch lookup accepts.
pub const MAX_LOOKUP_SIZE: usize = 100;

const MAX_ERROR_BODY: usize = 512;

/// Parameters for one timeline page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRequest {
    pub handle: String,
    pub count: u32,
    /// Only items with an id greater than this.
    pub since_id: Option<i64>,
    /// Only items with an id at most this.
    pub max_id: Option<i64>,
}

impl TimelineRequest {
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            count: MAX_TIMELINE_COUNT,
            since_id: None,
            max_id: None,
        }
    }

    /// Query string pairs. Replies and reposts are excluded upstream.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("screen_name", self.handle.clone()),
            ("count", self.count.min(MAX_TIMELINE_COUNT).to_string()),
            ("trim_user", "1".to_string()),
            ("exclude_replies", "1".to_string()),
            ("include_rts", "0".to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        if let Some(since_id) = self.since_id {
            pairs.push(("since_id", since_id.to_string()));
        }
        if let Some(max_id) = self.max_id {
            pairs.push(("max_id", max_id.to_string()));
        }
        pairs
    }
}

/// The upstream source being mirrored.
pub trait Upstream {
    /// One page of the account timeline, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    fn user_timeline(&self, request: &TimelineRequest) -> Result<Vec<SourceItem>>;

    /// The subset of `ids` that still exist upstream. At most
    /// [`MAX_LOOKUP_SIZE`] ids per call.
    ///
    /// # Errors
    ///
    /// Returns an error for oversized batches, transport failure or a
    /// non-success status.
    fn lookup(&self, ids: &[i64]) -> Result<Vec<SourceItem>>;

    /// Current profile fields for an account.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    fn fetch_profile(&self, handle: &str) -> Result<SourceUser>;
}

/// Blocking HTTP client for the upstream API.
pub struct HttpUpstream {
    client: reqwest::blocking::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpUpstream {
    /// Build a client from the upstream configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}.json", self.base_url)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        params: &[(&'static str, String)],
    ) -> Result<T> {
        let url = self.url(endpoint);
        debug!(endpoint, "GET {}", url);

        let mut request = self.client.get(&url).query(params);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(ArchiveError::upstream_status(endpoint, status.as_u16(), body));
        }

        let body = response.text()?;
        serde_json::from_str(&body)
            .map_err(|e| ArchiveError::upstream_protocol(endpoint, e.to_string()))
    }
}

impl Upstream for HttpUpstream {
    fn user_timeline(&self, request: &TimelineRequest) -> Result<Vec<SourceItem>> {
        self.get_json("statuses/user_timeline", &request.query_pairs())
    }

    fn lookup(&self, ids: &[i64]) -> Result<Vec<SourceItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_LOOKUP_SIZE {
            return Err(ArchiveError::invalid_argument(format!(
                "lookup of {} ids exceeds the limit of {MAX_LOOKUP_SIZE}",
                ids.len()
            )));
        }

        let joined = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.get_json(
            "statuses/lookup",
            &[
                ("id", joined),
                ("trim_user", "1".to_string()),
                ("include_entities", "1".to_string()),
                ("tweet_mode", "extended".to_string()),
            ],
        )
    }

    fn fetch_profile(&self, handle: &str) -> Result<SourceUser> {
        self.get_json(
            "users/show",
            &[
                ("screen_name", handle.to_string()),
                ("include_entities", "1".to_string()),
            ],
        )
    }
}

/// Wall-clock budget for one run, checked before each upstream call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// A budget of `seconds`; zero means unbounded.
    #[must_use]
    pub fn new(operation: &'static str, seconds: u64) -> Self {
        Self {
            operation,
            started: Instant::now(),
            budget: (seconds > 0).then(|| Duration::from_secs(seconds)),
        }
    }

    #[must_use]
    pub fn unbounded(operation: &'static str) -> Self {
        Self::new(operation, 0)
    }

    /// Fail once the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DeadlineExceeded`] when the budget is spent.
    pub fn check(&self) -> Result<()> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => {
                Err(ArchiveError::DeadlineExceeded {
                    operation: self.operation,
                    seconds: budget.as_secs(),
                })
            }
            _ => Ok(()),
        }
    }
}
