//! Read-only client for the per-metric data endpoints.
//!
//! Six independent metrics per `(open_id, access_token)` pair, each behind
//! its own fixed endpoint. `fetch_all` issues all six concurrently and joins
//! them — partial failure is a normal return, never an error; callers
//! inspect the per-metric breakdown.

use std::fmt;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::store::videos::VideoRecord;

use super::unwrap_envelope;

/// How an endpoint wants its parameters. The platform is not uniform here:
/// the data endpoints take a JSON body, the profile endpoint takes a query
/// string. Kept as a per-endpoint attribute rather than normalized away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestStyle {
    JsonPost,
    QueryGet,
}

/// The six engagement metrics tracked per employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Fans,
    Likes,
    Comments,
    Shares,
    HomeViews,
    VideoStatus,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Fans,
        Metric::Likes,
        Metric::Comments,
        Metric::Shares,
        Metric::HomeViews,
        Metric::VideoStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Fans => "fans",
            Metric::Likes => "likes",
            Metric::Comments => "comments",
            Metric::Shares => "shares",
            Metric::HomeViews => "home_views",
            Metric::VideoStatus => "video_status",
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            Metric::Fans => "/data/external/user/fans/",
            Metric::Likes => "/data/external/user/like/",
            Metric::Comments => "/data/external/user/comment/",
            Metric::Shares => "/data/external/user/share/",
            Metric::HomeViews => "/data/external/user/profile/",
            Metric::VideoStatus => "/data/external/user/item/",
        }
    }

    /// Field inside the response `data` payload holding the counter.
    fn value_field(self) -> &'static str {
        match self {
            Metric::Fans => "fans_count",
            Metric::Likes => "like_count",
            Metric::Comments => "comment_count",
            Metric::Shares => "share_count",
            Metric::HomeViews => "home_pv",
            Metric::VideoStatus => "video_count",
        }
    }

    fn request_style(self) -> RequestStyle {
        match self {
            Metric::HomeViews => RequestStyle::QueryGet,
            _ => RequestStyle::JsonPost,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-metric breakdown from one `fetch_all` round.
#[derive(Debug)]
pub struct MetricsReport {
    pub outcomes: Vec<(Metric, Result<i64>)>,
}

impl MetricsReport {
    /// The fetched value for `metric`, if its call succeeded.
    pub fn value(&self, metric: Metric) -> Option<i64> {
        self.outcomes
            .iter()
            .find(|(m, _)| *m == metric)
            .and_then(|(_, r)| r.as_ref().ok().copied())
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Aggregate error list, one `metric: cause` line per failed call.
    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|(m, r)| r.as_ref().err().map(|e| format!("{}: {}", m, e)))
            .collect()
    }
}

/// Basic profile fields from the userinfo endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
}

/// One entry from the video list endpoint, provider shape.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoItem {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub statistics: VideoStatistics,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoStatistics {
    #[serde(default)]
    pub play_count: i64,
    #[serde(default)]
    pub digg_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub share_count: i64,
}

impl VideoItem {
    pub fn into_record(self) -> VideoRecord {
        VideoRecord {
            video_id: self.item_id,
            title: self.title,
            cover_url: self.cover,
            play_count: self.statistics.play_count,
            like_count: self.statistics.digg_count,
            comment_count: self.statistics.comment_count,
            share_count: self.statistics.share_count,
            create_time: self.create_time,
            duration: self.duration,
        }
    }
}

/// One page of the video list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoListPage {
    #[serde(default)]
    pub list: Vec<VideoItem>,
    #[serde(default)]
    pub cursor: i64,
    #[serde(default)]
    pub has_more: bool,
}

/// HTTP client over the data endpoints.
#[derive(Clone)]
pub struct MetricsClient {
    http: reqwest::Client,
    base_url: String,
    /// Reporting window (7/15/30 days) passed to the windowed endpoints.
    date_type: u32,
}

impl MetricsClient {
    pub fn new(base_url: impl Into<String>, date_type: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            date_type,
        }
    }

    /// Fetch one metric's counter.
    pub async fn fetch_metric(
        &self,
        metric: Metric,
        open_id: &str,
        access_token: &str,
    ) -> Result<i64> {
        let params = json!({
            "open_id": open_id,
            "access_token": access_token,
            "date_type": self.date_type,
        });
        let data = self
            .request(metric.endpoint(), metric.request_style(), &params)
            .await?;
        // Shapes differ per endpoint; a missing field reads as zero, the
        // same way the dashboard has always treated it
        Ok(data.get(metric.value_field()).and_then(Value::as_i64).unwrap_or(0))
    }

    /// Fetch all six metrics concurrently and join.
    ///
    /// Never short-circuits: every call runs to completion and lands in the
    /// report, successes and failures alike.
    pub async fn fetch_all(&self, open_id: &str, access_token: &str) -> MetricsReport {
        let calls = Metric::ALL.map(|metric| async move {
            let result = self.fetch_metric(metric, open_id, access_token).await;
            if let Err(e) = &result {
                tracing::warn!(metric = %metric, error = %e, "Metric fetch failed");
            }
            (metric, result)
        });
        MetricsReport {
            outcomes: join_all(calls).await,
        }
    }

    /// Basic profile for the authorized account (query-string endpoint).
    pub async fn fetch_user_info(&self, open_id: &str, access_token: &str) -> Result<UserProfile> {
        let params = json!({
            "open_id": open_id,
            "access_token": access_token,
        });
        let data = self
            .request("/oauth/userinfo/", RequestStyle::QueryGet, &params)
            .await?;
        serde_json::from_value(data)
            .map_err(|e| Error::Internal(format!("malformed userinfo response: {}", e)))
    }

    /// One page of the account's published videos.
    pub async fn fetch_video_list(
        &self,
        open_id: &str,
        access_token: &str,
        count: u32,
        cursor: i64,
    ) -> Result<VideoListPage> {
        let params = json!({
            "open_id": open_id,
            "access_token": access_token,
            "count": count,
            "cursor": cursor,
        });
        let data = self
            .request("/video/list/", RequestStyle::JsonPost, &params)
            .await?;
        serde_json::from_value(data)
            .map_err(|e| Error::Internal(format!("malformed video list response: {}", e)))
    }

    async fn request(&self, path: &str, style: RequestStyle, params: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let request = match style {
            RequestStyle::JsonPost => self.http.post(&url).json(params),
            RequestStyle::QueryGet => {
                let pairs: Vec<(String, String)> = params
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .map(|(k, v)| {
                                let v = match v {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                };
                                (k.clone(), v)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                self.http.get(&url).query(&pairs)
            }
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "{} returned status {}",
                path,
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        unwrap_envelope(body)
    }
}
