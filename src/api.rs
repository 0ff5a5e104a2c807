use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.clipdeck.app/v1/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
/// View telemetry is fire-and-forget and must never pin a worker for long.
const TRACK_VIEW_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("api: unauthorized")]
    Unauthorized,
    #[error("api: not found")]
    NotFound,
    #[error("api: rate limited")]
    RateLimited,
    #[error("api: server error {status}")]
    Server { status: u16 },
    #[error("api: request rejected with status {status}")]
    Rejected { status: u16 },
    #[error("api: network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("api: invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api: {0}")]
    Config(String),
}

impl ApiError {
    /// Worth retrying with backoff. Definitive rejections (4xx other than
    /// 429) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited | ApiError::Server { .. } => true,
            ApiError::Network(err) => !err.is_builder(),
            ApiError::Unauthorized
            | ApiError::NotFound
            | ApiError::Rejected { .. }
            | ApiError::Url(_)
            | ApiError::Config(_) => false,
        }
    }

    fn from_status(status: u16) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            404 => ApiError::NotFound,
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server { status },
            _ => ApiError::Rejected { status },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub bearer_token: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    track_http: HttpClient,
    user_agent: String,
    base_url: Url,
    bearer_token: Option<String>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        if config.user_agent.trim().is_empty() {
            return Err(ApiError::Config("user agent required".into()));
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(timeout).build()?,
        };
        let track_http = HttpClient::builder().timeout(TRACK_VIEW_TIMEOUT).build()?;

        Ok(Client {
            http,
            track_http,
            user_agent: config.user_agent,
            base_url,
            bearer_token: config.bearer_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn posts(
        &self,
        category: Option<&str>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>, ApiError> {
        let mut params = vec![("limit".to_string(), limit.to_string())];
        if let Some(category) = category {
            params.push(("category".into(), category.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor".into(), cursor.to_string()));
        }
        let resp = self.request(Method::GET, "posts", &params, None)?;
        Ok(resp.json::<Page<Post>>()?)
    }

    pub fn post(&self, id: &str) -> Result<Post, ApiError> {
        let resp = self.request(Method::GET, &format!("posts/{}", id), &[], None)?;
        Ok(resp.json()?)
    }

    /// Fire-and-forget view telemetry; uses the short-timeout client.
    pub fn track_view(&self, id: &str) -> Result<(), ApiError> {
        let url = self.base_url.join(&format!("posts/{}/track-view", id))?;
        let mut req = self
            .track_http
            .request(Method::POST, url)
            .header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = &self.bearer_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::from_status(resp.status().as_u16()))
        }
    }

    pub fn vote(&self, post_id: &str, value: VoteValue) -> Result<(), ApiError> {
        let body = serde_json::json!({ "value": value.as_i64() });
        self.request(
            Method::POST,
            &format!("votes/{}", post_id),
            &[],
            Some(body),
        )?;
        Ok(())
    }

    pub fn remove_vote(&self, post_id: &str) -> Result<(), ApiError> {
        self.request(Method::DELETE, &format!("votes/{}", post_id), &[], None)?;
        Ok(())
    }

    pub fn comments(&self, post_id: &str) -> Result<Page<Comment>, ApiError> {
        let resp = self.request(
            Method::GET,
            &format!("posts/{}/comments", post_id),
            &[],
            None,
        )?;
        Ok(resp.json()?)
    }

    pub fn reply(&self, post_id: &str, body: &str) -> Result<Comment, ApiError> {
        if body.trim().is_empty() {
            return Err(ApiError::Config("comment body required".into()));
        }
        let payload = serde_json::json!({ "post": post_id, "body": body });
        let resp = self.request(Method::POST, "comments", &[], Some(payload))?;
        Ok(resp.json()?)
    }

    pub fn follow(&self, username: &str) -> Result<(), ApiError> {
        self.request(
            Method::POST,
            &format!("users/{}/follow", username),
            &[],
            None,
        )?;
        Ok(())
    }

    pub fn unfollow(&self, username: &str) -> Result<(), ApiError> {
        self.request(
            Method::DELETE,
            &format!("users/{}/follow", username),
            &[],
            None,
        )?;
        Ok(())
    }

    pub fn leaderboard(&self, period: LeaderboardPeriod) -> Result<Vec<LeaderboardEntry>, ApiError> {
        let params = vec![("period".to_string(), period.as_str().to_string())];
        let resp = self.request(Method::GET, "leaderboard", &params, None)?;
        let page: Page<LeaderboardEntry> = resp.json()?;
        Ok(page.results)
    }

    pub fn unread_notifications(&self) -> Result<i64, ApiError> {
        let resp = self.request(Method::GET, "notifications/unread-count", &[], None)?;
        let body: UnreadCount = resp.json()?;
        Ok(body.count)
    }

    pub fn profile(&self, username: &str) -> Result<Profile, ApiError> {
        let resp = self.request(Method::GET, &format!("users/{}", username), &[], None)?;
        Ok(resp.json()?)
    }

    pub fn user_posts(
        &self,
        username: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>, ApiError> {
        let mut params = vec![("limit".to_string(), limit.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor".into(), cursor.to_string()));
        }
        let resp = self.request(
            Method::GET,
            &format!("users/{}/posts", username),
            &params,
            None,
        )?;
        Ok(resp.json()?)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<Response, ApiError> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = &self.bearer_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(ApiError::from_status(resp.status().as_u16()))
        }
    }
}

/// One page of a cursor-paged collection. `next` is an opaque token; absent
/// means no further pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: Author,
    #[serde(rename = "video")]
    pub video_url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub status: ClipStatus,
    #[serde(default)]
    pub plus_one_count: i64,
    #[serde(default)]
    pub plus_two_count: i64,
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub user_vote: Option<VoteValue>,
}

impl Post {
    /// Optimistic local patch after a vote request is issued. Returns the
    /// previous state so the caller can roll back if the request fails.
    pub fn apply_vote(&mut self, vote: Option<VoteValue>) -> VoteSnapshot {
        let snapshot = VoteSnapshot {
            user_vote: self.user_vote,
            plus_one_count: self.plus_one_count,
            plus_two_count: self.plus_two_count,
            total_score: self.total_score,
        };
        match self.user_vote {
            Some(VoteValue::PlusOne) => {
                self.plus_one_count -= 1;
                self.total_score -= 1;
            }
            Some(VoteValue::PlusTwo) => {
                self.plus_two_count -= 1;
                self.total_score -= 2;
            }
            None => {}
        }
        match vote {
            Some(VoteValue::PlusOne) => {
                self.plus_one_count += 1;
                self.total_score += 1;
            }
            Some(VoteValue::PlusTwo) => {
                self.plus_two_count += 1;
                self.total_score += 2;
            }
            None => {}
        }
        self.user_vote = vote;
        snapshot
    }

    pub fn revert_to(&mut self, snapshot: VoteSnapshot) {
        self.user_vote = snapshot.user_vote;
        self.plus_one_count = snapshot.plus_one_count;
        self.plus_two_count = snapshot.plus_two_count;
        self.total_score = snapshot.total_score;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VoteSnapshot {
    user_vote: Option<VoteValue>,
    plus_one_count: i64,
    plus_two_count: i64,
    total_score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub total_points: i64,
    #[serde(default)]
    pub is_followed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Processing,
    #[default]
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteValue {
    PlusOne,
    PlusTwo,
}

impl VoteValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            VoteValue::PlusOne => 1,
            VoteValue::PlusTwo => 2,
        }
    }
}

impl Serialize for VoteValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for VoteValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i64::deserialize(deserializer)? {
            1 => Ok(VoteValue::PlusOne),
            2 => Ok(VoteValue::PlusTwo),
            other => Err(serde::de::Error::custom(format!(
                "vote value must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post: String,
    pub author: Author,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub reply_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardPeriod {
    #[default]
    Week,
    Month,
    AllTime,
}

impl LeaderboardPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardPeriod::Week => "week",
            LeaderboardPeriod::Month => "month",
            LeaderboardPeriod::AllTime => "all",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub total_points: i64,
    #[serde(default)]
    pub post_count: i64,
    #[serde(default)]
    pub is_followed: bool,
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ApiError::from_status(500).is_transient());
        assert!(ApiError::from_status(503).is_transient());
        assert!(ApiError::from_status(429).is_transient());
        assert!(!ApiError::from_status(404).is_transient());
        assert!(!ApiError::from_status(401).is_transient());
        assert!(!ApiError::from_status(400).is_transient());
    }

    #[test]
    fn client_requires_user_agent() {
        let err = Client::new(ClientConfig::default()).err().unwrap();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn page_decodes_missing_next() {
        let page: Page<LeaderboardEntry> =
            serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert!(page.next.is_none());
        assert!(page.results.is_empty());
    }

    #[test]
    fn optimistic_vote_patch_and_rollback() {
        let mut post = sample_post();
        let before = post.total_score;

        let snapshot = post.apply_vote(Some(VoteValue::PlusTwo));
        assert_eq!(post.plus_two_count, 1);
        assert_eq!(post.total_score, before + 2);
        assert_eq!(post.user_vote, Some(VoteValue::PlusTwo));

        post.revert_to(snapshot);
        assert_eq!(post.plus_two_count, 0);
        assert_eq!(post.total_score, before);
        assert_eq!(post.user_vote, None);
    }

    #[test]
    fn vote_switch_adjusts_both_counters() {
        let mut post = sample_post();
        post.apply_vote(Some(VoteValue::PlusOne));
        post.apply_vote(Some(VoteValue::PlusTwo));
        assert_eq!(post.plus_one_count, 0);
        assert_eq!(post.plus_two_count, 1);
        assert_eq!(post.total_score, 2);
    }

    fn sample_post() -> Post {
        Post {
            id: "p1".into(),
            author: Author {
                username: "editor".into(),
                avatar: None,
                total_points: 0,
                is_followed: false,
            },
            video_url: "https://cdn.example/p1.mp4".into(),
            thumbnail: None,
            caption: String::new(),
            status: ClipStatus::Ready,
            plus_one_count: 0,
            plus_two_count: 0,
            total_score: 0,
            view_count: 0,
            comment_count: 0,
            created_at: chrono::Utc::now(),
            user_vote: None,
        }
    }
}
