use std::sync::Arc;

use crate::api::{
    self, ApiError, Comment, LeaderboardEntry, LeaderboardPeriod, Page, Post, Profile, VoteValue,
};

pub trait FeedService: Send + Sync {
    fn page(
        &self,
        category: Option<&str>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>, ApiError>;
}

pub trait ViewService: Send + Sync {
    fn track_view(&self, post_id: &str) -> Result<(), ApiError>;
}

pub trait InteractionService: Send + Sync {
    fn vote(&self, post_id: &str, value: VoteValue) -> Result<(), ApiError>;
    fn remove_vote(&self, post_id: &str) -> Result<(), ApiError>;
    fn follow(&self, username: &str) -> Result<(), ApiError>;
    fn unfollow(&self, username: &str) -> Result<(), ApiError>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, post_id: &str) -> Result<Page<Comment>, ApiError>;
    fn reply(&self, post_id: &str, body: &str) -> Result<Comment, ApiError>;
}

pub trait LeaderboardService: Send + Sync {
    fn leaderboard(&self, period: LeaderboardPeriod) -> Result<Vec<LeaderboardEntry>, ApiError>;
}

pub trait NotificationService: Send + Sync {
    fn unread_count(&self) -> Result<i64, ApiError>;
}

pub trait ProfileService: Send + Sync {
    fn profile(&self, username: &str) -> Result<Profile, ApiError>;
    fn posts(
        &self,
        username: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>, ApiError>;
}

pub struct ApiFeedService {
    client: Arc<api::Client>,
}

impl ApiFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for ApiFeedService {
    fn page(
        &self,
        category: Option<&str>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>, ApiError> {
        self.client.posts(category, cursor, limit)
    }
}

pub struct ApiViewService {
    client: Arc<api::Client>,
}

impl ApiViewService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ViewService for ApiViewService {
    fn track_view(&self, post_id: &str) -> Result<(), ApiError> {
        self.client.track_view(post_id)
    }
}

pub struct ApiInteractionService {
    client: Arc<api::Client>,
}

impl ApiInteractionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for ApiInteractionService {
    fn vote(&self, post_id: &str, value: VoteValue) -> Result<(), ApiError> {
        self.client.vote(post_id, value)
    }

    fn remove_vote(&self, post_id: &str) -> Result<(), ApiError> {
        self.client.remove_vote(post_id)
    }

    fn follow(&self, username: &str) -> Result<(), ApiError> {
        self.client.follow(username)
    }

    fn unfollow(&self, username: &str) -> Result<(), ApiError> {
        self.client.unfollow(username)
    }
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for ApiCommentService {
    fn load_comments(&self, post_id: &str) -> Result<Page<Comment>, ApiError> {
        self.client.comments(post_id)
    }

    fn reply(&self, post_id: &str, body: &str) -> Result<Comment, ApiError> {
        self.client.reply(post_id, body)
    }
}

pub struct ApiLeaderboardService {
    client: Arc<api::Client>,
}

impl ApiLeaderboardService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl LeaderboardService for ApiLeaderboardService {
    fn leaderboard(&self, period: LeaderboardPeriod) -> Result<Vec<LeaderboardEntry>, ApiError> {
        self.client.leaderboard(period)
    }
}

pub struct ApiNotificationService {
    client: Arc<api::Client>,
}

impl ApiNotificationService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl NotificationService for ApiNotificationService {
    fn unread_count(&self) -> Result<i64, ApiError> {
        self.client.unread_notifications()
    }
}

pub struct ApiProfileService {
    client: Arc<api::Client>,
}

impl ApiProfileService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ProfileService for ApiProfileService {
    fn profile(&self, username: &str) -> Result<Profile, ApiError> {
        self.client.profile(username)
    }

    fn posts(
        &self,
        username: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<Post>, ApiError> {
        self.client.user_posts(username, cursor, limit)
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn page(
        &self,
        category: Option<&str>,
        _cursor: Option<&str>,
        _limit: u32,
    ) -> Result<Page<Post>, ApiError> {
        Ok(Page {
            results: vec![mock_post(
                "welcome",
                category.unwrap_or("all"),
                "Welcome to Clipdeck. Sample clip for offline browsing.",
            )],
            next: None,
        })
    }
}

#[derive(Default)]
pub struct MockViewService;

impl ViewService for MockViewService {
    fn track_view(&self, _post_id: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockInteractionService;

impl InteractionService for MockInteractionService {
    fn vote(&self, _post_id: &str, _value: VoteValue) -> Result<(), ApiError> {
        Ok(())
    }

    fn remove_vote(&self, _post_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    fn follow(&self, _username: &str) -> Result<(), ApiError> {
        Ok(())
    }

    fn unfollow(&self, _username: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockNotificationService;

impl NotificationService for MockNotificationService {
    fn unread_count(&self) -> Result<i64, ApiError> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn load_comments(&self, post_id: &str) -> Result<Page<Comment>, ApiError> {
        Ok(Page {
            results: vec![mock_comment("c1", post_id, "Nice cut!")],
            next: None,
        })
    }

    fn reply(&self, post_id: &str, body: &str) -> Result<Comment, ApiError> {
        Ok(mock_comment("c-local", post_id, body))
    }
}

#[derive(Default)]
pub struct MockLeaderboardService;

impl LeaderboardService for MockLeaderboardService {
    fn leaderboard(&self, _period: LeaderboardPeriod) -> Result<Vec<LeaderboardEntry>, ApiError> {
        Ok((1..=3)
            .map(|rank| LeaderboardEntry {
                rank,
                username: format!("editor{}", rank),
                avatar: None,
                points: 100 - rank * 10,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MockProfileService;

impl ProfileService for MockProfileService {
    fn profile(&self, username: &str) -> Result<Profile, ApiError> {
        Ok(Profile {
            username: username.to_string(),
            bio: "Sample profile shown while offline.".into(),
            avatar: None,
            total_points: 0,
            post_count: 1,
            is_followed: false,
        })
    }

    fn posts(
        &self,
        _username: &str,
        _cursor: Option<&str>,
        _limit: u32,
    ) -> Result<Page<Post>, ApiError> {
        Ok(Page {
            results: vec![mock_post("welcome", "all", "Sample clip for offline browsing.")],
            next: None,
        })
    }
}

fn mock_comment(id: &str, post_id: &str, body: &str) -> Comment {
    Comment {
        id: id.into(),
        post: post_id.into(),
        author: api::Author {
            username: "clipdeck".into(),
            avatar: None,
            total_points: 0,
            is_followed: false,
        },
        body: body.into(),
        reply_count: 0,
        created_at: chrono::Utc::now(),
    }
}

fn mock_post(id: &str, category: &str, caption: &str) -> Post {
    Post {
        id: id.into(),
        author: api::Author {
            username: "clipdeck".into(),
            avatar: None,
            total_points: 0,
            is_followed: false,
        },
        video_url: String::new(),
        thumbnail: None,
        caption: format!("[{}] {}", category, caption),
        status: api::ClipStatus::Ready,
        plus_one_count: 0,
        plus_two_count: 0,
        total_score: 0,
        view_count: 0,
        comment_count: 0,
        created_at: chrono::Utc::now(),
        user_vote: None,
    }
}
