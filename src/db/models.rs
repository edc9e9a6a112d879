use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shared photograph with its caption and engagement counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub image_src: String,
    pub photographer_name: String,
    pub username: String,
    pub avatar_src: String,
    pub caption: String,
    pub likes: u32,
    pub comments: u32,
    pub created_at: DateTime<Utc>,
    /// Empty for anonymous posts.
    pub user_id: String,
}

/// Everything the repository needs to create a [`Post`]; it assigns the id and
/// creation time itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub image_src: String,
    pub photographer_name: String,
    pub username: String,
    pub avatar_src: String,
    pub caption: String,
    pub likes: u32,
    pub comments: u32,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub id: String,
    pub photo_id: String,
    /// Either the owning user's id or `"anonymous"`.
    pub user_id: String,
    pub liked: bool,
    pub updated_at: DateTime<Utc>,
}
