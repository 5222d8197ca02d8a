// src/models/content.rs
// Content item entity and its lifecycle states

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Story,
}

impl ContentType {
    /// Value written to the `type` column.
    pub fn as_cell(&self) -> &'static str {
        match self {
            ContentType::Post => "posts",
            ContentType::Story => "story",
        }
    }

    pub fn from_cell(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "posts" | "post" => Some(ContentType::Post),
            "story" | "stories" => Some(ContentType::Story),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Post => write!(f, "post"),
            ContentType::Story => write!(f, "story"),
        }
    }
}

/// Human review gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_cell(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "",
            ApprovalStatus::Approved => "y",
            ApprovalStatus::Rejected => "n",
        }
    }

    pub fn from_cell(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" => Some(ApprovalStatus::Pending),
            "y" | "yes" => Some(ApprovalStatus::Approved),
            "n" | "no" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingStatus {
    NotPosted,
    Posted,
    Failed,
}

/// Which content types skip human review at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub auto_approve_posts: bool,
    pub auto_approve_stories: bool,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            auto_approve_posts: false,
            auto_approve_stories: true,
        }
    }
}

impl ApprovalPolicy {
    pub fn initial_status(&self, content_type: ContentType) -> ApprovalStatus {
        let auto = match content_type {
            ContentType::Post => self.auto_approve_posts,
            ContentType::Story => self.auto_approve_stories,
        };
        if auto {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptData {
    pub text: String,
    pub location: String,
    pub content_type: ContentType,
}

/// Caption text with the hashtags and mentions found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionData {
    pub text: String,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
}

impl CaptionData {
    pub fn from_text(raw: &str) -> Self {
        let text = raw.trim().to_string();
        let hashtags = text
            .split_whitespace()
            .filter(|token| token.starts_with('#') && token.len() > 1)
            .map(str::to_string)
            .collect();
        let mentions = text
            .split_whitespace()
            .filter(|token| token.starts_with('@') && token.len() > 1)
            .map(str::to_string)
            .collect();
        Self {
            text,
            hashtags,
            mentions,
        }
    }
}

/// Caption slot of an item. Within a post group only the holder is `Written`;
/// the other members are `Delegated` to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaptionState {
    Missing,
    Delegated,
    Written(CaptionData),
}

impl CaptionState {
    pub fn is_missing(&self) -> bool {
        matches!(self, CaptionState::Missing)
    }

    pub fn written(&self) -> Option<&CaptionData> {
        match self {
            CaptionState::Written(caption) => Some(caption),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Transient view of one persisted content row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    /// Assigned by the content store on creation.
    pub index: u64,
    pub content_type: ContentType,
    pub group_id: String,
    pub prompt: PromptData,
    pub caption: CaptionState,
    pub image: Option<ImageData>,
    pub location: String,
    pub approval_status: ApprovalStatus,
    pub posting_status: PostingStatus,
    pub created_at: DateTime<Utc>,
    pub generated_at: Option<NaiveDateTime>,
    pub posted_at: Option<NaiveDateTime>,
    pub seed: Option<i64>,
    pub error_message: Option<String>,
}

impl ContentItem {
    /// New, not yet persisted item. The index is a placeholder until the
    /// store assigns one.
    pub fn draft(
        prompt: PromptData,
        group_id: impl Into<String>,
        approval_status: ApprovalStatus,
        caption: CaptionState,
        seed: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            index: 0,
            content_type: prompt.content_type,
            group_id: group_id.into(),
            location: prompt.location.clone(),
            prompt,
            caption,
            image: None,
            approval_status,
            posting_status: PostingStatus::NotPosted,
            created_at: Utc::now(),
            generated_at: None,
            posted_at: None,
            seed,
            error_message: None,
        }
    }

    /// Stable id for legacy rows that predate the `content_id` column.
    pub fn legacy_id(index: u64) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("content-row-{}", index).as_bytes())
    }

    pub fn is_approved_and_pending_publication(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
            && self.posting_status == PostingStatus::NotPosted
    }

    pub fn awaits_review(&self) -> bool {
        self.approval_status == ApprovalStatus::Pending
            && self.posting_status == PostingStatus::NotPosted
            && self.image.is_some()
    }

    /// Postable when approved, unpublished, rendered and captioned. For posts
    /// the caption lives on the group's holder, so the caller says whether the
    /// group has one.
    pub fn is_postable(&self, group_has_caption: bool) -> bool {
        if !self.is_approved_and_pending_publication() || self.image.is_none() {
            return false;
        }
        match self.content_type {
            ContentType::Post => group_has_caption && !self.caption.is_missing(),
            ContentType::Story => true,
        }
    }
}
