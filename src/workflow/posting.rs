// src/workflow/posting.rs
//! Publication of approved content.
//!
//! Posts: rows are scanned in index order and the first complete, approved,
//! unpublished group is published as one multi-image post. Groups are taken
//! as contiguous: scanning stops at the first qualifying row of a different
//! group, which is left for a later run. A failed publication marks nothing,
//! so the same group is retried on the next scheduled run.
//!
//! Stories are published one by one without grouping or caption budget.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, warn};

use super::caption_budget::{normalize_location, HashtagBudget};
use crate::capabilities::{Poster, PublishRequest};
use crate::config::{LocationSource, PostingSettings};
use crate::error::AutomationError;
use crate::models::{CaptionData, ContentItem, ContentType};
use crate::run_lock::{LockOutcome, RunLock};
use crate::services::NotificationService;
use crate::store::ContentStore;

pub const NO_POSTS_MESSAGE: &str = "No posts to post on instagram, please check the sheet";
pub const NO_STORIES_MESSAGE: &str = "No stories to post, please check the sheet";

/// The group chosen for publication.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSelection {
    pub group_id: String,
    pub indexes: Vec<u64>,
    pub image_urls: Vec<String>,
    pub caption: CaptionData,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostingOutcome {
    AlreadyRunning,
    NothingToPost,
    Posted { indexes: Vec<u64> },
    /// The poster failed. Nothing was marked.
    Failed { message: String },
    Stories { posted: Vec<u64>, failed: Vec<u64> },
}

fn missing_fields(item: &ContentItem, group_captions: &HashMap<&str, &CaptionData>) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if item.image.is_none() {
        missing.push("image");
    }
    if item.caption.is_missing() || !group_captions.contains_key(item.group_id.as_str()) {
        missing.push("caption");
    }
    if item.location.trim().is_empty() {
        missing.push("location");
    }
    if item.group_id.trim().is_empty() {
        missing.push("group_id");
    }
    missing
}

/// Picks the first publishable group, at most `max_images` of its rows.
pub fn select_group(items: &[ContentItem], max_images: usize) -> Option<GroupSelection> {
    let mut ordered: Vec<&ContentItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.index);

    let group_captions: HashMap<&str, &CaptionData> = ordered
        .iter()
        .filter(|item| item.content_type == ContentType::Post && !item.group_id.is_empty())
        .filter_map(|item| item.caption.written().map(|c| (item.group_id.as_str(), c)))
        .fold(HashMap::new(), |mut map, (group, caption)| {
            map.entry(group).or_insert(caption);
            map
        });

    let mut selection: Option<GroupSelection> = None;
    for &item in &ordered {
        if item.content_type != ContentType::Post || !item.is_approved_and_pending_publication() {
            continue;
        }
        let missing = missing_fields(item, &group_captions);
        if !missing.is_empty() {
            info!("Missing values for row {}: {}", item.index, missing.join(", "));
            continue;
        }

        let selected = selection.get_or_insert_with(|| GroupSelection {
            group_id: item.group_id.clone(),
            indexes: Vec::new(),
            image_urls: Vec::new(),
            caption: group_captions[item.group_id.as_str()].clone(),
            location: item.location.clone(),
        });
        if selected.group_id != item.group_id {
            info!(
                "Row {} belongs to group {}, deferring it to a later run",
                item.index, item.group_id
            );
            break;
        }

        if let Some(image) = &item.image {
            selected.indexes.push(item.index);
            selected.image_urls.push(image.url.clone());
        }
        if selected.indexes.len() >= max_images {
            break;
        }
    }
    selection.filter(|s| !s.indexes.is_empty())
}

/// Up to `limit` approved, unpublished stories with an image, in index order.
pub fn select_stories(items: &[ContentItem], limit: usize) -> Vec<ContentItem> {
    let mut stories: Vec<&ContentItem> = items
        .iter()
        .filter(|item| item.content_type == ContentType::Story)
        .filter(|item| item.is_approved_and_pending_publication())
        .collect();
    stories.sort_by_key(|item| item.index);

    stories
        .into_iter()
        .filter(|item| {
            if item.image.is_none() {
                info!("Missing image for story {}", item.index);
                return false;
            }
            true
        })
        .take(limit)
        .cloned()
        .collect()
}

pub struct PostingPipeline {
    store: Arc<ContentStore>,
    lock: RunLock,
    poster: Arc<dyn Poster>,
    notifications: NotificationService,
    settings: PostingSettings,
    budget: HashtagBudget,
    location: LocationSource,
}

impl PostingPipeline {
    pub fn new(
        store: Arc<ContentStore>,
        lock: RunLock,
        poster: Arc<dyn Poster>,
        notifications: NotificationService,
        settings: PostingSettings,
        location: LocationSource,
    ) -> Self {
        let budget = HashtagBudget::new(settings.boilerplate_hashtags.clone(), settings.max_hashtags);
        Self {
            store,
            lock,
            poster,
            notifications,
            settings,
            budget,
            location,
        }
    }

    async fn guarded<F>(&self, work: F) -> Result<PostingOutcome, AutomationError>
    where
        F: std::future::Future<Output = Result<PostingOutcome, AutomationError>>,
    {
        let result = match self.lock.run_exclusive(work).await {
            Ok(LockOutcome::AlreadyRunning) => return Ok(PostingOutcome::AlreadyRunning),
            Ok(LockOutcome::Completed(result)) => result,
            Err(e) => Err(AutomationError::from(e)),
        };
        if let Err(e) = &result {
            self.notifications
                .error(&format!("Error while posting on instagram\n{}", e))
                .await;
        }
        result
    }

    /// Publishes the next complete post group.
    pub async fn post_next_group(&self) -> Result<PostingOutcome, AutomationError> {
        self.guarded(self.publish_group()).await
    }

    pub async fn post_stories(&self) -> Result<PostingOutcome, AutomationError> {
        self.guarded(self.publish_stories()).await
    }

    fn alt_text(&self, location: &str) -> String {
        format!("{} at {}", self.settings.persona_name, location)
    }

    async fn publish_group(&self) -> Result<PostingOutcome, AutomationError> {
        let items = self.store.get_all(false).await?;
        let Some(selection) = select_group(&items, self.settings.max_images_per_post) else {
            self.notifications.info(NO_POSTS_MESSAGE).await;
            return Ok(PostingOutcome::NothingToPost);
        };

        let current_location = self.location.current().await?;
        let location = normalize_location(&selection.location, &current_location);
        let caption = self.budget.assemble(&selection.caption.text, &self.settings.mentions);
        info!(
            group_id = %selection.group_id,
            images = selection.image_urls.len(),
            hashtags = caption.hashtag_count,
            "Publishing post group"
        );

        let request = PublishRequest {
            kind: ContentType::Post,
            image_urls: selection.image_urls.clone(),
            caption: caption.text,
            alt_text: self.alt_text(&location),
            location,
        };

        match self.poster.post(&request).await {
            Ok(()) => {
                self.store
                    .mark_posted(&selection.indexes, Local::now().naive_local())
                    .await?;
                self.notifications
                    .success(&format!(
                        "Successfully posted on instagram, checkout {}",
                        self.settings.profile_url
                    ))
                    .await;
                Ok(PostingOutcome::Posted {
                    indexes: selection.indexes,
                })
            }
            Err(e) => {
                let failure = AutomationError::Posting(e);
                error!("Post group {} not published: {}", selection.group_id, failure);
                self.notifications
                    .error(&format!("Error while posting on instagram\n{}", failure))
                    .await;
                Ok(PostingOutcome::Failed {
                    message: failure.to_string(),
                })
            }
        }
    }

    async fn publish_stories(&self) -> Result<PostingOutcome, AutomationError> {
        let items = self.store.get_all(false).await?;
        let stories = select_stories(&items, self.settings.max_stories_per_run);
        if stories.is_empty() {
            self.notifications.info(NO_STORIES_MESSAGE).await;
            return Ok(PostingOutcome::NothingToPost);
        }

        let current_location = match self.location.current().await {
            Ok(location) => location,
            Err(e) => {
                warn!("Posting stories with stored locations as they are: {}", e);
                String::new()
            }
        };
        let mut posted = Vec::new();
        let mut failed = Vec::new();

        for story in stories {
            let Some(image) = &story.image else {
                continue;
            };
            let location = normalize_location(&story.location, &current_location);
            let request = PublishRequest {
                kind: ContentType::Story,
                image_urls: vec![image.url.clone()],
                caption: story
                    .caption
                    .written()
                    .map(|c| c.text.clone())
                    .unwrap_or_default(),
                alt_text: self.alt_text(&location),
                location,
            };

            match self.poster.post(&request).await {
                Ok(()) => {
                    self.store
                        .mark_posted(&[story.index], Local::now().naive_local())
                        .await?;
                    posted.push(story.index);
                }
                Err(e) => {
                    warn!("Story {} not published: {}", story.index, e);
                    self.notifications
                        .error(&format!("Error while posting story {}\n{}", story.index, e))
                        .await;
                    failed.push(story.index);
                }
            }
        }

        if !posted.is_empty() {
            self.notifications
                .success(&format!("Successfully posted {} stories on instagram", posted.len()))
                .await;
        }
        Ok(PostingOutcome::Stories { posted, failed })
    }
}
