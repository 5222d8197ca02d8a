// src/workflow/generation.rs
//! Backlog filling: Idle -> Running -> {posts backlog, stories backlog} -> Idle.
//!
//! The whole run holds the run lock. Posts and stories are checked against
//! their thresholds independently and only the short category is filled.
//! Per-item image failures and the group caption failure are logged and
//! tolerated; prompt generation and store failures abort the run.

use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{GenerationSettings, LocationSource};
use crate::error::{AutomationError, CapabilityError};
use crate::models::{CaptionData, CaptionState, ContentItem, ContentType};
use crate::run_lock::{LockOutcome, RunLock};
use crate::services::image_service::random_seed;
use crate::services::{ImageService, NotificationService, PromptService};
use crate::store::{ContentStore, FieldUpdate};

/// What one generated batch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub created: Vec<u64>,
    pub images_generated: usize,
    pub image_failures: Vec<u64>,
    pub captions_written: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    pub posts: Option<BatchReport>,
    pub stories: Option<BatchReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Another run held the lock. Nothing was generated.
    AlreadyRunning,
    Completed(GenerationReport),
}

pub struct GenerationWorkflow {
    store: Arc<ContentStore>,
    lock: RunLock,
    prompts: PromptService,
    images: ImageService,
    notifications: NotificationService,
    settings: GenerationSettings,
    location: LocationSource,
}

impl GenerationWorkflow {
    pub fn new(
        store: Arc<ContentStore>,
        lock: RunLock,
        prompts: PromptService,
        images: ImageService,
        notifications: NotificationService,
        settings: GenerationSettings,
        location: LocationSource,
    ) -> Self {
        Self {
            store,
            lock,
            prompts,
            images,
            notifications,
            settings,
            location,
        }
    }

    /// Runs one generation pass. Top-level failures are reported through
    /// the notifier before being returned.
    pub async fn run(&self) -> Result<GenerationOutcome, AutomationError> {
        let result = match self.lock.run_exclusive(self.fill_backlog()).await {
            Ok(LockOutcome::AlreadyRunning) => {
                info!("Generation already running, nothing to do");
                return Ok(GenerationOutcome::AlreadyRunning);
            }
            Ok(LockOutcome::Completed(result)) => result,
            Err(e) => Err(AutomationError::from(e)),
        };

        match result {
            Ok(report) => Ok(GenerationOutcome::Completed(report)),
            Err(e) => {
                self.notifications
                    .error(&format!("Error while generating content\n{}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn fill_backlog(&self) -> Result<GenerationReport, AutomationError> {
        let counts = self.store.get_counts().await?;
        info!(
            posts = counts.posts,
            stories = counts.stories,
            "Current non-posted backlog"
        );

        let posts_short = counts.posts < self.settings.post_backlog_threshold;
        let stories_short = counts.stories < self.settings.story_backlog_threshold;
        let mut report = GenerationReport::default();
        if !posts_short && !stories_short {
            info!("Backlog is full, no generation needed");
            return Ok(report);
        }

        if !self.images.is_available().await {
            self.notifications
                .warning("Image generator is not reachable, please update its URL. Generation stopped")
                .await;
            return Ok(report);
        }

        let location = self.location.current().await?;
        self.notifications
            .info("Running image and caption generation...")
            .await;

        if posts_short {
            report.posts = Some(self.generate_posts(&location).await?);
        } else {
            info!(
                "{} post groups waiting, threshold {}",
                counts.posts, self.settings.post_backlog_threshold
            );
        }

        if stories_short {
            report.stories = Some(self.generate_stories(&location).await?);
        } else {
            info!(
                "{} stories waiting, threshold {}",
                counts.stories, self.settings.story_backlog_threshold
            );
        }

        self.notifications
            .info("Stopping image and caption generation")
            .await;
        Ok(report)
    }

    fn seed(&self) -> i64 {
        self.settings.seed.unwrap_or_else(random_seed)
    }

    /// One group: shared group id, first item holds the caption.
    async fn generate_posts(&self, location: &str) -> Result<BatchReport, AutomationError> {
        let prompts = self
            .prompts
            .post_prompts(location, self.settings.posts_per_batch)
            .await?;

        let group_id = Uuid::new_v4().to_string();
        let approval = self.settings.approval.initial_status(ContentType::Post);
        let drafts = prompts
            .into_iter()
            .enumerate()
            .map(|(position, prompt)| {
                let caption = if position == 0 {
                    CaptionState::Missing
                } else {
                    CaptionState::Delegated
                };
                ContentItem::draft(prompt, group_id.clone(), approval, caption, Some(self.seed()))
            })
            .collect();

        let created = self.store.create_batch(drafts).await?;
        info!(group_id = %group_id, "Created post group with {} items", created.len());

        let mut report = BatchReport {
            created: created.iter().map(|item| item.index).collect(),
            ..Default::default()
        };
        self.render_images(&created, &mut report).await?;

        if let Some(holder) = created.first() {
            let background = holder
                .location
                .split(',')
                .next()
                .unwrap_or(location)
                .trim()
                .to_string();
            if self.write_caption(holder, self.prompts.post_caption(&background).await).await? {
                report.captions_written += 1;
            }
        }
        Ok(report)
    }

    /// Independent stories, each its own group.
    async fn generate_stories(&self, location: &str) -> Result<BatchReport, AutomationError> {
        let prompts = self
            .prompts
            .story_prompts(location, self.settings.stories_per_batch)
            .await?;

        let approval = self.settings.approval.initial_status(ContentType::Story);
        let drafts = prompts
            .into_iter()
            .map(|prompt| {
                ContentItem::draft(
                    prompt,
                    Uuid::new_v4().to_string(),
                    approval,
                    CaptionState::Missing,
                    Some(self.seed()),
                )
            })
            .collect();

        let created = self.store.create_batch(drafts).await?;
        info!("Created {} stories", created.len());

        let mut report = BatchReport {
            created: created.iter().map(|item| item.index).collect(),
            ..Default::default()
        };
        self.render_images(&created, &mut report).await?;

        if self.settings.story_captions {
            for story in &created {
                let caption = self.prompts.story_caption(&story.prompt.text).await;
                if self.write_caption(story, caption).await? {
                    report.captions_written += 1;
                }
            }
        }
        Ok(report)
    }

    /// Sequential, one item at a time. A failed item is recorded and skipped.
    async fn render_images(
        &self,
        items: &[ContentItem],
        report: &mut BatchReport,
    ) -> Result<(), AutomationError> {
        for item in items {
            match self.images.render(item).await {
                Ok(image) => {
                    self.store
                        .update_fields(
                            item.index,
                            vec![
                                FieldUpdate::Image(image),
                                FieldUpdate::GeneratedAt(Local::now().naive_local()),
                                FieldUpdate::ErrorMessage(None),
                            ],
                        )
                        .await?;
                    report.images_generated += 1;
                }
                Err(e) => {
                    warn!("Skipping image for item {}: {}", item.index, e);
                    report.image_failures.push(item.index);
                    if let Err(write_err) = self
                        .store
                        .update_field(item.index, FieldUpdate::ErrorMessage(Some(e.to_string())))
                        .await
                    {
                        warn!(
                            "Could not record image failure on item {}: {}",
                            item.index, write_err
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Stores a generated caption. A generation failure is logged and
    /// reported as `false`; a store failure aborts.
    async fn write_caption(
        &self,
        item: &ContentItem,
        caption: Result<CaptionData, CapabilityError>,
    ) -> Result<bool, AutomationError> {
        match caption {
            Ok(caption) => {
                self.store
                    .update_field(item.index, FieldUpdate::Caption(CaptionState::Written(caption)))
                    .await?;
                info!("Caption written for item {}", item.index);
                Ok(true)
            }
            Err(e) => {
                warn!(
                    "Caption generation failed for item {}, left for manual editing: {}",
                    item.index, e
                );
                Ok(false)
            }
        }
    }
}
