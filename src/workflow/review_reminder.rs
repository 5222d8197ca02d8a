// src/workflow/review_reminder.rs
// Nudges the operator when rendered content waits for approval.

use std::sync::Arc;

use tracing::info;

use crate::error::AutomationError;
use crate::services::NotificationService;
use crate::store::{ContentCounts, ContentStore};

pub struct ReviewReminder {
    store: Arc<ContentStore>,
    notifications: NotificationService,
    threshold: usize,
}

/// Messages for every queue at or above `threshold`. Posts count by group.
pub fn reminder_messages(counts: &ContentCounts, threshold: usize) -> Vec<String> {
    let mut messages = Vec::new();
    if threshold == 0 {
        return messages;
    }
    if counts.stories_awaiting_review >= threshold {
        messages.push(format!(
            "Hey! You have {} non approved stories.",
            counts.stories_awaiting_review
        ));
    }
    if counts.posts_awaiting_review >= threshold {
        messages.push(format!(
            "Hey! You have {} non approved posts.",
            counts.posts_awaiting_review
        ));
    }
    messages
}

impl ReviewReminder {
    pub fn new(store: Arc<ContentStore>, notifications: NotificationService, threshold: usize) -> Self {
        Self {
            store,
            notifications,
            threshold,
        }
    }

    /// Returns the reminders that were sent.
    pub async fn run(&self) -> Result<Vec<String>, AutomationError> {
        let counts = self.store.get_counts().await?;
        let messages = reminder_messages(&counts, self.threshold);
        if messages.is_empty() {
            info!(
                posts = counts.posts_awaiting_review,
                stories = counts.stories_awaiting_review,
                "Review queue below reminder threshold"
            );
        }
        for message in &messages {
            self.notifications.info(message).await;
        }
        Ok(messages)
    }
}
