// src/store/mod.rs
//! Content repository over a tabular backing store.
//!
//! The table is the system of record. `ContentStore` parses its rows into
//! `ContentItem`s, keeps a short-lived snapshot cache, and turns entity
//! updates back into cell writes. Writes invalidate the cache eagerly; the
//! cache offers no protection against other processes editing the table.

pub mod memory;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::row::{
    self, caption_cell, generated_cell, image_cells, item_from_row, posting_cell, RowParseError,
};
use crate::models::{
    ApprovalStatus, CaptionState, CellValue, Column, ContentItem, ContentType, ImageData,
    PostingStatus, TableRow,
};

pub use memory::MemoryTable;

/// Row-level access to the backing table.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// All data rows below the header, in table order.
    async fn read_rows(&self) -> Result<Vec<TableRow>, StoreError>;

    async fn append_rows(&self, rows: Vec<Vec<(Column, CellValue)>>) -> Result<(), StoreError>;

    /// Overwrites cells of several rows in one write. Either every row is
    /// written or none is.
    async fn update_rows(
        &self,
        updates: Vec<(usize, Vec<(Column, CellValue)>)>,
    ) -> Result<(), StoreError>;

    /// Overwrites the given cells of the row at `position`.
    async fn update_cells(
        &self,
        position: usize,
        cells: Vec<(Column, CellValue)>,
    ) -> Result<(), StoreError> {
        self.update_rows(vec![(position, cells)]).await
    }
}

/// Partial update of one content item.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Image(ImageData),
    Caption(CaptionState),
    Approval(ApprovalStatus),
    Posting {
        status: PostingStatus,
        at: Option<NaiveDateTime>,
    },
    GeneratedAt(NaiveDateTime),
    ErrorMessage(Option<String>),
}

impl FieldUpdate {
    fn into_cells(self) -> Vec<(Column, CellValue)> {
        match self {
            FieldUpdate::Image(image) => image_cells(Some(&image)).into_iter().collect(),
            FieldUpdate::Caption(caption) => vec![(Column::Caption, caption_cell(&caption))],
            FieldUpdate::Approval(status) => {
                vec![(Column::Approved, CellValue::raw(status.as_cell()))]
            }
            FieldUpdate::Posting { status, at } => {
                vec![(Column::PostedOnInstagram, posting_cell(status, at))]
            }
            FieldUpdate::GeneratedAt(at) => vec![(Column::GeneratedOn, generated_cell(Some(at)))],
            FieldUpdate::ErrorMessage(message) => vec![(
                Column::ErrorMessage,
                CellValue::raw(message.unwrap_or_default()),
            )],
        }
    }
}

/// Non-posted backlog and review queue sizes.
///
/// Posts are counted by distinct group (one multi-image post counts once),
/// stories by row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentCounts {
    pub posts: usize,
    pub stories: usize,
    pub posts_awaiting_review: usize,
    pub stories_awaiting_review: usize,
}

impl ContentCounts {
    pub fn from_items(items: &[ContentItem]) -> Self {
        let mut post_groups = HashSet::new();
        let mut review_groups = HashSet::new();
        let mut counts = ContentCounts::default();

        for item in items {
            let in_backlog = item.posting_status == PostingStatus::NotPosted;
            match item.content_type {
                ContentType::Post => {
                    if in_backlog {
                        post_groups.insert(item.group_id.as_str());
                    }
                    if item.awaits_review() {
                        review_groups.insert(item.group_id.as_str());
                    }
                }
                ContentType::Story => {
                    if in_backlog {
                        counts.stories += 1;
                    }
                    if item.awaits_review() {
                        counts.stories_awaiting_review += 1;
                    }
                }
            }
        }

        counts.posts = post_groups.len();
        counts.posts_awaiting_review = review_groups.len();
        counts
    }
}

struct Snapshot {
    items: Vec<ContentItem>,
    positions: HashMap<u64, usize>,
    fetched_at: Instant,
}

pub struct ContentStore {
    table: Arc<dyn TabularStore>,
    cache_ttl: Duration,
    cache: RwLock<Option<Snapshot>>,
}

impl ContentStore {
    pub fn new(table: Arc<dyn TabularStore>, cache_ttl: Duration) -> Self {
        Self {
            table,
            cache_ttl,
            cache: RwLock::new(None),
        }
    }

    /// All parsable items in index order. Malformed rows are logged and skipped.
    pub async fn get_all(&self, use_cache: bool) -> Result<Vec<ContentItem>, StoreError> {
        if use_cache {
            let cache = self.cache.read().await;
            if let Some(snapshot) = cache.as_ref() {
                if snapshot.fetched_at.elapsed() < self.cache_ttl {
                    debug!("Serving {} content items from cache", snapshot.items.len());
                    return Ok(snapshot.items.clone());
                }
            }
        }

        let snapshot = self.load().await?;
        let items = snapshot.items.clone();
        *self.cache.write().await = Some(snapshot);
        Ok(items)
    }

    async fn load(&self) -> Result<Snapshot, StoreError> {
        let rows = self.table.read_rows().await?;
        let mut items = Vec::with_capacity(rows.len());
        let mut positions = HashMap::new();
        let mut non_blank = 0usize;

        for row in &rows {
            match item_from_row(row) {
                Ok(item) => {
                    non_blank += 1;
                    if positions.insert(item.index, row.position).is_some() {
                        warn!(
                            "Duplicate index {} at row position {}, later row wins for updates",
                            item.index, row.position
                        );
                    }
                    items.push(item);
                }
                Err(RowParseError::Blank) => {}
                Err(e) => {
                    non_blank += 1;
                    warn!("Skipping malformed content row at position {}: {}", row.position, e);
                }
            }
        }

        if non_blank > 0 && items.is_empty() {
            return Err(StoreError::Unparsable(format!(
                "none of {} non-blank rows could be parsed",
                non_blank
            )));
        }

        items.sort_by_key(|item| item.index);
        debug!("Loaded {} content items from table", items.len());
        Ok(Snapshot {
            items,
            positions,
            fetched_at: Instant::now(),
        })
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Filter over `get_all`.
    pub async fn get_by_status(
        &self,
        approval: ApprovalStatus,
        posting: Option<PostingStatus>,
        content_type: Option<ContentType>,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let items = self.get_all(true).await?;
        Ok(items
            .into_iter()
            .filter(|item| item.approval_status == approval)
            .filter(|item| posting.map_or(true, |p| item.posting_status == p))
            .filter(|item| content_type.map_or(true, |t| item.content_type == t))
            .collect())
    }

    /// Appends the items after the current maximum index and returns them
    /// with their assigned indexes.
    ///
    /// Reads and appends are not atomic. Concurrent writers must be kept out
    /// by the run lock.
    pub async fn create_batch(
        &self,
        items: Vec<ContentItem>,
    ) -> Result<Vec<ContentItem>, StoreError> {
        if items.is_empty() {
            return Ok(items);
        }

        let current = self.get_all(false).await?;
        let last_index = current.iter().map(|item| item.index).max().unwrap_or(0);

        let created: Vec<ContentItem> = items
            .into_iter()
            .enumerate()
            .map(|(offset, mut item)| {
                item.index = last_index + offset as u64 + 1;
                item
            })
            .collect();

        let rows = created.iter().map(row::item_to_cells).collect();
        let result = self.table.append_rows(rows).await;
        self.invalidate().await;
        result?;

        info!(
            "Created {} content items (indexes {}..={})",
            created.len(),
            last_index + 1,
            last_index + created.len() as u64
        );
        Ok(created)
    }

    async fn position_of(&self, index: u64) -> Result<usize, StoreError> {
        {
            let cache = self.cache.read().await;
            if let Some(position) = cache.as_ref().and_then(|s| s.positions.get(&index)) {
                return Ok(*position);
            }
        }
        // Rows are append-only, so a miss means the snapshot predates the row
        self.get_all(false).await?;
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .and_then(|s| s.positions.get(&index).copied())
            .ok_or(StoreError::RowNotFound(index))
    }

    async fn write_cells(
        &self,
        index: u64,
        cells: Vec<(Column, CellValue)>,
    ) -> Result<(), StoreError> {
        let position = self.position_of(index).await?;
        let result = self.table.update_cells(position, cells).await;
        self.invalidate().await;
        result
    }

    /// Rewrites every mutable column of an existing item.
    pub async fn update_item(&self, item: &ContentItem) -> Result<(), StoreError> {
        self.write_cells(item.index, row::mutable_cells(item)).await?;
        debug!("Updated content item {}", item.index);
        Ok(())
    }

    pub async fn update_field(&self, index: u64, update: FieldUpdate) -> Result<(), StoreError> {
        self.update_fields(index, vec![update]).await
    }

    pub async fn update_fields(
        &self,
        index: u64,
        updates: Vec<FieldUpdate>,
    ) -> Result<(), StoreError> {
        let cells = updates.into_iter().flat_map(FieldUpdate::into_cells).collect();
        self.write_cells(index, cells).await?;
        debug!("Updated fields of content item {}", index);
        Ok(())
    }

    /// Marks every listed item as posted at `at` in a single table write.
    /// On failure no item is marked.
    pub async fn mark_posted(&self, indexes: &[u64], at: NaiveDateTime) -> Result<(), StoreError> {
        if indexes.is_empty() {
            return Ok(());
        }
        let mut updates = Vec::with_capacity(indexes.len());
        for index in indexes {
            let cells = FieldUpdate::Posting {
                status: PostingStatus::Posted,
                at: Some(at),
            }
            .into_cells();
            updates.push((self.position_of(*index).await?, cells));
        }

        let result = self.table.update_rows(updates).await;
        self.invalidate().await;
        result?;
        info!("Marked {} content items as posted", indexes.len());
        Ok(())
    }

    pub async fn get_counts(&self) -> Result<ContentCounts, StoreError> {
        let items = self.get_all(true).await?;
        Ok(ContentCounts::from_items(&items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalStatus, PromptData};

    fn draft(content_type: ContentType, group: &str) -> ContentItem {
        ContentItem::draft(
            PromptData {
                text: "prompt".to_string(),
                location: "Somewhere,Here".to_string(),
                content_type,
            },
            group,
            ApprovalStatus::Pending,
            CaptionState::Missing,
            Some(7),
        )
    }

    fn store_with(table: Arc<MemoryTable>) -> ContentStore {
        ContentStore::new(table, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_create_batch_assigns_indexes_after_max() {
        let table = Arc::new(MemoryTable::new());
        let store = store_with(table.clone());

        let first = store
            .create_batch(vec![draft(ContentType::Post, "a"), draft(ContentType::Post, "a")])
            .await
            .unwrap();
        assert_eq!(first.iter().map(|i| i.index).collect::<Vec<_>>(), vec![1, 2]);

        let second = store
            .create_batch(vec![draft(ContentType::Story, "b")])
            .await
            .unwrap();
        assert_eq!(second[0].index, 3);
        assert_eq!(store.get_all(true).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let table = Arc::new(MemoryTable::new());
        let store = store_with(table.clone());
        store
            .create_batch(vec![draft(ContentType::Post, "a")])
            .await
            .unwrap();
        table.push_raw_row(vec![
            (Column::Index, "2"),
            (Column::Type, "carousel"),
        ]);
        table.push_raw_row(vec![]);

        let items = store.get_all(false).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].index, 1);
    }

    #[tokio::test]
    async fn test_wholly_unparsable_table_is_an_error() {
        let table = Arc::new(MemoryTable::new());
        table.push_raw_row(vec![(Column::Index, "x"), (Column::Type, "posts")]);
        let store = store_with(table);
        assert!(matches!(
            store.get_all(false).await,
            Err(StoreError::Unparsable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_table_propagates() {
        let table = Arc::new(MemoryTable::new());
        table.fail_reads(true);
        let store = store_with(table);
        assert!(matches!(
            store.get_counts().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_serves_reads_until_invalidated() {
        let table = Arc::new(MemoryTable::new());
        let store = store_with(table.clone());
        store
            .create_batch(vec![draft(ContentType::Post, "a")])
            .await
            .unwrap();

        let first = store.get_counts().await.unwrap();
        let reads = table.read_count();
        let second = store.get_counts().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(table.read_count(), reads);

        // External edit is invisible until the cache is bypassed
        table.push_raw_row(vec![
            (Column::Index, "9"),
            (Column::Type, "story"),
            (Column::GroupId, "z"),
        ]);
        assert_eq!(store.get_counts().await.unwrap().stories, 0);
        assert_eq!(store.get_all(false).await.unwrap().len(), 2);
        assert_eq!(store.get_counts().await.unwrap().stories, 1);
    }

    #[tokio::test]
    async fn test_expired_cache_is_refetched() {
        let table = Arc::new(MemoryTable::new());
        let store = ContentStore::new(table.clone(), Duration::ZERO);
        store.get_all(true).await.unwrap();
        store.get_all(true).await.unwrap();
        assert_eq!(table.read_count(), 2);
    }

    #[tokio::test]
    async fn test_update_field_targets_row() {
        let table = Arc::new(MemoryTable::new());
        let store = store_with(table.clone());
        let created = store
            .create_batch(vec![draft(ContentType::Post, "a"), draft(ContentType::Post, "a")])
            .await
            .unwrap();

        store
            .update_field(
                created[1].index,
                FieldUpdate::Image(ImageData {
                    url: "https://img/2".to_string(),
                    width: Some(512),
                    height: Some(512),
                }),
            )
            .await
            .unwrap();

        let items = store.get_all(true).await.unwrap();
        assert!(items[0].image.is_none());
        assert_eq!(items[1].image.as_ref().unwrap().url, "https://img/2");
        assert_eq!(
            table.cell(1, Column::Image),
            Some("=IMAGE(\"https://img/2\", 4, 120, 120)".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_unknown_index_fails() {
        let store = store_with(Arc::new(MemoryTable::new()));
        assert_eq!(
            store
                .update_field(42, FieldUpdate::Approval(ApprovalStatus::Approved))
                .await,
            Err(StoreError::RowNotFound(42))
        );
    }

    #[tokio::test]
    async fn test_update_item_rewrites_mutable_columns() {
        let store = store_with(Arc::new(MemoryTable::new()));
        let mut item = store
            .create_batch(vec![draft(ContentType::Story, "s")])
            .await
            .unwrap()
            .remove(0);
        item.approval_status = ApprovalStatus::Rejected;
        item.error_message = Some("blurry".to_string());
        store.update_item(&item).await.unwrap();

        let stored = store.get_all(false).await.unwrap().remove(0);
        assert_eq!(stored.approval_status, ApprovalStatus::Rejected);
        assert_eq!(stored.error_message.as_deref(), Some("blurry"));
        assert_eq!(stored.id, item.id);
    }

    #[test]
    fn test_counts_group_posts_and_count_story_rows() {
        let mut items = vec![
            draft(ContentType::Post, "g1"),
            draft(ContentType::Post, "g1"),
            draft(ContentType::Post, "g2"),
            draft(ContentType::Story, "s1"),
            draft(ContentType::Story, "s2"),
        ];
        items[2].posting_status = PostingStatus::Posted;
        items[4].approval_status = ApprovalStatus::Rejected;
        items[0].image = Some(ImageData {
            url: "u".to_string(),
            width: None,
            height: None,
        });
        items[3].image = items[0].image.clone();

        let counts = ContentCounts::from_items(&items);
        assert_eq!(counts.posts, 1);
        assert_eq!(counts.stories, 2);
        assert_eq!(counts.posts_awaiting_review, 1);
        assert_eq!(counts.stories_awaiting_review, 1);
    }
    #[test]
    fn test_rejected_rows_still_fill_the_backlog() {
        let mut items = vec![draft(ContentType::Post, "g1"), draft(ContentType::Post, "g1")];
        for item in &mut items {
            item.approval_status = ApprovalStatus::Rejected;
        }
        assert_eq!(ContentCounts::from_items(&items).posts, 1);
    }

    #[tokio::test]
    async fn test_mark_posted_writes_all_rows_at_once() {
        let table = Arc::new(MemoryTable::new());
        let store = store_with(table.clone());
        let created = store
            .create_batch(vec![
                draft(ContentType::Post, "g"),
                draft(ContentType::Post, "g"),
                draft(ContentType::Post, "g"),
            ])
            .await
            .unwrap();
        let indexes: Vec<u64> = created.iter().map(|i| i.index).collect();
        store.get_all(false).await.unwrap();

        let reads = table.read_count();
        let writes = table.write_count();
        let at = NaiveDateTime::parse_from_str("2024-05-01 10:30", "%Y-%m-%d %H:%M").unwrap();
        store.mark_posted(&indexes, at).await.unwrap();
        assert_eq!(table.write_count(), writes + 1);
        assert_eq!(table.read_count(), reads);

        let items = store.get_all(false).await.unwrap();
        assert!(items.iter().all(|i| i.posting_status == PostingStatus::Posted));
        assert!(items.iter().all(|i| i.posted_at == Some(at)));
    }

    #[tokio::test]
    async fn test_failed_mark_posted_marks_nothing() {
        let table = Arc::new(MemoryTable::new());
        let store = store_with(table.clone());
        store
            .create_batch(vec![draft(ContentType::Post, "g"), draft(ContentType::Post, "g")])
            .await
            .unwrap();

        table.fail_writes(true);
        let at = NaiveDateTime::parse_from_str("2024-05-01 10:30", "%Y-%m-%d %H:%M").unwrap();
        assert!(store.mark_posted(&[1, 2], at).await.is_err());

        table.fail_writes(false);
        let items = store.get_all(false).await.unwrap();
        assert!(items.iter().all(|i| i.posting_status == PostingStatus::NotPosted));
    }
}
