// src/models/row.rs
//! Row representation of the content table and the row <-> entity mapping.
//!
//! Cells hold either a raw value or a display wrapper (`=IMAGE(...)`,
//! `=HYPERLINK(...)`). Existing readers of the table rely on the wrappers, so
//! they are written back in the same form.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use super::content::{
    ApprovalStatus, CaptionData, CaptionState, ContentItem, ContentType, ImageData, PostingStatus,
    PromptData,
};

pub const GENERATED_ON_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
pub const POSTED_ON_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Caption cell of group members whose caption lives on the holder.
pub const DELEGATED_CAPTION: &str = "-";

lazy_static! {
    static ref IMAGE_FORMULA: Regex = Regex::new(r#"(?i)^=IMAGE\(\s*"([^"]*)""#).unwrap();
    static ref HYPERLINK_FORMULA: Regex =
        Regex::new(r#"(?i)^=HYPERLINK\(\s*"([^"]*)"(?:\s*,\s*"([^"]*)")?"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Index,
    Type,
    Prompt,
    Location,
    GroupId,
    Seed,
    Image,
    GeneratedOn,
    Caption,
    Approved,
    PostedOnInstagram,
    HyperlinkImage,
    CreatedOn,
    ErrorMessage,
    ContentId,
}

impl Column {
    /// Table order. The first twelve are the legacy layout, the rest were appended.
    pub const ALL: [Column; 15] = [
        Column::Index,
        Column::Type,
        Column::Prompt,
        Column::Location,
        Column::GroupId,
        Column::Seed,
        Column::Image,
        Column::GeneratedOn,
        Column::Caption,
        Column::Approved,
        Column::PostedOnInstagram,
        Column::HyperlinkImage,
        Column::CreatedOn,
        Column::ErrorMessage,
        Column::ContentId,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Index => "index",
            Column::Type => "type",
            Column::Prompt => "prompt",
            Column::Location => "location",
            Column::GroupId => "group_id",
            Column::Seed => "seed",
            Column::Image => "image",
            Column::GeneratedOn => "generated_on",
            Column::Caption => "caption",
            Column::Approved => "approved",
            Column::PostedOnInstagram => "posted_on_instagram",
            Column::HyperlinkImage => "hyperlink_image",
            Column::CreatedOn => "created_on",
            Column::ErrorMessage => "error_message",
            Column::ContentId => "content_id",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        Column::ALL.into_iter().find(|c| c.header() == header)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Raw(String),
    Image { url: String },
    Hyperlink { url: String, label: String },
}

impl CellValue {
    pub fn raw(value: impl Into<String>) -> Self {
        CellValue::Raw(value.into())
    }

    pub fn empty() -> Self {
        CellValue::Raw(String::new())
    }

    /// Recognises the display wrappers, anything else stays raw.
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if let Some(caps) = IMAGE_FORMULA.captures(cell) {
            return CellValue::Image {
                url: caps[1].to_string(),
            };
        }
        if let Some(caps) = HYPERLINK_FORMULA.captures(cell) {
            return CellValue::Hyperlink {
                url: caps[1].to_string(),
                label: caps
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "Link".to_string()),
            };
        }
        CellValue::Raw(cell.to_string())
    }

    /// Text written to the table.
    pub fn to_cell_string(&self) -> String {
        match self {
            CellValue::Raw(value) => value.clone(),
            CellValue::Image { url } => format!("=IMAGE(\"{}\", 4, 120, 120)", url),
            CellValue::Hyperlink { url, label } => format!("=HYPERLINK(\"{}\", \"{}\")", url, label),
        }
    }

    /// Underlying value: the raw text, or the URL of a wrapper.
    pub fn value(&self) -> &str {
        match self {
            CellValue::Raw(value) => value.as_str(),
            CellValue::Image { url } | CellValue::Hyperlink { url, .. } => url.as_str(),
        }
    }
}

/// One data row. `position` is the 0-based offset below the header row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub position: usize,
    pub cells: HashMap<Column, CellValue>,
}

impl TableRow {
    pub fn new(position: usize) -> Self {
        Self {
            position,
            cells: HashMap::new(),
        }
    }

    pub fn with(mut self, column: Column, value: CellValue) -> Self {
        self.cells.insert(column, value);
        self
    }

    pub fn value(&self, column: Column) -> &str {
        self.cells.get(&column).map(|c| c.value().trim()).unwrap_or("")
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|c| c.value().trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowParseError {
    /// Nothing in the row. Skipped without a warning.
    Blank,
    Invalid {
        column: Column,
        value: String,
    },
}

impl std::fmt::Display for RowParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowParseError::Blank => write!(f, "blank row"),
            RowParseError::Invalid { column, value } => {
                write!(f, "invalid {} value {:?}", column.header(), value)
            }
        }
    }
}

fn parse_index(value: &str) -> Option<u64> {
    if let Ok(index) = value.parse::<u64>() {
        return Some(index);
    }
    // Numeric cells may come back as floats
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
        .map(|v| v as u64)
}

fn parse_seed(value: &str) -> Option<i64> {
    let seed = value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v as i64))?;
    (seed >= 0).then_some(seed)
}

fn parse_posting(value: &str) -> (PostingStatus, Option<NaiveDateTime>) {
    if value.is_empty() {
        return (PostingStatus::NotPosted, None);
    }
    if value.eq_ignore_ascii_case("failed") {
        return (PostingStatus::Failed, None);
    }
    // Any other non-empty value counts as published
    (
        PostingStatus::Posted,
        NaiveDateTime::parse_from_str(value, POSTED_ON_FORMAT).ok(),
    )
}

fn parse_caption(value: &str) -> CaptionState {
    match value {
        "" => CaptionState::Missing,
        DELEGATED_CAPTION => CaptionState::Delegated,
        text => CaptionState::Written(CaptionData::from_text(text)),
    }
}

/// Builds a content item from one table row.
pub fn item_from_row(row: &TableRow) -> Result<ContentItem, RowParseError> {
    if row.is_blank() {
        return Err(RowParseError::Blank);
    }
    let invalid = |column: Column| RowParseError::Invalid {
        column,
        value: row.value(column).to_string(),
    };

    let index = parse_index(row.value(Column::Index)).ok_or_else(|| invalid(Column::Index))?;
    let content_type =
        ContentType::from_cell(row.value(Column::Type)).ok_or_else(|| invalid(Column::Type))?;
    let approval_status = ApprovalStatus::from_cell(row.value(Column::Approved))
        .ok_or_else(|| invalid(Column::Approved))?;
    let (posting_status, posted_at) = parse_posting(row.value(Column::PostedOnInstagram));

    let image_url = row.value(Column::Image);
    let image_url = if image_url.is_empty() {
        row.value(Column::HyperlinkImage)
    } else {
        image_url
    };
    let image = (!image_url.is_empty()).then(|| ImageData {
        url: image_url.to_string(),
        width: None,
        height: None,
    });

    let generated_at =
        NaiveDateTime::parse_from_str(row.value(Column::GeneratedOn), GENERATED_ON_FORMAT).ok();
    let created_at = DateTime::parse_from_rfc3339(row.value(Column::CreatedOn))
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| generated_at.map(|t| t.and_utc()))
        .unwrap_or_default();
    let id = Uuid::parse_str(row.value(Column::ContentId))
        .unwrap_or_else(|_| ContentItem::legacy_id(index));
    let location = row.value(Column::Location).to_string();
    let error_message = Some(row.value(Column::ErrorMessage))
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Ok(ContentItem {
        id,
        index,
        content_type,
        group_id: row.value(Column::GroupId).to_string(),
        prompt: PromptData {
            text: row.value(Column::Prompt).to_string(),
            location: location.clone(),
            content_type,
        },
        caption: parse_caption(row.value(Column::Caption)),
        image,
        location,
        approval_status,
        posting_status,
        created_at,
        generated_at,
        posted_at,
        seed: parse_seed(row.value(Column::Seed)),
        error_message,
    })
}

pub fn caption_cell(caption: &CaptionState) -> CellValue {
    match caption {
        CaptionState::Missing => CellValue::empty(),
        CaptionState::Delegated => CellValue::raw(DELEGATED_CAPTION),
        CaptionState::Written(data) => CellValue::raw(data.text.clone()),
    }
}

pub fn image_cells(image: Option<&ImageData>) -> [(Column, CellValue); 2] {
    match image {
        Some(image) => [
            (
                Column::Image,
                CellValue::Image {
                    url: image.url.clone(),
                },
            ),
            (
                Column::HyperlinkImage,
                CellValue::Hyperlink {
                    url: image.url.clone(),
                    label: "Link".to_string(),
                },
            ),
        ],
        None => [
            (Column::Image, CellValue::empty()),
            (Column::HyperlinkImage, CellValue::empty()),
        ],
    }
}

pub fn posting_cell(status: PostingStatus, at: Option<NaiveDateTime>) -> CellValue {
    match (status, at) {
        (PostingStatus::NotPosted, _) => CellValue::empty(),
        (PostingStatus::Failed, _) => CellValue::raw("failed"),
        (PostingStatus::Posted, Some(at)) => CellValue::raw(at.format(POSTED_ON_FORMAT).to_string()),
        (PostingStatus::Posted, None) => CellValue::raw("posted"),
    }
}

pub fn generated_cell(at: Option<NaiveDateTime>) -> CellValue {
    at.map(|t| CellValue::raw(t.format(GENERATED_ON_FORMAT).to_string()))
        .unwrap_or_else(CellValue::empty)
}

/// All mutable columns of an item, i.e. everything except `index` and `content_id`.
pub fn mutable_cells(item: &ContentItem) -> Vec<(Column, CellValue)> {
    let mut cells = vec![
        (Column::Type, CellValue::raw(item.content_type.as_cell())),
        (Column::Prompt, CellValue::raw(item.prompt.text.clone())),
        (Column::Location, CellValue::raw(item.location.clone())),
        (Column::GroupId, CellValue::raw(item.group_id.clone())),
        (
            Column::Seed,
            CellValue::raw(item.seed.map(|s| s.to_string()).unwrap_or_else(|| "-1".to_string())),
        ),
        (Column::GeneratedOn, generated_cell(item.generated_at)),
        (Column::Caption, caption_cell(&item.caption)),
        (Column::Approved, CellValue::raw(item.approval_status.as_cell())),
        (
            Column::PostedOnInstagram,
            posting_cell(item.posting_status, item.posted_at),
        ),
        (Column::CreatedOn, CellValue::raw(item.created_at.to_rfc3339())),
        (
            Column::ErrorMessage,
            CellValue::raw(item.error_message.clone().unwrap_or_default()),
        ),
    ];
    cells.extend(image_cells(item.image.as_ref()));
    cells
}

/// Every column of an item, ready to append.
pub fn item_to_cells(item: &ContentItem) -> Vec<(Column, CellValue)> {
    let mut cells = vec![
        (Column::Index, CellValue::raw(item.index.to_string())),
        (Column::ContentId, CellValue::raw(item.id.to_string())),
    ];
    cells.extend(mutable_cells(item));
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_row() -> TableRow {
        TableRow::new(3)
            .with(Column::Index, CellValue::raw("4"))
            .with(Column::Type, CellValue::raw("posts"))
            .with(Column::Prompt, CellValue::raw("at the old bridge"))
            .with(Column::Location, CellValue::raw("Old Bridge,Prague"))
            .with(Column::GroupId, CellValue::raw("g-1"))
            .with(Column::Seed, CellValue::raw("-1"))
            .with(Column::Image, CellValue::parse("=IMAGE(\"https://img/4\", 4, 120, 120)"))
            .with(Column::GeneratedOn, CellValue::raw("02/03/2024 10:11:12"))
            .with(Column::Caption, CellValue::raw("-"))
            .with(Column::Approved, CellValue::raw("y"))
            .with(Column::PostedOnInstagram, CellValue::raw("2024-03-04 09:30"))
    }

    #[test]
    fn test_display_wrappers_are_recognised() {
        assert_eq!(
            CellValue::parse("=IMAGE(\"https://x/y.png\", 4, 120, 120)"),
            CellValue::Image {
                url: "https://x/y.png".to_string()
            }
        );
        assert_eq!(
            CellValue::parse("=HYPERLINK(\"https://x\", \"Link\")"),
            CellValue::Hyperlink {
                url: "https://x".to_string(),
                label: "Link".to_string()
            }
        );
        assert_eq!(CellValue::parse("plain"), CellValue::raw("plain"));
    }

    #[test]
    fn test_wrappers_written_in_legacy_form() {
        let [(_, image), (_, link)] = image_cells(Some(&ImageData {
            url: "https://x".to_string(),
            width: Some(512),
            height: Some(512),
        }));
        assert_eq!(image.to_cell_string(), "=IMAGE(\"https://x\", 4, 120, 120)");
        assert_eq!(link.to_cell_string(), "=HYPERLINK(\"https://x\", \"Link\")");
    }

    #[test]
    fn test_legacy_row_maps_to_item() {
        let item = item_from_row(&legacy_row()).unwrap();
        assert_eq!(item.index, 4);
        assert_eq!(item.content_type, ContentType::Post);
        assert_eq!(item.caption, CaptionState::Delegated);
        assert_eq!(item.image.as_ref().unwrap().url, "https://img/4");
        assert_eq!(item.approval_status, ApprovalStatus::Approved);
        assert_eq!(item.posting_status, PostingStatus::Posted);
        assert!(item.posted_at.is_some());
        assert!(item.generated_at.is_some());
        assert_eq!(item.seed, None);
        assert_eq!(item.id, ContentItem::legacy_id(4));
    }

    #[test]
    fn test_float_index_is_accepted() {
        let row = legacy_row().with(Column::Index, CellValue::raw("12.0"));
        assert_eq!(item_from_row(&row).unwrap().index, 12);
    }

    #[test]
    fn test_malformed_rows_are_rejected() {
        let row = legacy_row().with(Column::Type, CellValue::raw("reel"));
        assert!(matches!(
            item_from_row(&row),
            Err(RowParseError::Invalid {
                column: Column::Type,
                ..
            })
        ));

        let row = legacy_row().with(Column::Index, CellValue::raw("abc"));
        assert!(item_from_row(&row).is_err());

        assert_eq!(item_from_row(&TableRow::new(0)), Err(RowParseError::Blank));
    }

    #[test]
    fn test_unreadable_posted_value_still_counts_as_posted() {
        let row = legacy_row().with(Column::PostedOnInstagram, CellValue::raw("yes!"));
        let item = item_from_row(&row).unwrap();
        assert_eq!(item.posting_status, PostingStatus::Posted);
        assert_eq!(item.posted_at, None);
    }

    #[test]
    fn test_item_cells_read_back() {
        let original = item_from_row(&legacy_row()).unwrap();
        let mut row = TableRow::new(0);
        for (column, value) in item_to_cells(&original) {
            row.cells.insert(column, value);
        }
        let parsed = item_from_row(&row).unwrap();
        assert_eq!(parsed.index, original.index);
        assert_eq!(parsed.caption, original.caption);
        assert_eq!(parsed.image, original.image);
        assert_eq!(parsed.posting_status, original.posting_status);
        assert_eq!(parsed.id, original.id);
    }
}
