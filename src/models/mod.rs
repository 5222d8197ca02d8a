// src/models/mod.rs
pub mod content;
pub mod row;

pub use content::{
    ApprovalPolicy, ApprovalStatus, CaptionData, CaptionState, ContentItem, ContentType,
    ImageData, PostingStatus, PromptData,
};
pub use row::{CellValue, Column, TableRow};
