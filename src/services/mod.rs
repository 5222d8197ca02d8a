// src/services/mod.rs
pub mod image_service;
pub mod notification_service;
pub mod prompt_service;

pub use image_service::ImageService;
pub use notification_service::NotificationService;
pub use prompt_service::PromptService;
