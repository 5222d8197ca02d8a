// lib.rs - Content pipeline library: store, capabilities, services and workflows
pub mod capabilities;
pub mod config;
pub mod drive_client;
pub mod error;
pub mod models;
pub mod openai_client;
pub mod retry;
pub mod run_lock;
pub mod services;
pub mod sheets_client;
pub mod stable_diffusion_client;
pub mod store;
pub mod telegram_client;
pub mod workflow;

// Re-export commonly used types for convenience
pub use config::Settings;
pub use error::{AutomationError, CapabilityError, StoreError};
pub use models::{ContentItem, ContentType};
pub use store::ContentStore;
