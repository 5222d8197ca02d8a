// Content lifecycle workflows: backlog generation, publication and review reminders
pub mod caption_budget;
pub mod generation;
pub mod posting;
pub mod review_reminder;

pub use caption_budget::{AssembledCaption, HashtagBudget};
pub use generation::{BatchReport, GenerationOutcome, GenerationReport, GenerationWorkflow};
pub use posting::{select_group, GroupSelection, PostingOutcome, PostingPipeline};
pub use review_reminder::ReviewReminder;
