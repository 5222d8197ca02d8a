// src/config.rs
//! Runtime settings, read from the environment (and `.env` via dotenvy in main).

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{AutomationError, ConfigError};
use crate::models::ApprovalPolicy;
use crate::retry::{AdaptiveDelay, RetryPolicy};

pub const DEFAULT_BOILERPLATE_HASHTAGS: &[&str] = &[
    "#digitalmodel",
    "#fashionista",
    "#fashiongram",
    "#styleblogger",
    "#fashionblogger",
    "#fashionmodel",
    "#modelling",
    "#modelswanted",
    "#modelsearch",
    "#modelphotography",
    "#modelpose",
    "#modelstatus",
    "#modelsofinstagram",
    "#modelife",
    "#digitalinfluencer",
    "#VirtualModel",
    "#DigitalFashion",
];

pub const DEFAULT_NEGATIVE_PROMPT: &str = "(deformed iris, deformed pupils, semi-realistic, cgi, 3d, render, \
sketch, cartoon, drawing, anime:1.4), text, close up, cropped, out of frame, worst quality, \
low quality, jpeg artifacts, ugly, duplicate, morbid, mutilated, extra fingers, mutated hands, \
poorly drawn hands, poorly drawn face, mutation, deformed, blurry, dehydrated, bad anatomy, \
bad proportions, extra limbs, cloned face, disfigured, gross proportions, malformed limbs, \
missing arms, missing legs, extra arms, extra legs, fused fingers, too many fingers, long neck";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Generate posts when fewer non-posted groups than this exist.
    pub post_backlog_threshold: usize,
    pub story_backlog_threshold: usize,
    pub posts_per_batch: usize,
    pub stories_per_batch: usize,
    pub approval: ApprovalPolicy,
    pub story_captions: bool,
    /// Fixed image seed. `None` picks a random seed per item.
    pub seed: Option<i64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            post_backlog_threshold: 5,
            story_backlog_threshold: 5,
            posts_per_batch: 4,
            stories_per_batch: 2,
            approval: ApprovalPolicy::default(),
            story_captions: false,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostingSettings {
    pub boilerplate_hashtags: Vec<String>,
    pub max_hashtags: usize,
    pub mentions: Vec<String>,
    pub max_images_per_post: usize,
    pub max_stories_per_run: usize,
    pub profile_url: String,
    pub persona_name: String,
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self {
            boilerplate_hashtags: DEFAULT_BOILERPLATE_HASHTAGS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            max_hashtags: 30,
            mentions: Vec::new(),
            max_images_per_post: 6,
            max_stories_per_run: 4,
            profile_url: "https://www.instagram.com/".to_string(),
            persona_name: "Model".to_string(),
        }
    }
}

/// Fixed fragments wrapped around every generated image prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptStyle {
    pub character_prefix: String,
    pub character_suffix: String,
    pub negative_prompt: String,
}

impl Default for PromptStyle {
    fn default() -> Self {
        Self {
            character_prefix: "a beautiful and cute woman, single girl,".to_string(),
            character_suffix: "long haircut, light skin, (high detailed skin:1.3), 8k UHD DSLR, \
bokeh effect, soft lighting, high quality"
                .to_string(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingSettings {
    pub initial: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            min: Duration::from_millis(500),
            max: Duration::from_secs(60),
        }
    }
}

impl PacingSettings {
    pub fn build(&self) -> AdaptiveDelay {
        AdaptiveDelay::new(self.initial, self.min, self.max)
    }
}

/// Where the current base location comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationSource {
    Fixed(String),
    /// Text file holding the location, editable between runs.
    File(PathBuf),
}

impl LocationSource {
    pub async fn current(&self) -> Result<String, AutomationError> {
        let location = match self {
            LocationSource::Fixed(location) => location.trim().to_string(),
            LocationSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| {
                    AutomationError::Validation(format!(
                        "Current location file {} unreadable: {}",
                        path.display(),
                        e
                    ))
                })?
                .trim()
                .to_string(),
        };
        if location.is_empty() {
            return Err(AutomationError::Validation(
                "Current location is empty".to_string(),
            ));
        }
        Ok(location)
    }
}

/// Credentials and endpoints of the concrete providers. Missing values
/// disable the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub stable_diffusion_url: Option<String>,
    pub google_access_token: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub drive_folder_id: Option<String>,
    pub telegram_bot_url: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub generation: GenerationSettings,
    pub posting: PostingSettings,
    pub prompt_style: PromptStyle,
    pub retry: RetryPolicy,
    pub pacing: PacingSettings,
    pub cache_ttl: Duration,
    pub lock_path: PathBuf,
    pub location: LocationSource,
    pub review_reminder_threshold: usize,
    pub providers: ProviderSettings,
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                reason: e.to_string(),
            }),
        }
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.parse(key, default)?;
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(value)
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" | "on" => Ok(true),
                "0" | "false" | "no" | "n" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }

    fn seconds(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: f64 = self.parse(key, default.as_secs_f64())?;
        Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: secs.to_string(),
            reason: "must be a non-negative number of seconds".to_string(),
        })
    }

    /// Whitespace or comma separated tokens, each forced to start with `marker`.
    fn tokens(&self, key: &str, marker: char, default: Vec<String>) -> Vec<String> {
        match self.optional(key) {
            None => default,
            Some(value) => value
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .map(|t| {
                    if t.starts_with(marker) {
                        t.to_string()
                    } else {
                        format!("{}{}", marker, t)
                    }
                })
                .collect(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let generation_defaults = GenerationSettings::default();
        let seed = match env.parse::<i64>("IMAGE_SEED", -1)? {
            s if s < 0 => None,
            s => Some(s),
        };
        let generation = GenerationSettings {
            post_backlog_threshold: env.parse(
                "MAX_NON_POSTED_POSTS",
                generation_defaults.post_backlog_threshold,
            )?,
            story_backlog_threshold: env.parse(
                "MAX_NON_POSTED_STORIES",
                generation_defaults.story_backlog_threshold,
            )?,
            posts_per_batch: env.positive("POSTS_PER_BATCH", generation_defaults.posts_per_batch)?,
            stories_per_batch: env
                .positive("STORIES_PER_BATCH", generation_defaults.stories_per_batch)?,
            approval: ApprovalPolicy {
                auto_approve_posts: env.flag(
                    "AUTO_APPROVE_POSTS",
                    generation_defaults.approval.auto_approve_posts,
                )?,
                auto_approve_stories: env.flag(
                    "AUTO_APPROVE_STORIES",
                    generation_defaults.approval.auto_approve_stories,
                )?,
            },
            story_captions: env.flag("GENERATE_STORY_CAPTIONS", generation_defaults.story_captions)?,
            seed,
        };

        let posting_defaults = PostingSettings::default();
        let profile_url = match env.optional("INSTAGRAM_PROFILE") {
            Some(profile) if profile.starts_with("http") => profile,
            Some(profile) => format!(
                "https://www.instagram.com/{}",
                profile.trim_start_matches('@')
            ),
            None => posting_defaults.profile_url.clone(),
        };
        let posting = PostingSettings {
            boilerplate_hashtags: env.tokens(
                "BOILERPLATE_HASHTAGS",
                '#',
                posting_defaults.boilerplate_hashtags.clone(),
            ),
            max_hashtags: env.parse("MAX_HASHTAGS", posting_defaults.max_hashtags)?,
            mentions: env.tokens("POST_MENTIONS", '@', posting_defaults.mentions.clone()),
            max_images_per_post: env
                .positive("MAX_IMAGES_PER_POST", posting_defaults.max_images_per_post)?,
            max_stories_per_run: env
                .positive("MAX_STORIES_PER_RUN", posting_defaults.max_stories_per_run)?,
            profile_url,
            persona_name: env.string("PERSONA_NAME", &posting_defaults.persona_name),
        };

        let style_defaults = PromptStyle::default();
        let prompt_style = PromptStyle {
            character_prefix: env.string("CHARACTER_PREFIX", &style_defaults.character_prefix),
            character_suffix: env.string("CHARACTER_SUFFIX", &style_defaults.character_suffix),
            negative_prompt: env.string("NEGATIVE_PROMPT", &style_defaults.negative_prompt),
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            initial_delay: env.seconds("RETRY_INITIAL_DELAY_SECS", retry_defaults.initial_delay)?,
            max_delay: env.seconds("RETRY_MAX_DELAY_SECS", retry_defaults.max_delay)?,
            max_attempts: env.parse("RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?.max(1),
        };

        let pacing_defaults = PacingSettings::default();
        let pacing = PacingSettings {
            initial: env.seconds("CALL_DELAY_SECS", pacing_defaults.initial)?,
            min: env.seconds("CALL_DELAY_MIN_SECS", pacing_defaults.min)?,
            max: env.seconds("CALL_DELAY_MAX_SECS", pacing_defaults.max)?,
        };

        let location = match env.optional("CURRENT_LOCATION") {
            Some(location) => LocationSource::Fixed(location),
            None => LocationSource::File(PathBuf::from(env.string("LOCATION_FILE", "location.txt"))),
        };

        let providers = ProviderSettings {
            openai_api_key: env.optional("OPENAI_API_KEY"),
            openai_model: env.string("OPENAI_MODEL", "gpt-3.5-turbo"),
            stable_diffusion_url: env.optional("AUTOMATIC1111_URL"),
            google_access_token: env.optional("GOOGLE_ACCESS_TOKEN"),
            spreadsheet_id: env.optional("SPREADSHEET_ID"),
            sheet_name: env.string("SHEET_NAME", "Sheet1"),
            drive_folder_id: env.optional("DRIVE_FOLDER_ID"),
            telegram_bot_url: env.optional("TELEGRAM_WEBHOOK_URL"),
            telegram_chat_id: env.optional("TELEGRAM_CHAT_ID"),
        };

        let settings = Settings {
            generation,
            posting,
            prompt_style,
            retry,
            pacing,
            cache_ttl: env.seconds("CACHE_TTL_SECS", Duration::from_secs(300))?,
            lock_path: PathBuf::from(env.string("RUN_LOCK_FILE", "is_running.txt")),
            location,
            review_reminder_threshold: env.positive("REVIEW_REMINDER_THRESHOLD", 2)?,
            providers,
        };
        settings.warn_about_missing_providers();
        Ok(settings)
    }

    fn warn_about_missing_providers(&self) {
        let p = &self.providers;
        if p.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set - text generation disabled");
        }
        if p.stable_diffusion_url.is_none() {
            warn!("AUTOMATIC1111_URL not set - image generation disabled");
        }
        if p.google_access_token.is_none() || p.spreadsheet_id.is_none() {
            warn!("GOOGLE_ACCESS_TOKEN or SPREADSHEET_ID not set - content table unavailable");
        }
        if p.telegram_bot_url.is_none() || p.telegram_chat_id.is_none() {
            warn!("TELEGRAM_WEBHOOK_URL or TELEGRAM_CHAT_ID not set - notifications only logged");
        }
    }
}
