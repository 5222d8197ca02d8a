use std::process::ExitCode;
use std::sync::Arc;

use content_pilot::capabilities::{Notifier, Poster};
use content_pilot::config::Settings;
use content_pilot::drive_client::DriveClient;
use content_pilot::error::{AutomationError, ConfigError};
use content_pilot::openai_client::OpenAiClient;
use content_pilot::run_lock::RunLock;
use content_pilot::services::{ImageService, NotificationService, PromptService};
use content_pilot::sheets_client::SheetsClient;
use content_pilot::stable_diffusion_client::StableDiffusionClient;
use content_pilot::store::ContentStore;
use content_pilot::telegram_client::TelegramClient;
use content_pilot::workflow::{
    GenerationOutcome, GenerationWorkflow, PostingOutcome, PostingPipeline, ReviewReminder,
};

const USAGE: &str = "Usage: content_pilot <generate|post|stories|remind|post-processing>";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Generate,
    Post,
    Stories,
    Remind,
    PostProcessing,
}

impl Command {
    fn parse(arg: &str) -> Option<Self> {
        match arg {
            "generate" => Some(Command::Generate),
            "post" => Some(Command::Post),
            "stories" => Some(Command::Stories),
            "remind" => Some(Command::Remind),
            "post-processing" => Some(Command::PostProcessing),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(command) = std::env::args().nth(1).as_deref().and_then(Command::parse) else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };
    tracing::info!("Command: {:?}", command);

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ {:?} failed: {}", command, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), AutomationError> {
    if command == Command::PostProcessing {
        tracing::info!("Image post-processing is handled by an external tool, nothing to do");
        return Ok(());
    }

    let settings = Settings::from_env()?;
    let providers = &settings.providers;

    let telegram = match (&providers.telegram_bot_url, &providers.telegram_chat_id) {
        (Some(url), Some(chat_id)) => Some(Arc::new(TelegramClient::new(url, chat_id))),
        _ => None,
    };
    let notifications = match &telegram {
        Some(client) => NotificationService::new(client.clone() as Arc<dyn Notifier>),
        None => NotificationService::disabled(),
    };

    let store = Arc::new(ContentStore::new(
        Arc::new(SheetsClient::new(
            required(&providers.google_access_token, "GOOGLE_ACCESS_TOKEN")?,
            required(&providers.spreadsheet_id, "SPREADSHEET_ID")?,
            providers.sheet_name.clone(),
        )),
        settings.cache_ttl,
    ));
    let lock = RunLock::file(settings.lock_path.clone());

    match command {
        Command::Generate => {
            let pacing = Arc::new(settings.pacing.build());
            let text = OpenAiClient::new(
                required(&providers.openai_api_key, "OPENAI_API_KEY")?,
                providers.openai_model.clone(),
            );
            let images = StableDiffusionClient::new(required(
                &providers.stable_diffusion_url,
                "AUTOMATIC1111_URL",
            )?);
            let storage = DriveClient::new(required(
                &providers.google_access_token,
                "GOOGLE_ACCESS_TOKEN",
            )?);

            let workflow = GenerationWorkflow::new(
                store,
                lock,
                PromptService::new(
                    Arc::new(text),
                    settings.retry,
                    pacing.clone(),
                    settings.prompt_style.clone(),
                ),
                ImageService::new(
                    Arc::new(images),
                    Arc::new(storage),
                    settings.retry,
                    pacing,
                    settings.prompt_style.negative_prompt.clone(),
                    providers.drive_folder_id.clone().unwrap_or_default(),
                ),
                notifications,
                settings.generation.clone(),
                settings.location.clone(),
            );
            match workflow.run().await? {
                GenerationOutcome::AlreadyRunning => tracing::info!("Generation skipped, run lock held"),
                GenerationOutcome::Completed(report) => tracing::info!("✅ Generation done: {:?}", report),
            }
        }
        Command::Post | Command::Stories => {
            let poster: Arc<dyn Poster> = match &telegram {
                Some(client) => client.clone(),
                None => {
                    return Err(ConfigError::Missing("TELEGRAM_WEBHOOK_URL".to_string()).into())
                }
            };
            let pipeline = PostingPipeline::new(
                store,
                lock,
                poster,
                notifications,
                settings.posting.clone(),
                settings.location.clone(),
            );
            let outcome = if command == Command::Post {
                pipeline.post_next_group().await?
            } else {
                pipeline.post_stories().await?
            };
            match outcome {
                PostingOutcome::Failed { message } => {
                    tracing::warn!("Publication failed and will be retried next run: {}", message)
                }
                other => tracing::info!("Publication finished: {:?}", other),
            }
        }
        Command::Remind => {
            let reminder = ReviewReminder::new(store, notifications, settings.review_reminder_threshold);
            let sent = reminder.run().await?;
            tracing::info!("{} review reminder(s) sent", sent.len());
        }
        Command::PostProcessing => {}
    }
    Ok(())
}

fn required(value: &Option<String>, key: &str) -> Result<String, ConfigError> {
    value.clone().ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,content_pilot=trace,reqwest=info,hyper=info".to_string()
        } else {
            "info,content_pilot=info,reqwest=warn,hyper=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for scheduled runs (easier for log aggregation)
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("📸 content_pilot starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    let configured = |key: &str| if std::env::var(key).is_ok() { "✅" } else { "❌" };
    tracing::info!(
        "Configuration - OpenAI: {}, Stable Diffusion: {}, Sheets: {}, Telegram: {}",
        configured("OPENAI_API_KEY"),
        configured("AUTOMATIC1111_URL"),
        configured("SPREADSHEET_ID"),
        configured("TELEGRAM_WEBHOOK_URL")
    );

    Ok(())
}
