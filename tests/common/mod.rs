// Shared fakes for the workflow scenario tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use content_pilot::capabilities::{
    ImageGenerator, ImagePayload, Notifier, ObjectStorage, Poster, PublishRequest, Severity,
    TextGenerator, Txt2ImgConfig,
};
use content_pilot::config::{GenerationSettings, LocationSource, PostingSettings, PromptStyle};
use content_pilot::error::CapabilityError;
use content_pilot::retry::{AdaptiveDelay, RetryPolicy};
use content_pilot::run_lock::{MemoryRunFlag, RunLock};
use content_pilot::services::{ImageService, NotificationService, PromptService};
use content_pilot::store::{ContentStore, MemoryTable};
use content_pilot::workflow::{GenerationWorkflow, PostingPipeline};

pub const LOCATION: &str = "Kyoto";

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        max_attempts: 2,
    }
}

/// Canned text answers, picked by what the request asks for.
#[derive(Default)]
pub struct FakeText {
    pub calls: AtomicUsize,
    pub fail_prompts: AtomicBool,
    pub fail_captions: AtomicBool,
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate(
        &self,
        prompt: &str,
        _system_message: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("list of places") && self.fail_prompts.load(Ordering::SeqCst) {
            return Err(CapabilityError::Unavailable("model overloaded".to_string()));
        }
        if prompt.contains("list of places") {
            return Ok((1..=6)
                .map(|i| format!("Place Name: Temple {}\nDescription: quiet garden number {}", i, i))
                .collect::<Vec<_>>()
                .join("\n"));
        }
        if prompt.contains("prompts describing") {
            return Ok("1. Walking by the river\n2. Drinking matcha\n3. Watching lanterns".to_string());
        }
        if self.fail_captions.load(Ordering::SeqCst) {
            return Err(CapabilityError::Rejected("caption refused".to_string()));
        }
        Ok("\"Feeling zen today 🍵 #kyoto #temple\"".to_string())
    }
}

/// Fails for every prompt containing one of `fail_on`.
#[derive(Default)]
pub struct FakeImages {
    pub calls: AtomicUsize,
    pub fail_on: Vec<String>,
    pub unavailable: bool,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn text_to_image(&self, config: &Txt2ImgConfig) -> Result<ImagePayload, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.iter().any(|marker| config.prompt.contains(marker.as_str())) {
            return Err(CapabilityError::Rejected("render failed".to_string()));
        }
        Ok(ImagePayload::Bytes(config.prompt.as_bytes().to_vec()))
    }

    async fn is_available(&self) -> bool {
        !self.unavailable
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub uploads: AtomicUsize,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        filename: &str,
        _folder: &str,
    ) -> Result<String, CapabilityError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://storage.test/{}", filename))
    }
}

#[derive(Default)]
pub struct FakePoster {
    pub requests: Mutex<Vec<PublishRequest>>,
    pub fail: AtomicBool,
}

impl FakePoster {
    pub fn requests(&self) -> Vec<PublishRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Poster for FakePoster {
    async fn post(&self, request: &PublishRequest) -> Result<(), CapabilityError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CapabilityError::Unavailable("network down".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn has(&self, severity: Severity, fragment: &str) -> bool {
        self.messages()
            .iter()
            .any(|(message, s)| *s == severity && message.contains(fragment))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str, severity: Severity) -> Result<(), CapabilityError> {
        self.sent.lock().unwrap().push((message.to_string(), severity));
        Ok(())
    }
}

pub struct Harness {
    pub table: Arc<MemoryTable>,
    pub store: Arc<ContentStore>,
    pub lock: RunLock,
    pub text: Arc<FakeText>,
    pub images: Arc<FakeImages>,
    pub storage: Arc<FakeStorage>,
    pub poster: Arc<FakePoster>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_images(FakeImages::default())
    }

    pub fn with_images(images: FakeImages) -> Self {
        let table = Arc::new(MemoryTable::new());
        Self {
            store: Arc::new(ContentStore::new(table.clone(), Duration::from_secs(60))),
            table,
            lock: RunLock::new(Arc::new(MemoryRunFlag::default())),
            text: Arc::new(FakeText::default()),
            images: Arc::new(images),
            storage: Arc::new(FakeStorage::default()),
            poster: Arc::new(FakePoster::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.notifier.clone())
    }

    pub fn generation(&self, settings: GenerationSettings) -> GenerationWorkflow {
        let pacing = Arc::new(AdaptiveDelay::disabled());
        GenerationWorkflow::new(
            self.store.clone(),
            self.lock.clone(),
            PromptService::new(
                self.text.clone(),
                fast_retry(),
                pacing.clone(),
                PromptStyle::default(),
            ),
            ImageService::new(
                self.images.clone(),
                self.storage.clone(),
                fast_retry(),
                pacing,
                "blurry".to_string(),
                "folder".to_string(),
            ),
            self.notifications(),
            settings,
            LocationSource::Fixed(LOCATION.to_string()),
        )
    }

    pub fn posting(&self) -> PostingPipeline {
        self.posting_from(LocationSource::Fixed(LOCATION.to_string()))
    }

    pub fn posting_from(&self, location: LocationSource) -> PostingPipeline {
        PostingPipeline::new(
            self.store.clone(),
            self.lock.clone(),
            self.poster.clone(),
            self.notifications(),
            PostingSettings::default(),
            location,
        )
    }
}
