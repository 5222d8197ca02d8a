// src/services/image_service.rs
// Renders an item's prompt, uploads the result and returns its public URL

use std::sync::Arc;

use rand::Rng;
use tracing::info;

use crate::capabilities::{ImageGenerator, ObjectStorage, Txt2ImgConfig};
use crate::error::AutomationError;
use crate::models::{ContentItem, ContentType, ImageData};
use crate::retry::{AdaptiveDelay, RetryPolicy};

/// Sampler settings per content type.
pub fn txt2img_config(
    content_type: ContentType,
    prompt: &str,
    negative_prompt: &str,
    seed: i64,
) -> Txt2ImgConfig {
    let (sampler, steps, cfg_scale, width, height) = match content_type {
        ContentType::Post => ("DPM++ 2M", 120, 3.5, 512, 512),
        ContentType::Story => ("DPM++ 2M Karras", 100, 7.0, 720, 1080),
    };
    Txt2ImgConfig {
        prompt: prompt.to_string(),
        negative_prompt: negative_prompt.to_string(),
        seed,
        sampler_name: sampler.to_string(),
        steps,
        cfg_scale,
        width,
        height,
        restore_faces: true,
        batch_size: 1,
    }
}

/// Upload name: the row index followed by a short slug of the prompt.
pub fn image_filename(index: u64, prompt: &str) -> String {
    let slug: String = prompt
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .take(6)
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        format!("{}.png", index)
    } else {
        format!("{}-{}.png", index, slug)
    }
}

pub fn random_seed() -> i64 {
    rand::thread_rng().gen_range(0..300_000)
}

pub struct ImageService {
    images: Arc<dyn ImageGenerator>,
    storage: Arc<dyn ObjectStorage>,
    retry: RetryPolicy,
    pacing: Arc<AdaptiveDelay>,
    negative_prompt: String,
    folder: String,
}

impl ImageService {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        storage: Arc<dyn ObjectStorage>,
        retry: RetryPolicy,
        pacing: Arc<AdaptiveDelay>,
        negative_prompt: String,
        folder: String,
    ) -> Self {
        Self {
            images,
            storage,
            retry,
            pacing,
            negative_prompt,
            folder,
        }
    }

    pub async fn is_available(&self) -> bool {
        self.images.is_available().await
    }

    /// Generates, uploads and describes the image of one item.
    pub async fn render(&self, item: &ContentItem) -> Result<ImageData, AutomationError> {
        let seed = item.seed.unwrap_or_else(random_seed);
        let config = txt2img_config(
            item.content_type,
            &item.prompt.text,
            &self.negative_prompt,
            seed,
        );

        self.pacing.pause().await;
        let label = format!("image for item {}", item.index);
        let payload = self
            .retry
            .run(&label, Some(&self.pacing), || self.images.text_to_image(&config))
            .await
            .map_err(|e| AutomationError::ImageGeneration(e.to_string()))?;
        let bytes = payload
            .into_bytes()
            .map_err(|e| AutomationError::ImageGeneration(e.to_string()))?;

        let filename = image_filename(item.index, &item.prompt.text);
        let url = self
            .retry
            .run("image upload", None, || {
                self.storage.upload(bytes.clone(), &filename, &self.folder)
            })
            .await
            .map_err(|e| AutomationError::ImageGeneration(format!("Upload failed: {}", e)))?;

        info!("Image for item {} available at {}", item.index, url);
        Ok(ImageData {
            url,
            width: Some(config.width),
            height: Some(config.height),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_per_content_type() {
        let post = txt2img_config(ContentType::Post, "p", "n", 5);
        assert_eq!((post.width, post.height, post.steps), (512, 512, 120));
        assert_eq!(post.sampler_name, "DPM++ 2M");
        assert_eq!(post.cfg_scale, 3.5);

        let story = txt2img_config(ContentType::Story, "p", "n", 5);
        assert_eq!((story.width, story.height, story.steps), (720, 1080, 100));
        assert_eq!(story.sampler_name, "DPM++ 2M Karras");
        assert!(story.restore_faces);
    }

    #[test]
    fn test_image_filename() {
        assert_eq!(
            image_filename(12, "a beautiful and cute woman, single girl, at Gion"),
            "12-a-beautiful-and-cute-woman-single.png"
        );
        assert_eq!(image_filename(3, "!!!"), "3.png");
    }

    #[test]
    fn test_random_seed_range() {
        for _ in 0..50 {
            let seed = random_seed();
            assert!((0..300_000).contains(&seed));
        }
    }
}
