// src/services/prompt_service.rs
// Prompt and caption generation through the AI text capability

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::capabilities::TextGenerator;
use crate::config::PromptStyle;
use crate::error::{AutomationError, CapabilityError};
use crate::models::{CaptionData, ContentType, PromptData};
use crate::retry::{AdaptiveDelay, RetryPolicy};

const POST_SYSTEM_MESSAGE: &str = "You are instagram influencer and prompt engineer. \
Respond in third person in the list which was asked, nothing else.";
const STORY_SYSTEM_MESSAGE: &str = "You are instagram influencer and prompt engineer";

lazy_static! {
    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:\d+\s*[.)-]|[-*•])\s*").unwrap();
}

/// Pairs `Place Name: ...` lines with the `Description: ...` line that follows.
pub fn parse_place_descriptions(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut place: Option<String> = None;

    for line in text.lines() {
        let line = line.replace("**", "");
        let is_place = line.contains("Place Name");
        if !is_place && !line.contains("Description") {
            continue;
        }
        let Some((_, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        if is_place {
            place = Some(value);
        } else if let Some(name) = place.take() {
            pairs.push((name, value));
        }
    }
    pairs
}

/// Non-empty lines with list numbering or bullets removed.
pub fn parse_scene_lines(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .take(limit)
        .collect()
}

pub fn clean_caption(text: &str) -> String {
    text.replace('"', "").trim().to_string()
}

pub struct PromptService {
    text: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    pacing: Arc<AdaptiveDelay>,
    style: PromptStyle,
}

impl PromptService {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        pacing: Arc<AdaptiveDelay>,
        style: PromptStyle,
    ) -> Self {
        Self {
            text,
            retry,
            pacing,
            style,
        }
    }

    async fn complete(
        &self,
        label: &str,
        prompt: &str,
        system_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CapabilityError> {
        self.pacing.pause().await;
        self.retry
            .run(label, Some(&self.pacing), || {
                self.text
                    .generate(prompt, system_message, temperature, max_tokens)
            })
            .await
    }

    /// One call for `count` places around `location`, one prompt per place.
    pub async fn post_prompts(
        &self,
        location: &str,
        count: usize,
    ) -> Result<Vec<PromptData>, AutomationError> {
        let request = format!(
            "Fashion and lifestyle influencer traveling to {location}, give me {count} list of places \
to go wearing different stylish clothes to wear, describe it in details. describe background in details. \
as a prompt you give to stable diffusion, describe the background, scene in as much details as you can, \
use the following format \"Place Name: ... Description: ...\""
        );
        let text = self
            .complete("post prompts", &request, POST_SYSTEM_MESSAGE, 0.9, 1000)
            .await
            .map_err(|e| AutomationError::generation("Post prompt generation failed", e))?;
        debug!("Post prompt response: {}", text);

        let prompts: Vec<PromptData> = parse_place_descriptions(&text)
            .into_iter()
            .take(count)
            .map(|(place, description)| PromptData {
                text: format!(
                    "{} at {}, {}, {}",
                    self.style.character_prefix, place, description, self.style.character_suffix
                ),
                location: format!("{},{}", place, location),
                content_type: ContentType::Post,
            })
            .collect();

        if prompts.is_empty() {
            return Err(AutomationError::empty_generation(
                "AI response contained no place descriptions",
            ));
        }
        info!("Generated {} post prompts for {}", prompts.len(), location);
        Ok(prompts)
    }

    pub async fn story_prompts(
        &self,
        location: &str,
        count: usize,
    ) -> Result<Vec<PromptData>, AutomationError> {
        let request = format!(
            "Give me {count} prompts describing the beauty of {location}. Doing different activity, \
Be very descriptive for background."
        );
        let text = self
            .complete("story prompts", &request, STORY_SYSTEM_MESSAGE, 0.71, 400)
            .await
            .map_err(|e| AutomationError::generation("Story prompt generation failed", e))?;

        let prompts: Vec<PromptData> = parse_scene_lines(&text, count)
            .into_iter()
            .map(|scene| PromptData {
                text: scene,
                location: location.to_string(),
                content_type: ContentType::Story,
            })
            .collect();

        if prompts.is_empty() {
            return Err(AutomationError::empty_generation(
                "AI response contained no story scenes",
            ));
        }
        info!("Generated {} story prompts for {}", prompts.len(), location);
        Ok(prompts)
    }

    /// Caption for a post group, written in first person with hashtags.
    pub async fn post_caption(&self, background: &str) -> Result<CaptionData, CapabilityError> {
        let request = format!(
            "generate a instagram caption for this prompt 'a beautiful woman at a {background} background.' \
it should be creative, cute and funny. Feel Good. Use Emojis. In first person. Also add relevant hashtags."
        );
        let text = self.complete("post caption", &request, "", 0.7, 300).await?;
        Self::caption_from(text)
    }

    pub async fn story_caption(&self, scene: &str) -> Result<CaptionData, CapabilityError> {
        let request = format!(
            "generate a instagram story caption for the scene of {scene} it should be creative, cute and funny. \
Feel Good. Use Emojis. In first person. Also add relevant hashtags. keep it only to few words"
        );
        let text = self.complete("story caption", &request, "", 0.7, 100).await?;
        Self::caption_from(text)
    }

    fn caption_from(text: String) -> Result<CaptionData, CapabilityError> {
        let cleaned = clean_caption(&text);
        if cleaned.is_empty() {
            return Err(CapabilityError::Rejected("Caption response was empty".to_string()));
        }
        Ok(CaptionData::from_text(&cleaned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_descriptions_are_paired() {
        let text = "Here you go:\n\n1. Place Name: Fushimi Inari\nDescription: Walking through red torii gates, wearing a linen dress\n\n\
2. **Place Name:** Gion\n   Description: Evening lanterns: soft glow on wooden houses\nPlace Name: Orphan\n";
        let pairs = parse_place_descriptions(text);
        assert_eq!(
            pairs,
            vec![
                (
                    "Fushimi Inari".to_string(),
                    "Walking through red torii gates, wearing a linen dress".to_string()
                ),
                (
                    "Gion".to_string(),
                    "Evening lanterns: soft glow on wooden houses".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_description_without_place_is_ignored() {
        assert!(parse_place_descriptions("Description: floating text").is_empty());
        assert!(parse_place_descriptions("nothing useful here").is_empty());
    }

    #[test]
    fn test_scene_lines_strip_numbering() {
        let text = "1. Sipping coffee at a rooftop cafe.\n\n2) Cycling along the river\n- Reading in a park\n";
        assert_eq!(
            parse_scene_lines(text, 2),
            vec!["Sipping coffee at a rooftop cafe.", "Cycling along the river"]
        );
        assert_eq!(parse_scene_lines(text, 5).len(), 3);
    }

    #[test]
    fn test_caption_cleanup() {
        assert_eq!(clean_caption("  \"Hello world!\" #fun "), "Hello world! #fun");
    }
}
