// src/workflow/caption_budget.rs
//! Final post caption assembly under a hashtag cap.
//!
//! The generated caption is split at its first `#` into free text and the
//! item-specific hashtags. Generic boilerplate hashtags are appended, and
//! when the total exceeds the cap the boilerplate gives way first, from the
//! front of its list. The item-specific tags are only cut when they alone
//! exceed the cap.

#[derive(Debug, Clone, PartialEq)]
pub struct HashtagBudget {
    boilerplate: Vec<String>,
    cap: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledCaption {
    pub text: String,
    pub hashtag_count: usize,
}

/// Splits at the first `#`: (free text, hashtag tokens of the remainder).
pub fn split_caption(caption: &str) -> (String, Vec<String>) {
    match caption.find('#') {
        None => (caption.trim().to_string(), Vec::new()),
        Some(at) => {
            let free_text = caption[..at].trim().to_string();
            let hashtags = caption[at..]
                .split_whitespace()
                .filter(|token| token.starts_with('#') && token.len() > 1)
                .map(str::to_string)
                .collect();
            (free_text, hashtags)
        }
    }
}

/// Removes a trailing `,<current location>` that generation appended to
/// the place name. Whitespace around the comma is ignored.
pub fn normalize_location(location: &str, current_location: &str) -> String {
    let location = location.trim();
    let current = current_location.trim();
    if current.is_empty() {
        return location.to_string();
    }
    location
        .strip_suffix(current)
        .and_then(|head| head.trim_end().strip_suffix(','))
        .map(|place| place.trim().to_string())
        .filter(|place| !place.is_empty())
        .unwrap_or_else(|| location.to_string())
}

impl HashtagBudget {
    pub fn new(boilerplate: Vec<String>, cap: usize) -> Self {
        Self { boilerplate, cap }
    }

    /// Boilerplate left after sacrificing tags for `extracted` item tags.
    pub fn trimmed_boilerplate(&self, extracted: usize) -> &[String] {
        let overflow = (extracted + self.boilerplate.len()).saturating_sub(self.cap);
        let drop = overflow.min(self.boilerplate.len());
        &self.boilerplate[drop..]
    }

    pub fn assemble(&self, caption: &str, mentions: &[String]) -> AssembledCaption {
        let (free_text, mut extracted) = split_caption(caption);
        extracted.truncate(self.cap);
        let boilerplate = self.trimmed_boilerplate(extracted.len());

        let sections = [
            free_text,
            extracted.join(" "),
            boilerplate.join(" "),
            mentions.join(" "),
        ];
        let text = sections
            .iter()
            .filter(|section| !section.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");

        AssembledCaption {
            text,
            hashtag_count: extracted.len() + boilerplate.len(),
        }
    }
}
