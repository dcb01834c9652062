//! Word-count based cost model.
//!
//! Chat is priced per word (input + estimated or actual output); every other
//! feature carries a flat credit price. All functions here are deterministic
//! and side-effect free.

use crate::error::LedgerError;
use crate::types::Credits;
use serde::{Deserialize, Serialize};

/// How many words of model usage one credit buys.
pub const WORDS_PER_CREDIT: u64 = 100;

/// Estimated output length as a multiple of input length (3/2 = 1.5x).
const OUTPUT_ESTIMATE_NUM: u64 = 3;
const OUTPUT_ESTIMATE_DEN: u64 = 2;

/// A billable feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Chat tutoring. Priced per word, reconciled after the response.
    Chat,
    ImageGeneration,
    QuizGeneration,
    NoteGeneration,
    SlideshowGeneration,
    NoteEnhancement,
}

impl Feature {
    /// Flat credit price for fixed-price features. Chat is per-word and has
    /// no flat price.
    pub fn flat_cost(self) -> Option<Credits> {
        match self {
            Feature::Chat => None,
            Feature::ImageGeneration => Some(Credits::from_whole(150)),
            Feature::QuizGeneration => Some(Credits::from_whole(30)),
            Feature::NoteGeneration => Some(Credits::from_whole(25)),
            Feature::SlideshowGeneration => Some(Credits::from_whole(50)),
            Feature::NoteEnhancement => Some(Credits::from_whole(15)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Chat => "chat",
            Feature::ImageGeneration => "image_generation",
            Feature::QuizGeneration => "quiz_generation",
            Feature::NoteGeneration => "note_generation",
            Feature::SlideshowGeneration => "slideshow_generation",
            Feature::NoteEnhancement => "note_enhancement",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Feature::Chat),
            "image_generation" => Ok(Feature::ImageGeneration),
            "quiz_generation" => Ok(Feature::QuizGeneration),
            "note_generation" => Ok(Feature::NoteGeneration),
            "slideshow_generation" => Ok(Feature::SlideshowGeneration),
            "note_enhancement" => Ok(Feature::NoteEnhancement),
            other => Err(LedgerError::UnknownFeature(other.to_string())),
        }
    }
}

/// Pre-flight cost estimate for a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEstimate {
    pub input_words: u64,
    pub estimated_output_words: u64,
    pub estimated_credits: Credits,
}

/// Measured cost of a completed chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatUsage {
    pub input_words: u64,
    pub output_words: u64,
    pub credits_used: Credits,
}

/// Count whitespace-delimited non-empty tokens.
pub fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Credits for a word total, rounded up to one decimal place.
///
/// In tenths: `ceil(total_words * 10 / WORDS_PER_CREDIT)`.
pub fn text_credits(input_words: u64, output_words: u64) -> Credits {
    let total_words = input_words + output_words;
    let tenths = (total_words * 10).div_ceil(WORDS_PER_CREDIT);
    Credits::from_tenths(tenths)
}

/// Estimate the cost of a chat message before the model responds.
///
/// Output is assumed to run 1.5x the input length, rounded up.
pub fn estimate_chat_cost(input: &str) -> ChatEstimate {
    let input_words = count_words(input);
    let estimated_output_words =
        (input_words * OUTPUT_ESTIMATE_NUM).div_ceil(OUTPUT_ESTIMATE_DEN);
    ChatEstimate {
        input_words,
        estimated_output_words,
        estimated_credits: text_credits(input_words, estimated_output_words),
    }
}

/// Measure the actual cost after the model responds.
pub fn actual_chat_cost(input: &str, output: &str) -> ChatUsage {
    let input_words = count_words(input);
    let output_words = count_words(output);
    ChatUsage {
        input_words,
        output_words,
        credits_used: text_credits(input_words, output_words),
    }
}
