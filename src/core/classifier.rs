//! File-name based classification of course items.
//!
//! Classification never looks at file contents. Extension sets map to
//! categories, and quiz keywords in the base name override the extension:
//! `03 - Quiz.mp4` is a quiz, not a video.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::tree::{file_extension, file_stem};
use crate::domain::Category;

/// Extension sets and quiz keywords (the `classifier` config section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_video")]
    pub video: Vec<String>,

    #[serde(default = "default_audio")]
    pub audio: Vec<String>,

    #[serde(default = "default_document")]
    pub document: Vec<String>,

    #[serde(default = "default_subtitle")]
    pub subtitle: Vec<String>,

    /// Substrings that mark a file as a quiz, whatever its extension
    #[serde(default = "default_quiz_keywords")]
    pub quiz_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_video() -> Vec<String> {
    strings(&["mp4", "mkv", "avi", "mov", "webm", "m4v", "flv", "wmv"])
}
fn default_audio() -> Vec<String> {
    strings(&["mp3", "wav", "m4a", "aac", "ogg", "flac"])
}
fn default_document() -> Vec<String> {
    strings(&["txt", "md", "html", "htm", "pdf", "docx", "doc", "rtf"])
}
fn default_subtitle() -> Vec<String> {
    strings(&["srt", "vtt", "ass", "sub", "sbv"])
}
fn default_quiz_keywords() -> Vec<String> {
    strings(&[
        "quiz",
        "exam",
        "test",
        "assessment",
        "exercise",
        "assignment",
        "homework",
    ])
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            video: default_video(),
            audio: default_audio(),
            document: default_document(),
            subtitle: default_subtitle(),
            quiz_keywords: default_quiz_keywords(),
        }
    }
}

/// Maps file names to categories
#[derive(Debug, Clone)]
pub struct ItemClassifier {
    video: HashSet<String>,
    audio: HashSet<String>,
    document: HashSet<String>,
    subtitle: HashSet<String>,
    quiz_keywords: Vec<String>,
}

impl Default for ItemClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl ItemClassifier {
    /// Build a classifier; extensions may be given with or without the dot
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            video: extension_set(&config.video),
            audio: extension_set(&config.audio),
            document: extension_set(&config.document),
            subtitle: extension_set(&config.subtitle),
            quiz_keywords: config
                .quiz_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Classify a file name. Total: every name gets exactly one category.
    pub fn classify(&self, file_name: &str) -> Category {
        if self.is_quiz(file_name) {
            return Category::Quiz;
        }

        let Some(ext) = file_extension(file_name).map(str::to_lowercase) else {
            return Category::Unknown;
        };

        if self.video.contains(&ext) {
            Category::Video
        } else if self.audio.contains(&ext) {
            Category::Audio
        } else if self.subtitle.contains(&ext) {
            Category::Subtitle
        } else if self.document.contains(&ext) {
            Category::Document
        } else {
            Category::Unknown
        }
    }

    fn is_quiz(&self, file_name: &str) -> bool {
        let base = file_stem(file_name).to_lowercase();
        self.quiz_keywords.iter().any(|k| base.contains(k.as_str()))
    }
}

fn extension_set(exts: &[String]) -> HashSet<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
