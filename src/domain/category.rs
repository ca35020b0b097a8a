//! Content categories assigned to course items.

use serde::{Deserialize, Serialize};

/// Classification of a course item, derived from its file name only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Playable video
    Video,

    /// Playable audio
    Audio,

    /// Readable document (pdf, html, markdown, ...)
    Document,

    /// Subtitle track
    Subtitle,

    /// Quiz, exam or exercise material
    Quiz,

    /// Anything else; still part of the inventory
    Unknown,
}

impl Category {
    /// All categories, in display order
    pub const ALL: [Category; 6] = [
        Category::Video,
        Category::Audio,
        Category::Document,
        Category::Subtitle,
        Category::Quiz,
        Category::Unknown,
    ];

    /// Whether items of this category can carry a linked subtitle
    pub fn is_media(self) -> bool {
        matches!(self, Category::Video | Category::Audio)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Video => write!(f, "video"),
            Category::Audio => write!(f, "audio"),
            Category::Document => write!(f, "document"),
            Category::Subtitle => write!(f, "subtitle"),
            Category::Quiz => write!(f, "quiz"),
            Category::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "video" => Ok(Category::Video),
            "audio" => Ok(Category::Audio),
            "document" | "doc" | "text" => Ok(Category::Document),
            "subtitle" | "subtitles" => Ok(Category::Subtitle),
            "quiz" => Ok(Category::Quiz),
            "unknown" | "other" => Ok(Category::Unknown),
            _ => anyhow::bail!("Unknown category: {}", s),
        }
    }
}
