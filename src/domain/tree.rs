//! Hierarchical course model produced by a scan.
//!
//! A course is a tree of [`DirectoryNode`]s whose children interleave
//! sub-directories and leaf [`Item`]s in natural sibling order. Every node is
//! identified by its root-relative, forward-slash path.

use serde::{Deserialize, Serialize};

use super::category::Category;

/// A child of a directory: either a nested directory or a leaf item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Directory(DirectoryNode),
    Item(Item),
}

impl Node {
    /// File or directory name as found on disk
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(dir) => &dir.name,
            Node::Item(item) => &item.name,
        }
    }

    /// Root-relative path of this node
    pub fn relative_path(&self) -> &str {
        match self {
            Node::Directory(dir) => &dir.relative_path,
            Node::Item(item) => &item.relative_path,
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Node::Item(item) => Some(item),
            Node::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::Item(_) => None,
        }
    }
}

/// A directory in the course tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// Directory name as found on disk
    pub name: String,

    /// Cleaned-up name for display
    pub display_name: String,

    /// Root-relative path ("" for the course root)
    pub relative_path: String,

    /// Children in natural sibling order
    #[serde(default)]
    pub children: Vec<Node>,

    /// Set when the directory could not be listed; children are then empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DirectoryNode {
    /// Create an empty directory node
    pub fn new(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: display_name(&name),
            name,
            relative_path: relative_path.into(),
            children: Vec::new(),
            error: None,
        }
    }

    /// Create a node for a directory that was skipped during the scan
    pub fn skipped(
        name: impl Into<String>,
        relative_path: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut node = Self::new(name, relative_path);
        node.error = Some(error.into());
        node
    }

    /// Whether this directory was skipped because it could not be read
    pub fn is_skipped(&self) -> bool {
        self.error.is_some()
    }

    /// All items below this directory, flattened in tree order
    pub fn items(&self) -> Vec<&Item> {
        let mut items = Vec::new();
        self.collect_items(&mut items);
        items
    }

    fn collect_items<'a>(&'a self, out: &mut Vec<&'a Item>) {
        for child in &self.children {
            match child {
                Node::Item(item) => out.push(item),
                Node::Directory(dir) => dir.collect_items(out),
            }
        }
    }

    /// Number of items below this directory
    pub fn item_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Node::Item(_) => 1,
                Node::Directory(dir) => dir.item_count(),
            })
            .sum()
    }

    /// Find an item by its relative path
    pub fn find_item(&self, relative_path: &str) -> Option<&Item> {
        for child in &self.children {
            match child {
                Node::Item(item) if item.relative_path == relative_path => return Some(item),
                Node::Directory(dir) if is_ancestor(&dir.relative_path, relative_path) => {
                    return dir.find_item(relative_path);
                }
                _ => {}
            }
        }
        None
    }

    /// Find a directory by its relative path ("" is this node)
    pub fn find_directory(&self, relative_path: &str) -> Option<&DirectoryNode> {
        if self.relative_path == relative_path {
            return Some(self);
        }
        self.children
            .iter()
            .filter_map(Node::as_directory)
            .find(|dir| {
                dir.relative_path == relative_path || is_ancestor(&dir.relative_path, relative_path)
            })
            .and_then(|dir| dir.find_directory(relative_path))
    }

    /// Previous and next items around `relative_path` in tree order
    pub fn neighbors(&self, relative_path: &str) -> Option<Neighbors> {
        let items = self.items();
        let index = items
            .iter()
            .position(|item| item.relative_path == relative_path)?;

        Some(Neighbors {
            previous: index
                .checked_sub(1)
                .map(|i| items[i].relative_path.clone()),
            next: items.get(index + 1).map(|item| item.relative_path.clone()),
        })
    }
}

/// `dir` is a strict path-prefix of `path`
fn is_ancestor(dir: &str, path: &str) -> bool {
    dir.is_empty()
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// A leaf unit of course content (one file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Root-relative path; the item's identity
    pub relative_path: String,

    /// File name as found on disk
    pub name: String,

    /// Cleaned-up title for display
    pub display_name: String,

    /// Name-based classification
    pub category: Category,

    /// Subtitle file paired with a video/audio item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

impl Item {
    /// Create a new item; the display name is derived from the file stem
    pub fn new(relative_path: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        let name = name.into();
        Self {
            relative_path: relative_path.into(),
            display_name: display_name(file_stem(&name)),
            name,
            category,
            subtitle: None,
        }
    }

    /// File name without its final extension
    pub fn stem(&self) -> &str {
        file_stem(&self.name)
    }
}

/// Items adjacent to a given item in tree order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighbors {
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Strip the final extension from a file name ("a.b.mp4" -> "a.b").
/// Dot-files keep their full name.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Final extension of a file name, without the dot
pub fn file_extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Turn an on-disk name into a display title.
///
/// Leading numbering ("01 - ", "3.", "2_") is dropped, runs of `-`/`_` become
/// spaces and each word is capitalized.
pub fn display_name(raw: &str) -> String {
    let without_number = raw
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', '-', '_', ' ']);

    // A name made only of digits ("2023") is kept as is
    let base = if without_number.is_empty() && raw.chars().any(|c| c.is_ascii_digit()) {
        raw
    } else {
        without_number
    };

    let words: Vec<String> = base
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() {
        "Untitled".to_string()
    } else {
        words.join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DirectoryNode {
        let mut section = DirectoryNode::new("01 - Basics", "01 - Basics");
        section.children.push(Node::Item(Item::new(
            "01 - Basics/1 - Intro.mp4",
            "1 - Intro.mp4",
            Category::Video,
        )));
        section.children.push(Node::Item(Item::new(
            "01 - Basics/2 - Setup.pdf",
            "2 - Setup.pdf",
            Category::Document,
        )));

        let mut root = DirectoryNode::new("course", "");
        root.children.push(Node::Directory(section));
        root.children.push(Node::Item(Item::new(
            "02 - Quiz.html",
            "02 - Quiz.html",
            Category::Quiz,
        )));
        root
    }

    #[test]
    fn test_items_flatten_in_tree_order() {
        let tree = sample_tree();
        let paths: Vec<_> = tree.items().iter().map(|i| i.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "01 - Basics/1 - Intro.mp4",
                "01 - Basics/2 - Setup.pdf",
                "02 - Quiz.html"
            ]
        );
        assert_eq!(tree.item_count(), 3);
    }

    #[test]
    fn test_find_item_and_directory() {
        let tree = sample_tree();
        assert!(tree.find_item("01 - Basics/2 - Setup.pdf").is_some());
        assert!(tree.find_item("02 - Quiz.html").is_some());
        assert!(tree.find_item("01 - Basics").is_none());
        assert!(tree.find_item("missing.mp4").is_none());

        assert_eq!(tree.find_directory("01 - Basics").unwrap().children.len(), 2);
        assert_eq!(tree.find_directory("").unwrap().name, "course");
        assert!(tree.find_directory("01 - Basics/1 - Intro.mp4").is_none());
    }

    #[test]
    fn test_is_ancestor_needs_separator() {
        assert!(is_ancestor("", "a/b"));
        assert!(is_ancestor("a", "a/b"));
        assert!(!is_ancestor("a", "ab/c"));
        assert!(!is_ancestor("a/b", "a/b"));
    }

    #[test]
    fn test_neighbors() {
        let tree = sample_tree();

        let first = tree.neighbors("01 - Basics/1 - Intro.mp4").unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.next.as_deref(), Some("01 - Basics/2 - Setup.pdf"));

        let last = tree.neighbors("02 - Quiz.html").unwrap();
        assert_eq!(last.previous.as_deref(), Some("01 - Basics/2 - Setup.pdf"));
        assert_eq!(last.next, None);

        assert!(tree.neighbors("nope").is_none());
    }

    #[test]
    fn test_display_name_cleanup() {
        assert_eq!(display_name("01 - intro_to rust"), "Intro To Rust");
        assert_eq!(display_name("3.Setting-up"), "Setting Up");
        assert_eq!(display_name("final exam"), "Final Exam");
        assert_eq!(display_name("2023"), "2023");
        assert_eq!(display_name("---"), "Untitled");
    }

    #[test]
    fn test_stem_and_extension() {
        assert_eq!(file_stem("lesson.en.srt"), "lesson.en");
        assert_eq!(file_extension("lesson.en.srt"), Some("srt"));
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_extension("README"), None);
    }

    #[test]
    fn test_node_serializes_with_type_tag() {
        let node = Node::Item(Item::new("a.mp4", "a.mp4", Category::Video));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "item");
        assert_eq!(json["category"], "video");
        assert!(json.get("subtitle").is_none());
    }
}
