//! Integration tests for course tree building

use std::fs;
use std::path::Path;

use offlineu::core::{ScanSettings, ScanWarning, TreeBuilder};
use offlineu::domain::{Category, DirectoryNode, Node};
use offlineu::ItemClassifier;
use tempfile::TempDir;

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"content").unwrap();
}

fn child_names(node: &DirectoryNode) -> Vec<&str> {
    node.children.iter().map(Node::name).collect()
}

/// A course laid out the way downloaded courses usually are
fn sample_course() -> TempDir {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "01 - Getting Started/1 - Welcome.mp4");
    touch(temp.path(), "01 - Getting Started/1 - Welcome.srt");
    touch(temp.path(), "01 - Getting Started/2 - Slides.pdf");
    touch(temp.path(), "01 - Getting Started/10 - Recap.mp3");
    touch(temp.path(), "02 - Quiz.html");
    touch(temp.path(), "03 - Deeper/Lesson 2.mkv");
    touch(temp.path(), "03 - Deeper/Lesson 10.mkv");
    touch(temp.path(), "03 - Deeper/Lesson 1.mkv");
    touch(temp.path(), "03 - Deeper/.hidden/notes.md");
    touch(temp.path(), "resources.zip");
    temp
}

#[test]
fn test_rescan_is_idempotent() {
    let temp = sample_course();
    let builder = TreeBuilder::default();

    let first = builder.build(temp.path()).unwrap();
    let second = builder.build(temp.path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.item_count(), 9);
}

#[test]
fn test_sibling_order_is_natural_and_interleaved() {
    let temp = sample_course();
    let tree = TreeBuilder::default().build(temp.path()).unwrap();

    assert_eq!(
        child_names(&tree),
        vec!["01 - Getting Started", "02 - Quiz.html", "03 - Deeper", "resources.zip"]
    );

    let section = tree.find_directory("01 - Getting Started").unwrap();
    assert_eq!(
        child_names(section),
        vec!["1 - Welcome.mp4", "1 - Welcome.srt", "2 - Slides.pdf", "10 - Recap.mp3"]
    );

    let deeper = tree.find_directory("03 - Deeper").unwrap();
    assert_eq!(
        child_names(deeper),
        vec!["Lesson 1.mkv", "Lesson 2.mkv", "Lesson 10.mkv"]
    );
}

#[test]
fn test_items_are_classified_and_named() {
    let temp = sample_course();
    let tree = TreeBuilder::default().build(temp.path()).unwrap();

    let welcome = tree
        .find_item("01 - Getting Started/1 - Welcome.mp4")
        .unwrap();
    assert_eq!(welcome.category, Category::Video);
    assert_eq!(welcome.display_name, "Welcome");
    assert_eq!(
        welcome.subtitle.as_deref(),
        Some("01 - Getting Started/1 - Welcome.srt")
    );

    let quiz = tree.find_item("02 - Quiz.html").unwrap();
    assert_eq!(quiz.category, Category::Quiz);

    let recap = tree
        .find_item("01 - Getting Started/10 - Recap.mp3")
        .unwrap();
    assert_eq!(recap.category, Category::Audio);

    let archive = tree.find_item("resources.zip").unwrap();
    assert_eq!(archive.category, Category::Unknown);

    assert!(tree.find_directory("03 - Deeper/.hidden").is_none());
    assert_eq!(
        tree.find_directory("01 - Getting Started").unwrap().display_name,
        "Getting Started"
    );
}

#[test]
fn test_relative_paths_use_forward_slashes() {
    let temp = sample_course();
    let tree = TreeBuilder::default().build(temp.path()).unwrap();

    for item in tree.items() {
        assert!(!item.relative_path.contains('\\'));
        assert!(!item.relative_path.starts_with('/'));
        assert!(temp.path().join(&item.relative_path).is_file());
    }
}

#[test]
fn test_empty_course_has_no_items() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), ".DS_Store");

    let tree = TreeBuilder::default().build(temp.path()).unwrap();
    assert!(tree.children.is_empty());
    assert_eq!(tree.relative_path, "");
}

#[cfg(unix)]
#[test]
fn test_unreadable_subtree_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let temp = sample_course();
    touch(temp.path(), "04 - Locked/secret.mp4");
    let locked = temp.path().join("04 - Locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read it anyway; the listing-failure path is then
    // covered by the unit test in tree_builder.rs
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        eprintln!("note: permission bits are not enforced for this user, unreadable-subtree check skipped");
        return;
    }

    let scan = TreeBuilder::default().scan(temp.path());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    let scan = scan.unwrap();

    let node = scan.tree.find_directory("04 - Locked").unwrap();
    assert!(node.is_skipped());
    assert!(node.children.is_empty());

    // Siblings are unaffected
    assert_eq!(scan.tree.item_count(), 9);
    assert!(scan.warnings.iter().any(|w| matches!(
        w,
        ScanWarning::SubtreeSkipped { path, .. } if path == "04 - Locked"
    )));
}

#[cfg(unix)]
#[test]
fn test_symlinks_leaving_the_root_are_excluded() {
    use std::os::unix::fs::symlink;

    let outside = TempDir::new().unwrap();
    touch(outside.path(), "private.mp4");
    touch(outside.path(), "elsewhere/more.mp4");

    let temp = sample_course();
    symlink(outside.path().join("private.mp4"), temp.path().join("leak.mp4")).unwrap();
    symlink(outside.path().join("elsewhere"), temp.path().join("leakdir")).unwrap();
    symlink(
        temp.path().join("02 - Quiz.html"),
        temp.path().join("quiz-link.html"),
    )
    .unwrap();

    let scan = TreeBuilder::default().scan(temp.path()).unwrap();

    assert!(scan.tree.find_item("leak.mp4").is_none());
    assert!(scan.tree.find_directory("leakdir").is_none());
    assert!(scan.tree.find_item("quiz-link.html").is_some());

    let escapes = scan
        .warnings
        .iter()
        .filter(|w| matches!(w, ScanWarning::PathEscape { .. }))
        .count();
    assert_eq!(escapes, 2);

    // No item path resolves outside the root
    let root = temp.path().canonicalize().unwrap();
    for item in scan.tree.items() {
        let resolved = root.join(&item.relative_path).canonicalize().unwrap();
        assert!(resolved.starts_with(&root));
    }
}

#[cfg(unix)]
#[test]
fn test_symlink_cycle_terminates() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    touch(temp.path(), "a/lesson.mp4");
    symlink(temp.path(), temp.path().join("a/back-to-root")).unwrap();
    symlink(temp.path().join("a"), temp.path().join("a/self")).unwrap();

    let scan = TreeBuilder::default().scan(temp.path()).unwrap();

    assert_eq!(scan.tree.item_count(), 1);
    let cycles = scan
        .warnings
        .iter()
        .filter(|w| matches!(w, ScanWarning::SymlinkCycle { .. }))
        .count();
    assert_eq!(cycles, 2);
}

#[cfg(unix)]
#[test]
fn test_symlinks_can_be_disabled() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    touch(temp.path(), "lesson.mp4");
    symlink(temp.path().join("lesson.mp4"), temp.path().join("alias.mp4")).unwrap();

    let settings = ScanSettings {
        follow_symlinks: false,
        ..Default::default()
    };
    let scan = TreeBuilder::new(ItemClassifier::default(), &settings)
        .scan(temp.path())
        .unwrap();

    assert_eq!(child_names(&scan.tree), vec!["lesson.mp4"]);
    assert_eq!(
        scan.warnings,
        vec![ScanWarning::SymlinkSkipped {
            path: "alias.mp4".to_string()
        }]
    );
}

#[test]
fn test_custom_ignore_patterns() {
    let temp = sample_course();
    touch(temp.path(), "draft.bak");

    let settings = ScanSettings {
        ignore: vec!["*.BAK".to_string(), "*.zip".to_string()],
        ..Default::default()
    };
    let tree = TreeBuilder::new(ItemClassifier::default(), &settings)
        .build(temp.path())
        .unwrap();

    assert!(tree.find_item("draft.bak").is_none());
    assert!(tree.find_item("resources.zip").is_none());
    // Default hidden-entry patterns were replaced
    assert!(tree.find_item("03 - Deeper/.hidden/notes.md").is_some());
}
