//! Command-line interface for offlineu.
//!
//! Provides commands for scanning a course, showing completion, finding the
//! resume point, recording progress and navigating between items.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{self, Settings};
use crate::core::{
    CompletionStats, Course, CourseRegistry, ItemClassifier, LedgerStatus, ResumeReason,
};
use crate::domain::{Category, DirectoryNode, Node, ProgressUpdate};

/// offlineu - Offline course library and progress tracker
#[derive(Parser, Debug)]
#[command(name = "offlineu")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a course folder and print its tree
    Scan {
        /// Course root (defaults to the configured course)
        path: Option<PathBuf>,

        /// Print the tree as JSON
        #[arg(long)]
        json: bool,

        /// Only list items of this category (video, audio, document, ...)
        #[arg(short, long)]
        category: Option<Category>,
    },

    /// Show completion for a course
    Status {
        /// Course root (defaults to the configured course)
        path: Option<PathBuf>,
    },

    /// Show where to continue
    Resume {
        /// Course root (defaults to the configured course)
        path: Option<PathBuf>,
    },

    /// Record progress for an item
    Mark {
        /// Item path relative to the course root
        item: String,

        /// Course root (defaults to the configured course)
        #[arg(short, long, env = "OFFLINEU_COURSE")]
        course: Option<PathBuf>,

        /// Mark the item as completed
        #[arg(long, conflicts_with = "incomplete")]
        completed: bool,

        /// Mark the item as not completed
        #[arg(long)]
        incomplete: bool,

        /// Playback position in seconds
        #[arg(short, long)]
        elapsed: Option<f64>,

        /// Do not update the last-accessed time
        #[arg(long)]
        no_touch: bool,
    },

    /// Show the items before and after an item
    Nav {
        /// Item path relative to the course root
        item: String,

        /// Course root (defaults to the configured course)
        #[arg(short, long, env = "OFFLINEU_COURSE")]
        course: Option<PathBuf>,
    },

    /// Classify file names without touching the filesystem
    Classify {
        /// File names to classify
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Scan {
                path,
                json,
                category,
            } => scan_course(path, json, category).await,
            Commands::Status { path } => show_status(path).await,
            Commands::Resume { path } => show_resume(path).await,
            Commands::Mark {
                item,
                course,
                completed,
                incomplete,
                elapsed,
                no_touch,
            } => {
                let update = ProgressUpdate {
                    completed: match (completed, incomplete) {
                        (true, _) => Some(true),
                        (_, true) => Some(false),
                        _ => None,
                    },
                    elapsed_seconds: elapsed,
                    touch_last_accessed: !no_touch,
                };
                mark_item(&item, course, update).await
            }
            Commands::Nav { item, course } => show_neighbors(&item, course).await,
            Commands::Classify { names } => classify_names(&names),
            Commands::Config => show_config(),
        }
    }
}

/// Scan the course off the async runtime and make it the active course
async fn load_course(path: Option<PathBuf>) -> Result<Arc<Course>> {
    let settings: &'static Settings = config::config()?;
    let root = settings.course_path(path)?;

    let course = tokio::task::spawn_blocking({
        let root = root.clone();
        move || Course::load(&root, settings)
    })
    .await
    .context("Course scan task failed")?
    .with_context(|| format!("Failed to load course: {}", root.display()))?;

    match course.ledger().status() {
        LedgerStatus::Recovered { reason } => warn!(
            "Progress store was unusable ({}); a copy was kept next to {}",
            reason,
            course.ledger().store_path().display()
        ),
        LedgerStatus::Migrated { from, records } => info!(
            "Imported {} records from {}; they are saved to {} on the next update",
            records,
            from.display(),
            course.ledger().store_path().display()
        ),
        LedgerStatus::Fresh | LedgerStatus::Loaded { .. } => {}
    }

    Ok(CourseRegistry::global().activate(course))
}

/// Print the course tree
async fn scan_course(path: Option<PathBuf>, json: bool, category: Option<Category>) -> Result<()> {
    let course = load_course(path).await?;

    if json {
        let output = serde_json::to_string_pretty(course.tree())
            .context("Failed to serialize course tree")?;
        println!("{}", output);
        return Ok(());
    }

    if let Some(category) = category {
        let items = course.tree().items();
        let matching: Vec<_> = items
            .into_iter()
            .filter(|item| item.category == category)
            .collect();

        if matching.is_empty() {
            println!("No {} items in {}", category, course.name());
        }
        for item in matching {
            println!("{}", item.relative_path);
        }
        return Ok(());
    }

    println!("{} ({} items)", course.tree().display_name, course.tree().item_count());
    print_children(&course, course.tree(), 1);

    if !course.warnings().is_empty() {
        eprintln!("\n{} entries skipped:", course.warnings().len());
        for warning in course.warnings() {
            eprintln!("  {}", warning);
        }
    }

    Ok(())
}

fn print_children(course: &Course, dir: &DirectoryNode, depth: usize) {
    let indent = "  ".repeat(depth);
    for child in &dir.children {
        match child {
            Node::Directory(sub) => {
                if let Some(error) = &sub.error {
                    println!("{}{}/ [skipped: {}]", indent, sub.display_name, error);
                } else {
                    println!("{}{}/", indent, sub.display_name);
                    print_children(course, sub, depth + 1);
                }
            }
            Node::Item(item) => {
                let done = course
                    .progress(&item.relative_path)
                    .is_some_and(|record| record.completed);
                let subtitle = if item.subtitle.is_some() { " +subs" } else { "" };
                println!(
                    "{}[{}] {} ({}{})",
                    indent,
                    if done { "x" } else { " " },
                    item.display_name,
                    item.category,
                    subtitle
                );
            }
        }
    }
}

/// Show completion for a course and its top-level sections
async fn show_status(path: Option<PathBuf>) -> Result<()> {
    let course = load_course(path).await?;
    let stats = course.stats();

    println!("Course: {}", course.name());
    println!("Root: {}", course.root().display());
    println!("Progress store: {}", course.ledger().store_path().display());
    println!(
        "Completed: {}/{} ({:.1}%)",
        stats.completed, stats.total, stats.percentage
    );

    let sections: Vec<&DirectoryNode> = course
        .tree()
        .children
        .iter()
        .filter_map(Node::as_directory)
        .collect();

    if !sections.is_empty() {
        println!("\n{:<40} {:>10} {:>8}", "SECTION", "DONE", "%");
        println!("{}", "-".repeat(60));
        for section in sections {
            let section_stats = CompletionStats::for_node(section, course.ledger());
            println!(
                "{:<40} {:>10} {:>7.1}%",
                section.display_name,
                format!("{}/{}", section_stats.completed, section_stats.total),
                section_stats.percentage
            );
        }
    }

    let stale = course.stale_progress();
    if !stale.is_empty() {
        println!("\n{} progress records have no matching file:", stale.len());
        for key in stale {
            println!("  {}", key);
        }
    }

    Ok(())
}

/// Show the resume point
async fn show_resume(path: Option<PathBuf>) -> Result<()> {
    let course = load_course(path).await?;

    let Some(pointer) = course.resume() else {
        println!("Course {} has no items", course.name());
        return Ok(());
    };

    let label = match pointer.reason {
        ResumeReason::InProgress => "Continue",
        ResumeReason::LastViewed => "Last viewed",
        ResumeReason::Start => "Start with",
    };
    println!("{}: {}", label, pointer.relative_path);

    if let Some(record) = course.progress(&pointer.relative_path) {
        if record.elapsed_seconds > 0.0 {
            println!("Position: {:.0}s", record.elapsed_seconds);
        }
        if let Some(accessed) = record.last_accessed {
            println!("Last accessed: {}", accessed.to_rfc3339());
        }
    }

    Ok(())
}

/// Record progress for one item
async fn mark_item(item: &str, course: Option<PathBuf>, update: ProgressUpdate) -> Result<()> {
    if update == ProgressUpdate::default() {
        anyhow::bail!("Nothing to record. Use --completed, --incomplete or --elapsed, or drop --no-touch");
    }

    let course = load_course(course).await?;

    let record = tokio::task::spawn_blocking({
        let course = Arc::clone(&course);
        let item = item.to_string();
        move || course.update_progress(&item, update)
    })
    .await
    .context("Progress update task failed")?
    .with_context(|| format!("Failed to record progress for {}", item))?;

    println!(
        "{}: {} at {:.0}s",
        item,
        if record.completed { "completed" } else { "in progress" },
        record.elapsed_seconds
    );

    Ok(())
}

/// Show the previous and next items
async fn show_neighbors(item: &str, course: Option<PathBuf>) -> Result<()> {
    let course = load_course(course).await?;
    let neighbors = course.neighbors(item)?;

    println!(
        "Previous: {}",
        neighbors.previous.as_deref().unwrap_or("(start of course)")
    );
    println!(
        "Next:     {}",
        neighbors.next.as_deref().unwrap_or("(end of course)")
    );

    Ok(())
}

/// Classify names with the configured extension sets
fn classify_names(names: &[String]) -> Result<()> {
    let cfg = config::config()?;
    let classifier = ItemClassifier::new(&cfg.classifier);

    for name in names {
        println!("{:<10} {}", classifier.classify(name), name);
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("offlineu configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "Course:      {}",
        cfg.course
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("Progress:    {}", cfg.ledger_file);
    println!();
    println!("Classifier:");
    println!("  Video:         {}", cfg.classifier.video.join(", "));
    println!("  Audio:         {}", cfg.classifier.audio.join(", "));
    println!("  Document:      {}", cfg.classifier.document.join(", "));
    println!("  Subtitle:      {}", cfg.classifier.subtitle.join(", "));
    println!("  Quiz keywords: {}", cfg.classifier.quiz_keywords.join(", "));
    println!();
    println!("Scan:");
    println!("  Ignore:          {}", cfg.scan.ignore.join(", "));
    println!("  Max depth:       {}", cfg.scan.max_depth);
    println!("  Follow symlinks: {}", cfg.scan.follow_symlinks);

    Ok(())
}
