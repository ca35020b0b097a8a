//! "Continue here" resolution from a tree and a ledger.

use serde::Serialize;

use super::ledger::ProgressLedger;
use crate::domain::DirectoryNode;

/// Why an item was chosen as the resume point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeReason {
    /// Most recently accessed item, not yet completed
    InProgress,

    /// Most recently accessed item, already completed
    LastViewed,

    /// No progress recorded yet: first item of the course
    Start,
}

/// The item to resume into
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumePointer {
    pub relative_path: String,
    pub reason: ResumeReason,
}

/// Picks the single resume item for a course
pub struct ResumeResolver;

impl ResumeResolver {
    /// Resolve the resume point.
    ///
    /// Only records for items present in `tree` are considered. The most
    /// recently accessed one wins; records never accessed rank below any
    /// accessed record, and ties go to the earliest item in tree order.
    /// Without any matching record the first item is returned, and `None`
    /// only when the tree has no items at all.
    pub fn resolve(tree: &DirectoryNode, ledger: &ProgressLedger) -> Option<ResumePointer> {
        let items = tree.items();
        let first = items.first()?;

        let latest = ledger.with_records(|records| {
            items
                .iter()
                .filter_map(|item| {
                    records
                        .get(&item.relative_path)
                        .map(|record| (item, record.last_accessed, record.completed))
                })
                // max_by_key keeps the last maximum; reverse so the earliest item wins ties
                .rev()
                .max_by_key(|(_, accessed, _)| *accessed)
                .map(|(item, _, completed)| (item.relative_path.clone(), completed))
        });

        Some(match latest {
            Some((relative_path, false)) => ResumePointer {
                relative_path,
                reason: ResumeReason::InProgress,
            },
            Some((relative_path, true)) => ResumePointer {
                relative_path,
                reason: ResumeReason::LastViewed,
            },
            None => ResumePointer {
                relative_path: first.relative_path.clone(),
                reason: ResumeReason::Start,
            },
        })
    }
}
