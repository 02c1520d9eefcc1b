use srccompare_common::{FileInfo, FileSet};
use std::collections::BTreeMap;
use tracing::debug;

/// Files of two sides sorted into change categories, keyed by name
#[derive(Debug, Default)]
pub struct Classification {
    pub added: BTreeMap<String, FileInfo>,
    pub deleted: BTreeMap<String, FileInfo>,
    /// `(original, revised)` pairs whose content differs
    pub modified: BTreeMap<String, (FileInfo, FileInfo)>,
    /// Populated only when requested
    pub unchanged: Vec<String>,
}

/// Classify the union of both sides' names.
///
/// Names are visited in lexicographic order, so the outcome does not depend
/// on the order either set was built in. Content is compared exactly; renames
/// are left to the rename detector.
pub fn classify(left: FileSet, right: FileSet, include_unchanged: bool) -> Classification {
    let mut left_map = left.into_map();
    let mut right_map = right.into_map();

    let mut all_names: Vec<String> = left_map.keys().chain(right_map.keys()).cloned().collect();
    all_names.sort();
    all_names.dedup();

    let mut result = Classification::default();
    for name in all_names {
        match (left_map.remove(&name), right_map.remove(&name)) {
            (Some(original), Some(revised)) => {
                if original.content() != revised.content() {
                    result.modified.insert(name, (original, revised));
                } else if include_unchanged {
                    result.unchanged.push(name);
                }
            }
            (Some(original), None) => {
                result.deleted.insert(name, original);
            }
            (None, Some(revised)) => {
                result.added.insert(name, revised);
            }
            (None, None) => continue,
        }
    }

    debug!(
        "Classified: {} added, {} deleted, {} modified, {} unchanged",
        result.added.len(),
        result.deleted.len(),
        result.modified.len(),
        result.unchanged.len()
    );
    result
}
