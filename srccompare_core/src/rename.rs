use similar::{capture_diff_slices, Algorithm, DiffTag};
use srccompare_common::{
    extension_of, split_lines, Blake3Hash, FileInfo, RenameConfig, SizeFilter, CONTENT_NOT_READ,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// A deleted file paired with the added file it became
#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    pub original: FileInfo,
    pub revised: FileInfo,
    /// 1.0 for exact content matches
    pub score: f64,
}

impl Rename {
    pub fn from(&self) -> &str {
        self.original.name()
    }

    pub fn to(&self) -> &str {
        self.revised.name()
    }
}

/// Pairs deleted and added files that are the same file under a new name.
///
/// Identical normalized content is matched first (by hash, first come first
/// served), then the remaining files are scored by line similarity.
#[derive(Debug, Clone, Default)]
pub struct RenameDetector {
    config: RenameConfig,
}

impl RenameDetector {
    pub fn new(config: RenameConfig) -> Self {
        Self { config }
    }

    /// Remove matched pairs from `added` and `deleted` and return them sorted
    /// by destination name.
    pub fn detect(
        &self,
        added: &mut BTreeMap<String, FileInfo>,
        deleted: &mut BTreeMap<String, FileInfo>,
    ) -> Vec<Rename> {
        let mut renames = Vec::new();

        if self.config.exact_hash_pass {
            self.match_exact(added, deleted, &mut renames);
        }
        self.match_similar(added, deleted, &mut renames);

        renames.sort_by(|a, b| a.to().cmp(b.to()));
        debug!("Detected {} renames", renames.len());
        renames
    }

    fn match_exact(
        &self,
        added: &mut BTreeMap<String, FileInfo>,
        deleted: &mut BTreeMap<String, FileInfo>,
        renames: &mut Vec<Rename>,
    ) {
        // Unread entries all share the placeholder text, which says nothing
        // about their real content.
        let mut buckets: HashMap<Blake3Hash, VecDeque<String>> = HashMap::new();
        for (name, file) in added.iter().filter(|(_, file)| is_read(file)) {
            buckets.entry(file.hash()).or_default().push_back(name.clone());
        }

        let candidates: Vec<(String, Blake3Hash)> = deleted
            .iter()
            .filter(|(_, file)| is_read(file))
            .map(|(name, file)| (name.clone(), file.hash()))
            .collect();

        for (name, hash) in candidates {
            let Some(target) = buckets.get_mut(&hash).and_then(VecDeque::pop_front) else {
                continue;
            };
            if let (Some(original), Some(revised)) = (deleted.remove(&name), added.remove(&target)) {
                debug!("Exact rename {} -> {}", name, target);
                renames.push(Rename {
                    original,
                    revised,
                    score: 1.0,
                });
            }
        }
    }

    fn match_similar(
        &self,
        added: &mut BTreeMap<String, FileInfo>,
        deleted: &mut BTreeMap<String, FileInfo>,
        renames: &mut Vec<Rename>,
    ) {
        let names: Vec<String> = deleted.keys().cloned().collect();

        for name in names {
            let Some(original) = deleted.get(&name) else {
                continue;
            };

            let mut best: Option<(String, f64)> = None;
            for (candidate_name, candidate) in added.iter() {
                if !self.is_rename_candidate(original, candidate) {
                    continue;
                }
                let score = self.score(original.content(), candidate.content());
                let beats_best = best.as_ref().map_or(true, |(_, best_score)| score > *best_score);
                if score > self.config.similarity_threshold && beats_best {
                    best = Some((candidate_name.clone(), score));
                }
            }

            let Some((target, score)) = best else {
                continue;
            };
            if let (Some(original), Some(revised)) = (deleted.remove(&name), added.remove(&target)) {
                debug!("Similar rename {} -> {} ({:.3})", name, target, score);
                renames.push(Rename {
                    original,
                    revised,
                    score,
                });
            }
        }
    }

    /// Same extension and a plausible size under the configured filter
    pub fn is_rename_candidate(&self, original: &FileInfo, revised: &FileInfo) -> bool {
        if extension_of(original.name()) != extension_of(revised.name()) {
            return false;
        }

        match self.config.size_filter {
            SizeFilter::RelativeLength { max_ratio } => {
                let left = original.content().chars().count();
                let right = revised.content().chars().count();
                let max = left.max(right);
                max == 0 || left.abs_diff(right) as f64 <= max as f64 * max_ratio
            }
            SizeFilter::NormalizedSize { floor, ratio } => {
                let left = original.normalized_size();
                let right = revised.normalized_size();
                let allowed = (floor as f64).max(left.max(right) as f64 * ratio);
                left.abs_diff(right) as f64 <= allowed
            }
        }
    }

    /// Line similarity with a cheap first look at the leading lines.
    ///
    /// A prefix score below the cutoff is returned as is; otherwise the full
    /// texts are scored.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a_lines = split_lines(a);
        let b_lines = split_lines(b);

        if self.config.prefilter_lines > 0 {
            let limit = self.config.prefilter_lines;
            let prefix = similarity(
                &a_lines[..a_lines.len().min(limit)],
                &b_lines[..b_lines.len().min(limit)],
            );
            if prefix < self.config.prefilter_cutoff {
                return prefix;
            }
        }

        similarity(&a_lines, &b_lines)
    }
}

fn is_read(file: &FileInfo) -> bool {
    file.content() != CONTENT_NOT_READ
}

/// `1 - changed / max(len(a), len(b))` over a Myers line diff.
///
/// Each run of consecutive non-equal operations counts as
/// `max(removed, inserted)` changed lines. Two empty inputs score 1.0.
pub fn similarity(a: &[&str], b: &[&str]) -> f64 {
    let total = a.len().max(b.len());
    if total == 0 {
        return 1.0;
    }

    let ops = capture_diff_slices(Algorithm::Myers, a, b);
    let mut changed = 0;
    let mut run_old = 0;
    let mut run_new = 0;

    for op in &ops {
        match op.tag() {
            DiffTag::Equal => {
                changed += run_old.max(run_new);
                run_old = 0;
                run_new = 0;
            }
            DiffTag::Delete | DiffTag::Insert | DiffTag::Replace => {
                run_old += op.old_range().len();
                run_new += op.new_range().len();
            }
        }
    }
    changed += run_old.max(run_new);

    1.0 - changed as f64 / total as f64
}
