use similar::{capture_diff_slices, group_diff_ops, Algorithm, DiffOp, DiffTag};
use srccompare_common::{split_lines, CompareError};

/// Context line used when two texts produce no hunks
pub const NO_TEXTUAL_DIFFERENCES: &str = "No textual differences available.";

/// Renders the difference between two versions of one file
pub trait DiffRenderer: Send + Sync {
    /// `unavailable_sentinel` is the placeholder used for content that was
    /// never decoded; it is echoed back instead of the generic message when
    /// the original side is exactly that placeholder.
    fn render(
        &self,
        file_name: &str,
        original: &str,
        revised: &str,
        context_lines: usize,
        unavailable_sentinel: &str,
    ) -> Result<String, CompareError>;
}

/// Unified diff over a Myers line diff.
///
/// Headers are `--- <name>_orig` and `+++ <name>_rev`. The output is never
/// empty: texts without differences get a single synthetic
/// `@@ -0,0 +0,0 @@` hunk with an explanatory context line.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifiedDiffRenderer;

impl DiffRenderer for UnifiedDiffRenderer {
    fn render(
        &self,
        file_name: &str,
        original: &str,
        revised: &str,
        context_lines: usize,
        unavailable_sentinel: &str,
    ) -> Result<String, CompareError> {
        let old_lines = split_lines(original);
        let new_lines = split_lines(revised);
        let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);

        let hunks: Vec<Vec<DiffOp>> = group_diff_ops(ops, context_lines)
            .into_iter()
            .filter(|group| group.iter().any(|op| op.tag() != DiffTag::Equal))
            .collect();

        let mut out = vec![
            format!("--- {}_orig", file_name),
            format!("+++ {}_rev", file_name),
        ];

        if hunks.is_empty() {
            let message = if original == unavailable_sentinel {
                unavailable_sentinel
            } else {
                NO_TEXTUAL_DIFFERENCES
            };
            out.push("@@ -0,0 +0,0 @@".to_string());
            out.push(format!(" {}", message));
        }

        for hunk in &hunks {
            out.push(hunk_header(hunk));
            for op in hunk {
                let (tag, old_range, new_range) = op.as_tag_tuple();
                match tag {
                    DiffTag::Equal => {
                        out.extend(old_range.map(|i| format!(" {}", old_lines[i])));
                    }
                    DiffTag::Delete => {
                        out.extend(old_range.map(|i| format!("-{}", old_lines[i])));
                    }
                    DiffTag::Insert => {
                        out.extend(new_range.map(|i| format!("+{}", new_lines[i])));
                    }
                    DiffTag::Replace => {
                        out.extend(old_range.map(|i| format!("-{}", old_lines[i])));
                        out.extend(new_range.map(|i| format!("+{}", new_lines[i])));
                    }
                }
            }
        }

        let mut text = out.join("\n");
        text.push('\n');
        Ok(text)
    }
}

fn hunk_header(hunk: &[DiffOp]) -> String {
    let (old_start, old_len, new_start, new_len) = match (hunk.first(), hunk.last()) {
        (Some(first), Some(last)) => {
            let old_start = first.old_range().start;
            let new_start = first.new_range().start;
            (
                old_start,
                last.old_range().end - old_start,
                new_start,
                last.new_range().end - new_start,
            )
        }
        _ => (0, 0, 0, 0),
    };

    format!(
        "@@ -{} +{} @@",
        range_label(old_start, old_len),
        range_label(new_start, new_len)
    )
}

/// 1-based start of a non-empty range; an empty range names the line before it
fn range_label(start: usize, len: usize) -> String {
    if len == 0 {
        format!("{},0", start)
    } else {
        format!("{},{}", start + 1, len)
    }
}
