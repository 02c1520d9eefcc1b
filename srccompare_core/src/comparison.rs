use crate::archive::read_sources;
use crate::classify::{classify, Classification};
use crate::decompile::Decompiler;
use crate::normalize::{prepare_source, CommandFormatter, PassthroughFormatter, SourceFormatter};
use crate::rename::RenameDetector;
use crate::text_diff::{DiffRenderer, UnifiedDiffRenderer};
use rayon::prelude::*;
use srccompare_common::{
    ArchiveInput, CompareConfig, CompareError, ComparisonMode, ComparisonResult, ComparisonTiming,
    DiffInfo, FileInfo, FileSet, FormatterConfig, RenameConfig, RenameInfo, StepTiming,
    CONTENT_NOT_READ,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::info;

/// Two archives and how to compare them
#[derive(Clone, Copy)]
pub struct ComparisonRequest<'a> {
    pub left: &'a dyn ArchiveInput,
    pub right: &'a dyn ArchiveInput,
    pub mode: ComparisonMode,
    /// Negative values are treated as zero
    pub context_lines: i32,
    pub include_unchanged: bool,
}

impl<'a> ComparisonRequest<'a> {
    pub fn new(
        left: &'a dyn ArchiveInput,
        right: &'a dyn ArchiveInput,
        mode: ComparisonMode,
    ) -> Self {
        Self {
            left,
            right,
            mode,
            context_lines: 3,
            include_unchanged: false,
        }
    }

    pub fn with_context_lines(mut self, context_lines: i32) -> Self {
        self.context_lines = context_lines;
        self
    }

    pub fn with_unchanged(mut self, include_unchanged: bool) -> Self {
        self.include_unchanged = include_unchanged;
        self
    }

    fn context(&self) -> usize {
        self.context_lines.max(0) as usize
    }
}

/// Per-step durations, in the order the steps ran
#[derive(Debug, Default)]
struct TimingLog {
    steps: Vec<StepTiming>,
}

impl TimingLog {
    fn record<T>(&mut self, label: &str, step: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = step();
        let seconds = start.elapsed().as_secs_f64();

        info!("{} took {:.3}s", label, seconds);
        self.steps.push(StepTiming {
            label: label.to_string(),
            duration_seconds: seconds,
        });
        value
    }

    fn append(&mut self, other: TimingLog) {
        self.steps.extend(other.steps);
    }
}

/// `pkg/Foo.class` -> `pkg/Foo.java`
fn java_name(name: &str) -> Option<String> {
    name.strip_suffix(".class").map(|stem| format!("{}.java", stem))
}

fn check_cancelled(cancel: Option<&AtomicBool>) -> Result<(), CompareError> {
    if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
        return Err(CompareError::Cancelled);
    }
    Ok(())
}

/// Compares two code bundles: decompile or read each side, classify the
/// files, detect renames and render unified diffs.
pub struct ComparisonEngine {
    decompiler: Decompiler,
    formatter: Box<dyn SourceFormatter>,
    renderer: Box<dyn DiffRenderer>,
    renames: RenameDetector,
}

impl ComparisonEngine {
    pub fn new(decompiler: Decompiler) -> Self {
        Self {
            decompiler,
            formatter: Box::new(PassthroughFormatter),
            renderer: Box::new(UnifiedDiffRenderer),
            renames: RenameDetector::default(),
        }
    }

    pub fn from_config(config: &CompareConfig) -> Self {
        let formatter: Box<dyn SourceFormatter> = match &config.formatter {
            FormatterConfig::None => Box::new(PassthroughFormatter),
            FormatterConfig::Command {
                program,
                args,
                extensions,
            } => Box::new(CommandFormatter::new(
                program.clone(),
                args.clone(),
                extensions.clone(),
            )),
        };

        Self::new(Decompiler::from_config(config))
            .with_formatter(formatter)
            .with_rename_config(config.rename.clone())
    }

    pub fn with_formatter(mut self, formatter: Box<dyn SourceFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_rename_config(mut self, config: RenameConfig) -> Self {
        self.renames = RenameDetector::new(config);
        self
    }

    pub fn compare(&self, request: &ComparisonRequest<'_>) -> Result<ComparisonResult, CompareError> {
        self.compare_with_cancel(request, None)
    }

    pub fn compare_with_cancel(
        &self,
        request: &ComparisonRequest<'_>,
        cancel: Option<&AtomicBool>,
    ) -> Result<ComparisonResult, CompareError> {
        let started = Instant::now();
        info!(
            "Comparing {} with {} ({:?})",
            request.left.filename(),
            request.right.filename(),
            request.mode
        );

        let mut timing = TimingLog::default();
        let (left, right) = match request.mode {
            ComparisonMode::ClassVsSource => {
                // Decompiled classes are matched against the sources they came from.
                let left: FileSet = self
                    .class_side(request.left, "left", cancel, &mut timing)?
                    .into_iter()
                    .map(|file| match java_name(file.name()) {
                        Some(name) => file.renamed(name),
                        None => file,
                    })
                    .collect();
                let right = self.source_side(request.right, "right", cancel, &mut timing)?;
                (left, right)
            }
            ComparisonMode::ClassVsClass => {
                // A failing side does not stop its sibling; the error surfaces after the join.
                let ((left, left_log), (right, right_log)) = rayon::join(
                    || {
                        let mut log = TimingLog::default();
                        let files = self.class_side(request.left, "left", cancel, &mut log);
                        (files, log)
                    },
                    || {
                        let mut log = TimingLog::default();
                        let files = self.class_side(request.right, "right", cancel, &mut log);
                        (files, log)
                    },
                );
                timing.append(left_log);
                timing.append(right_log);
                (left?, right?)
            }
            ComparisonMode::SourceVsSource => {
                let left = self.source_side(request.left, "left", cancel, &mut timing)?;
                let right = self.source_side(request.right, "right", cancel, &mut timing)?;
                (left, right)
            }
        };
        check_cancelled(cancel)?;

        let Classification {
            mut added,
            mut deleted,
            modified,
            unchanged,
        } = timing.record("Classify file changes", || {
            classify(left, right, request.include_unchanged)
        });

        let renames = timing.record("Detect renames", || {
            self.renames.detect(&mut added, &mut deleted)
        });
        check_cancelled(cancel)?;

        let context = request.context();
        let render = |name: &str, original: &str, revised: &str| {
            self.renderer
                .render(name, original, revised, context, CONTENT_NOT_READ)
                .map(|diff| DiffInfo { diff })
        };

        let (added, deleted, modified) =
            timing.record("Render file diffs", || -> Result<_, CompareError> {
                let added = added
                    .iter()
                    .map(|(name, file)| Ok((name.clone(), render(name, "", file.content())?)))
                    .collect::<Result<BTreeMap<_, _>, CompareError>>()?;
                let deleted = deleted
                    .iter()
                    .map(|(name, file)| Ok((name.clone(), render(name, file.content(), "")?)))
                    .collect::<Result<BTreeMap<_, _>, CompareError>>()?;
                let modified = modified
                    .iter()
                    .map(|(name, (original, revised))| {
                        Ok((
                            name.clone(),
                            render(name, original.content(), revised.content())?,
                        ))
                    })
                    .collect::<Result<BTreeMap<_, _>, CompareError>>()?;
                Ok((added, deleted, modified))
            })?;

        let renamed = timing.record("Render rename diffs", || {
            renames
                .iter()
                .map(|rename| {
                    let diff = render(
                        rename.to(),
                        rename.original.content(),
                        rename.revised.content(),
                    )?;
                    Ok(RenameInfo {
                        from: rename.from().to_string(),
                        to: rename.to().to_string(),
                        diff: diff.diff,
                    })
                })
                .collect::<Result<Vec<_>, CompareError>>()
        })?;

        let total = started.elapsed().as_secs_f64();
        info!(
            "Comparison finished in {:.3}s: {} added, {} deleted, {} modified, {} renamed",
            total,
            added.len(),
            deleted.len(),
            modified.len(),
            renamed.len()
        );

        Ok(ComparisonResult {
            added,
            deleted,
            modified,
            renamed,
            unchanged: request.include_unchanged.then_some(unchanged),
            timing: ComparisonTiming {
                steps: timing.steps,
                total_duration_seconds: total,
            },
        })
    }

    /// Decompile an archive of classes, keeping the entry names.
    ///
    /// Decompiled output is Java text, so it is formatted as if it were the
    /// matching `.java` file.
    fn class_side(
        &self,
        input: &dyn ArchiveInput,
        side: &str,
        cancel: Option<&AtomicBool>,
        timing: &mut TimingLog,
    ) -> Result<FileSet, CompareError> {
        let decompiled = timing.record(&format!("Decompile classes ({})", side), || {
            self.decompiler.decompile_archive_with_cancel(input, cancel)
        })?;
        check_cancelled(cancel)?;

        let decompiled: Vec<FileInfo> = decompiled.into_iter().collect();
        let formatter = self.formatter.as_ref();
        Ok(timing.record(&format!("Format sources ({})", side), || {
            let prepared: Vec<FileInfo> = decompiled
                .par_iter()
                .map(|file| match java_name(file.name()) {
                    Some(format_name) => {
                        prepare_source(formatter, &format_name, file.content())
                            .renamed(file.name())
                    }
                    None => prepare_source(formatter, file.name(), file.content()),
                })
                .collect();
            prepared.into_iter().collect()
        }))
    }

    fn source_side(
        &self,
        input: &dyn ArchiveInput,
        side: &str,
        cancel: Option<&AtomicBool>,
        timing: &mut TimingLog,
    ) -> Result<FileSet, CompareError> {
        check_cancelled(cancel)?;
        let sources = timing.record(&format!("Read sources ({})", side), || read_sources(input))?;
        check_cancelled(cancel)?;

        let files: Vec<FileInfo> = sources.into_iter().collect();
        Ok(timing.record(&format!("Format sources ({})", side), || {
            self.prepare(files)
        }))
    }

    /// Format and normalize in parallel, keeping the input order
    fn prepare(&self, files: Vec<FileInfo>) -> FileSet {
        let formatter = self.formatter.as_ref();
        let prepared: Vec<FileInfo> = files
            .par_iter()
            .map(|file| prepare_source(formatter, file.name(), file.content()))
            .collect();
        prepared.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::decompile::{class_bytes, ClassStructureBackend};
    use std::sync::Arc;

    fn engine() -> ComparisonEngine {
        ComparisonEngine::new(Decompiler::new(Arc::new(ClassStructureBackend), 2))
    }

    fn archive(name: &str, entries: &[(&str, &[u8])]) -> MemoryArchive {
        MemoryArchive::from_entries(name, entries).unwrap()
    }

    fn numbered_fields(count: usize) -> Vec<(String, String)> {
        (0..count)
            .map(|i| (format!("field{}", i), "I".to_string()))
            .collect()
    }

    fn class_with(name: &str, fields: &[(String, String)], methods: &[(&str, &str)]) -> Vec<u8> {
        let fields: Vec<(&str, &str)> = fields
            .iter()
            .map(|(n, d)| (n.as_str(), d.as_str()))
            .collect();
        class_bytes(name, &fields, methods)
    }

    #[test]
    fn test_source_vs_source() {
        let keep = b"class Keep {\n    int a;\n    int b;\n    int c;\n}\n";
        let left = archive(
            "left.zip",
            &[
                ("src/", b""),
                ("src/A.java", b"class A {}\n"),
                ("src/B.java", b"class B {\n    int x;\n}\n"),
                ("src/Old.java", keep),
                ("src/logo.png", &[0x89, 0x50, 0x4e, 0x47]),
            ],
        );
        let right = archive(
            "right.zip",
            &[
                ("src/A.java", b"class A {}  \r\n"),
                ("src/B.java", b"class B {\n    int y;\n}\n"),
                ("src/New.java", keep),
                ("src/C.java", b"class C {}\n"),
                ("src/logo.png", &[0x89, 0x50, 0x4e, 0x47]),
            ],
        );

        let request = ComparisonRequest::new(&left, &right, ComparisonMode::SourceVsSource)
            .with_unchanged(true);
        let result = engine().compare(&request).unwrap();

        assert_eq!(result.added.keys().collect::<Vec<_>>(), vec!["src/C.java"]);
        assert!(result.deleted.is_empty());
        assert_eq!(result.modified.keys().collect::<Vec<_>>(), vec!["src/B.java"]);
        assert_eq!(result.renamed.len(), 1);
        assert_eq!(result.renamed[0].from, "src/Old.java");
        assert_eq!(result.renamed[0].to, "src/New.java");
        assert!(result.renamed[0].diff.contains("--- src/New.java_orig"));
        assert!(result.renamed[0].diff.contains(" No textual differences available."));
        assert_eq!(
            result.unchanged,
            Some(vec!["src/A.java".to_string(), "src/logo.png".to_string()])
        );

        let modified = &result.modified["src/B.java"].diff;
        assert!(modified.contains("-    int x;\n+    int y;\n"));
        assert_eq!(
            result.added["src/C.java"].diff,
            "--- src/C.java_orig\n+++ src/C.java_rev\n@@ -0,0 +1,1 @@\n+class C {}\n"
        );
    }

    #[test]
    fn test_identity_comparison_has_no_differences() {
        let input = archive(
            "same.jar",
            &[("a/A.java", b"class A {}\n"), ("a/B.java", b"class B {}\n")],
        );

        let result = engine()
            .compare(&ComparisonRequest::new(&input, &input, ComparisonMode::SourceVsSource))
            .unwrap();
        assert!(!result.has_differences());
        assert!(result.unchanged.is_none());

        let result = engine()
            .compare(
                &ComparisonRequest::new(&input, &input, ComparisonMode::SourceVsSource)
                    .with_unchanged(true),
            )
            .unwrap();
        assert_eq!(
            result.unchanged,
            Some(vec!["a/A.java".to_string(), "a/B.java".to_string()])
        );
    }

    #[test]
    fn test_class_vs_source() {
        let foo = class_bytes("pkg/Foo", &[("count", "I")], &[("<init>", "()V")]);
        let bar = class_bytes("pkg/Bar", &[], &[("run", "()V")]);
        let left = archive(
            "classes.jar",
            &[
                ("pkg/Foo.class", foo.as_slice()),
                ("pkg/Bar.class", bar.as_slice()),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
            ],
        );
        let right = archive(
            "sources.zip",
            &[
                (
                    "pkg/Foo.java",
                    b"CLASS pkg/Foo\nFIELD count I\nMETHOD <init>()V\n",
                ),
                ("pkg/Extra.java", b"public class Extra {}\n"),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
            ],
        );

        let request = ComparisonRequest::new(&left, &right, ComparisonMode::ClassVsSource)
            .with_unchanged(true);
        let result = engine().compare(&request).unwrap();

        assert_eq!(
            result.unchanged,
            Some(vec![
                "META-INF/MANIFEST.MF".to_string(),
                "pkg/Foo.java".to_string()
            ])
        );
        assert_eq!(result.deleted.keys().collect::<Vec<_>>(), vec!["pkg/Bar.java"]);
        assert_eq!(result.added.keys().collect::<Vec<_>>(), vec!["pkg/Extra.java"]);
        assert!(result.deleted["pkg/Bar.java"]
            .diff
            .contains("@@ -1,2 +0,0 @@\n-CLASS pkg/Bar\n-METHOD run()V\n"));
    }

    #[test]
    fn test_class_vs_class() {
        let fields = numbered_fields(10);
        let foo_v1 = class_with("pkg/Foo", &fields, &[("<init>", "()V")]);
        let foo_v2 = class_with("pkg/Foo", &fields, &[("<init>", "()V"), ("extra", "()V")]);
        let gone = class_with("pkg/Gone", &fields, &[]);
        let moved = class_with("pkg/Moved", &fields, &[]);

        let left = archive(
            "v1.jar",
            &[("pkg/Foo.class", foo_v1.as_slice()), ("pkg/Gone.class", gone.as_slice())],
        );
        let right = archive(
            "v2.jar",
            &[("pkg/Foo.class", foo_v2.as_slice()), ("pkg/Moved.class", moved.as_slice())],
        );

        let request = ComparisonRequest::new(&left, &right, ComparisonMode::ClassVsClass);
        let result = engine().compare(&request).unwrap();

        assert!(result.added.is_empty());
        assert!(result.deleted.is_empty());
        assert_eq!(result.modified.keys().collect::<Vec<_>>(), vec!["pkg/Foo.class"]);
        assert!(result.modified["pkg/Foo.class"].diff.contains("+METHOD extra()V\n"));

        assert_eq!(result.renamed.len(), 1);
        assert_eq!(result.renamed[0].from, "pkg/Gone.class");
        assert_eq!(result.renamed[0].to, "pkg/Moved.class");
        assert!(result.renamed[0].diff.contains("-CLASS pkg/Gone\n+CLASS pkg/Moved\n"));

        let labels: Vec<&str> = result
            .timing
            .steps
            .iter()
            .map(|step| step.label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec![
                "Decompile classes (left)",
                "Format sources (left)",
                "Decompile classes (right)",
                "Format sources (right)",
                "Classify file changes",
                "Detect renames",
                "Render file diffs",
                "Render rename diffs",
            ]
        );
        assert!(result.timing.total_duration_seconds >= 0.0);
    }

    #[test]
    fn test_unread_binaries_stay_added_and_deleted() {
        let left = archive("l.zip", &[("img/logo.png", &[0x89, 0x50, 0x4e, 0x47])]);
        let right = archive("r.zip", &[("lib/driver.jar", &[0x50, 0x4b, 0x03, 0x04])]);
        let result = engine()
            .compare(&ComparisonRequest::new(&left, &right, ComparisonMode::SourceVsSource))
            .unwrap();

        assert!(result.renamed.is_empty());
        assert_eq!(result.deleted.keys().collect::<Vec<_>>(), vec!["img/logo.png"]);
        assert_eq!(result.added.keys().collect::<Vec<_>>(), vec!["lib/driver.jar"]);
    }

    #[test]
    fn test_source_timing_labels() {
        let input = archive("a.zip", &[("A.java", b"class A {}\n")]);
        let result = engine()
            .compare(&ComparisonRequest::new(&input, &input, ComparisonMode::SourceVsSource))
            .unwrap();

        let labels: Vec<&str> = result
            .timing
            .steps
            .iter()
            .map(|step| step.label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec![
                "Read sources (left)",
                "Format sources (left)",
                "Read sources (right)",
                "Format sources (right)",
                "Classify file changes",
                "Detect renames",
                "Render file diffs",
                "Render rename diffs",
            ]
        );
    }

    #[test]
    fn test_negative_context_is_clamped() {
        let left = archive("l.zip", &[("A.java", b"a\nb\nc\n")]);
        let right = archive("r.zip", &[("A.java", b"a\nX\nc\n")]);

        let request = ComparisonRequest::new(&left, &right, ComparisonMode::SourceVsSource)
            .with_context_lines(-5);
        let result = engine().compare(&request).unwrap();

        assert_eq!(
            result.modified["A.java"].diff,
            "--- A.java_orig\n+++ A.java_rev\n@@ -2,1 +2,1 @@\n-b\n+X\n"
        );
    }

    #[test]
    fn test_malformed_archive_aborts() {
        let good = archive("good.zip", &[("A.java", b"class A {}\n")]);
        let bad = MemoryArchive::new("bad.zip", b"not a zip".to_vec());

        let err = engine()
            .compare(&ComparisonRequest::new(&good, &bad, ComparisonMode::SourceVsSource))
            .unwrap_err();
        assert_eq!(err.kind(), "ArchiveReadError");
    }

    #[test]
    fn test_decompile_failure_aborts_both_class_modes() {
        let bad = archive("bad.jar", &[("pkg/Broken.class", b"\x00\x00\x00\x00")]);
        let good = archive("good.jar", &[("pkg/Fine.java", b"class Fine {}\n")]);

        for mode in [ComparisonMode::ClassVsSource, ComparisonMode::ClassVsClass] {
            let err = engine()
                .compare(&ComparisonRequest::new(&bad, &good, mode))
                .unwrap_err();
            assert!(
                matches!(err, CompareError::Decompile { ref entry, .. } if entry == "pkg/Broken.class")
            );
        }
    }

    #[test]
    fn test_cancelled_comparison() {
        let input = archive("a.zip", &[("A.java", b"class A {}\n")]);
        let cancel = AtomicBool::new(true);

        let err = engine()
            .compare_with_cancel(
                &ComparisonRequest::new(&input, &input, ComparisonMode::SourceVsSource),
                Some(&cancel),
            )
            .unwrap_err();
        assert!(matches!(err, CompareError::Cancelled));
    }

    #[test]
    fn test_formatter_runs_before_classification() {
        struct StripComments;

        impl SourceFormatter for StripComments {
            fn format(
                &self,
                _name: &str,
                content: &str,
            ) -> Result<String, srccompare_common::FormatError> {
                Ok(content
                    .lines()
                    .filter(|line| !line.trim_start().starts_with("//"))
                    .map(|line| format!("{}\n", line))
                    .collect())
            }
        }

        let left = archive("l.zip", &[("A.java", b"// v1\nclass A {}\n")]);
        let right = archive("r.zip", &[("A.java", b"// v2\nclass A {}\n")]);
        let request = ComparisonRequest::new(&left, &right, ComparisonMode::SourceVsSource);

        assert_eq!(engine().compare(&request).unwrap().modified.len(), 1);

        let formatting = engine().with_formatter(Box::new(StripComments));
        assert!(!formatting.compare(&request).unwrap().has_differences());
    }

    #[test]
    fn test_json_shape() {
        let left = archive("l.zip", &[("A.java", b"a\n")]);
        let right = archive("r.zip", &[("B.txt", b"b\n")]);
        let result = engine()
            .compare(&ComparisonRequest::new(&left, &right, ComparisonMode::SourceVsSource))
            .unwrap();

        let value = serde_json::to_value(&result).unwrap();
        assert!(value["added"]["B.txt"]["diff"].is_string());
        assert!(value["deleted"]["A.java"]["diff"].is_string());
        assert!(value["renamed"].as_array().unwrap().is_empty());
        assert!(value["unchanged"].is_null());
        assert_eq!(value["timing"]["steps"].as_array().unwrap().len(), 8);
    }
}
