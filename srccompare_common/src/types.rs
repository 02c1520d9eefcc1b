use crate::text::normalize_text;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Placeholder content for archive entries that were not decoded (binary or unknown types)
pub const CONTENT_NOT_READ: &str = "CONTENT_NOT_READ";

/// BLAKE3 hash value (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<blake3::Hash> for Blake3Hash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

/// A file read, decompiled or formatted from an archive.
///
/// `hash` and `normalized_size` are derived from the content once, at
/// construction: line endings become LF, trailing whitespace is stripped from
/// each line and trailing line breaks are dropped. Two files whose content
/// differs only in those respects share a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    content: String,
    hash: Blake3Hash,
    normalized_size: usize,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let normalized = normalize_text(&content);
        let normalized = normalized.trim_end_matches('\n');

        Self {
            name: name.into(),
            hash: blake3::hash(normalized.as_bytes()).into(),
            normalized_size: normalized.chars().count(),
            content,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn hash(&self) -> Blake3Hash {
        self.hash
    }

    pub fn normalized_size(&self) -> usize {
        self.normalized_size
    }

    /// Same content under a different name
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }
}

/// Ordered `name -> FileInfo` collection.
///
/// Iteration follows insertion order; inserting an existing name replaces
/// the file in place.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<FileInfo>,
    index: HashMap<String, usize>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            files: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a file, returning the file it replaced
    pub fn insert(&mut self, file: FileInfo) -> Option<FileInfo> {
        match self.index.get(file.name()) {
            Some(&slot) => Some(std::mem::replace(&mut self.files[slot], file)),
            None => {
                self.index.insert(file.name().to_string(), self.files.len());
                self.files.push(file);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FileInfo> {
        self.index.get(name).map(|&slot| &self.files[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(FileInfo::name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileInfo> {
        self.files.iter()
    }

    /// Unordered view keyed by name, consuming the set
    pub fn into_map(self) -> HashMap<String, FileInfo> {
        self.files
            .into_iter()
            .map(|file| (file.name().to_string(), file))
            .collect()
    }
}

impl FromIterator<FileInfo> for FileSet {
    fn from_iter<I: IntoIterator<Item = FileInfo>>(iter: I) -> Self {
        let mut set = FileSet::new();
        for file in iter {
            set.insert(file);
        }
        set
    }
}

impl IntoIterator for FileSet {
    type Item = FileInfo;
    type IntoIter = std::vec::IntoIter<FileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a FileInfo;
    type IntoIter = std::slice::Iter<'a, FileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// What the two sides of a comparison contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonMode {
    /// Compiled classes on the left, Java sources on the right
    ClassVsSource,
    /// Compiled classes on both sides
    ClassVsClass,
    /// Java sources on both sides
    SourceVsSource,
}

/// Unified diff text for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffInfo {
    pub diff: String,
}

/// A deleted file matched to an added file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameInfo {
    pub from: String,
    pub to: String,
    pub diff: String,
}

/// Elapsed time for a single comparison step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTiming {
    pub label: String,
    pub duration_seconds: f64,
}

/// Timing summary for a comparison run. Diagnostic only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonTiming {
    pub steps: Vec<StepTiming>,
    pub total_duration_seconds: f64,
}

/// Structured result of comparing two archives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub added: BTreeMap<String, DiffInfo>,
    pub deleted: BTreeMap<String, DiffInfo>,
    pub modified: BTreeMap<String, DiffInfo>,
    /// Sorted by destination name
    pub renamed: Vec<RenameInfo>,
    /// Present only when unchanged files were requested
    pub unchanged: Option<Vec<String>>,
    pub timing: ComparisonTiming,
}

impl ComparisonResult {
    pub fn has_differences(&self) -> bool {
        !(self.added.is_empty()
            && self.deleted.is_empty()
            && self.modified.is_empty()
            && self.renamed.is_empty())
    }
}

/// Size plausibility test applied before scoring a rename candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SizeFilter {
    /// `|len(a) - len(b)| <= max_ratio * max(len(a), len(b))` over content length
    RelativeLength { max_ratio: f64 },
    /// `|ns(a) - ns(b)| <= max(floor, ratio * max(ns(a), ns(b)))` over normalized size
    NormalizedSize { floor: usize, ratio: f64 },
}

impl Default for SizeFilter {
    fn default() -> Self {
        SizeFilter::RelativeLength { max_ratio: 0.2 }
    }
}

/// Rename detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameConfig {
    /// Match deleted/added files with identical normalized content before scoring
    pub exact_hash_pass: bool,
    /// Candidates must score strictly above this to be treated as renames
    pub similarity_threshold: f64,
    /// Number of leading lines used for the cheap first score
    pub prefilter_lines: usize,
    /// First scores below this are final
    pub prefilter_cutoff: f64,
    pub size_filter: SizeFilter,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            exact_hash_pass: true,
            similarity_threshold: 0.85,
            prefilter_lines: 100,
            prefilter_cutoff: 0.2,
            size_filter: SizeFilter::default(),
        }
    }
}

/// Which decompiler turns class bytes into text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecompilerConfig {
    /// Built-in class-file reader listing the class, its fields and methods
    #[default]
    Structure,
    /// External decompiler invoked as `program args... <class file>`
    Command { program: PathBuf, args: Vec<String> },
}

/// Optional pretty-printer run before normalization
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatterConfig {
    #[default]
    None,
    /// External formatter reading source on stdin and writing it to stdout
    Command {
        program: PathBuf,
        args: Vec<String>,
        #[serde(default = "default_format_extensions")]
        extensions: Vec<String>,
    },
}

fn default_format_extensions() -> Vec<String> {
    vec!["java".to_string()]
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Decompile worker count, 0 uses the available parallelism
    #[serde(default)]
    pub decompile_pool_size: usize,

    /// Unchanged lines shown around each change
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Report unchanged file names
    #[serde(default)]
    pub include_unchanged: bool,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,

    #[serde(default)]
    pub rename: RenameConfig,

    #[serde(default)]
    pub decompiler: DecompilerConfig,

    #[serde(default)]
    pub formatter: FormatterConfig,
}

fn default_context_lines() -> usize {
    3
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            decompile_pool_size: 0,
            context_lines: default_context_lines(),
            include_unchanged: false,
            rename: RenameConfig::default(),
            decompiler: DecompilerConfig::default(),
            formatter: FormatterConfig::default(),
            portable_mode: false,
        }
    }
}

impl CompareConfig {
    /// Worker count actually used for decompilation, never below one
    pub fn effective_pool_size(&self) -> usize {
        let configured = if self.decompile_pool_size > 0 {
            self.decompile_pool_size
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        };
        configured.max(1)
    }
}
