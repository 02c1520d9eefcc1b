pub mod archive;
pub mod classify;
pub mod comparison;
pub mod decompile;
pub mod normalize;
pub mod rename;
pub mod text_diff;

pub use archive::{archive_input_for_path, read_sources, ArchiveReader, FileArchive, MemoryArchive};
pub use classify::{classify, Classification};
pub use comparison::{ComparisonEngine, ComparisonRequest};
pub use decompile::{ClassStructureBackend, CommandBackend, DecompileBackend, Decompiler};
pub use normalize::{prepare_source, CommandFormatter, PassthroughFormatter, SourceFormatter};
pub use rename::{similarity, Rename, RenameDetector};
pub use text_diff::{DiffRenderer, UnifiedDiffRenderer, NO_TEXTUAL_DIFFERENCES};
