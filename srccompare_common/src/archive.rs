use crate::CompareError;
use std::io::{Read, Seek};

/// Readable and seekable byte source, as required to walk a zip central directory
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// An uploaded or on-disk archive, independent of where its bytes live.
///
/// `open_stream` may be called any number of times; each call yields a fresh
/// reader positioned at the start of the archive.
pub trait ArchiveInput: Send + Sync {
    /// Display name of the archive (e.g. "classes.jar")
    fn filename(&self) -> &str;

    /// Opens the archive bytes for reading
    fn open_stream(&self) -> Result<Box<dyn ReadSeek + '_>, CompareError>;
}

/// One named blob inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub is_dir: bool,
    pub bytes: Vec<u8>,
}
