use srccompare_common::{
    extension_of, ArchiveEntry, ArchiveInput, CompareError, FileInfo, FileSet, ReadSeek,
    CONTENT_NOT_READ,
};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// Extensions copied verbatim as text when they appear next to classes or sources
const TEXT_EXTENSIONS: &[&str] = &[
    "java", "txt", "xml", "properties", "mf", "html", "htm", "xhtml", "jsp", "css", "js",
    "json", "yml", "yaml", "md", "sql", "csv", "kt", "kts", "groovy", "scala", "gradle", "sh",
    "bat", "cmd", "conf", "cfg", "ini", "toml", "xsd", "wsdl", "dtd", "tld", "ftl", "vm",
];

/// How an archive entry is turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Compiled class, handed to a decompile backend
    Class,
    /// Human-readable file, copied as text
    Text,
    /// Anything else, replaced by the `CONTENT_NOT_READ` sentinel
    Binary,
}

impl EntryKind {
    pub fn of(name: &str) -> Self {
        let extension = extension_of(name);
        if extension == "class" {
            EntryKind::Class
        } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            EntryKind::Text
        } else {
            EntryKind::Binary
        }
    }
}

/// Text or sentinel content for an entry that is not decompiled
pub fn passthrough_entry(name: String, bytes: &[u8], kind: EntryKind) -> FileInfo {
    match kind {
        EntryKind::Text => FileInfo::new(name, String::from_utf8_lossy(bytes).into_owned()),
        EntryKind::Class | EntryKind::Binary => FileInfo::new(name, CONTENT_NOT_READ),
    }
}

/// Archive stored on disk
pub struct FileArchive {
    filename: String,
    path: PathBuf,
}

impl FileArchive {
    pub fn new(path: PathBuf) -> Result<Self, CompareError> {
        if !path.exists() {
            return Err(CompareError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Archive not found: {}", path.display()),
            )));
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { filename, path })
    }
}

impl ArchiveInput for FileArchive {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn open_stream(&self) -> Result<Box<dyn ReadSeek + '_>, CompareError> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// Archive held in memory, e.g. an upload or a wrapped single file
pub struct MemoryArchive {
    filename: String,
    bytes: Vec<u8>,
}

impl MemoryArchive {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Zip built from `(name, bytes)` pairs; names ending in `/` become directories
    pub fn from_entries(
        filename: impl Into<String>,
        entries: &[(&str, &[u8])],
    ) -> Result<Self, CompareError> {
        let filename = filename.into();
        let bytes = build_zip(&filename, entries)?;
        Ok(Self::new(filename, bytes))
    }
}

impl ArchiveInput for MemoryArchive {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn open_stream(&self) -> Result<Box<dyn ReadSeek + '_>, CompareError> {
        Ok(Box::new(Cursor::new(self.bytes.as_slice())))
    }
}

/// Pick the archive adapter for a path given on the command line.
///
/// A lone `.class` or `.java` file is wrapped into a single-entry archive named
/// after the file; everything else is read as a zip (jar, war, ...).
pub fn archive_input_for_path(path: &Path) -> Result<Box<dyn ArchiveInput>, CompareError> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().trim().to_string())
        .unwrap_or_default();

    match extension_of(&filename).as_str() {
        "class" | "java" => {
            let content = std::fs::read(path)?;
            let bytes = build_zip(&filename, &[(filename.as_str(), content.as_slice())])?;
            debug!("Wrapped {} into a single-entry archive", path.display());
            Ok(Box::new(MemoryArchive::new(filename, bytes)))
        }
        _ => Ok(Box::new(FileArchive::new(path.to_path_buf())?)),
    }
}

/// Write a zip archive holding the given entries in order
pub fn build_zip(archive_name: &str, entries: &[(&str, &[u8])]) -> Result<Vec<u8>, CompareError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options)
                .map_err(|e| CompareError::archive_read(archive_name, e))?;
        } else {
            zip.start_file(*name, options)
                .map_err(|e| CompareError::archive_read(archive_name, e))?;
            zip.write_all(content)?;
        }
    }

    let cursor = zip
        .finish()
        .map_err(|e| CompareError::archive_read(archive_name, e))?;
    Ok(cursor.into_inner())
}

/// Walks a zip archive entry by entry, in archive order.
///
/// Only the entry being returned is held in memory.
pub struct ArchiveReader<'a> {
    archive_name: String,
    archive: ZipArchive<Box<dyn ReadSeek + 'a>>,
    next: usize,
}

impl<'a> ArchiveReader<'a> {
    pub fn open(input: &'a dyn ArchiveInput) -> Result<Self, CompareError> {
        let archive_name = input.filename().to_string();
        let stream = input.open_stream()?;
        let archive =
            ZipArchive::new(stream).map_err(|e| CompareError::archive_read(&archive_name, e))?;

        debug!("Opened {} with {} entries", archive_name, archive.len());
        Ok(Self {
            archive_name,
            archive,
            next: 0,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.archive.len()
    }

    /// Read the next entry, or `None` once the archive is exhausted
    pub fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, CompareError> {
        if self.next >= self.archive.len() {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;

        let mut file = self
            .archive
            .by_index(index)
            .map_err(|e| CompareError::archive_read(&self.archive_name, e))?;

        let name = file.name().to_string();
        let is_dir = file.is_dir();
        let mut bytes = Vec::new();
        if !is_dir {
            file.read_to_end(&mut bytes)
                .map_err(|e| CompareError::archive_read(&self.archive_name, e))?;
        }

        Ok(Some(ArchiveEntry {
            name,
            is_dir,
            bytes,
        }))
    }
}

/// Read every file entry of a source archive without decompiling anything.
///
/// Text entries keep their content; class files and binaries become the
/// `CONTENT_NOT_READ` sentinel. Directories are skipped.
pub fn read_sources(input: &dyn ArchiveInput) -> Result<FileSet, CompareError> {
    let mut reader = ArchiveReader::open(input)?;
    let mut files = FileSet::with_capacity(reader.len());

    while let Some(entry) = reader.next_entry()? {
        if entry.is_dir {
            continue;
        }
        let kind = EntryKind::of(&entry.name);
        files.insert(passthrough_entry(entry.name, &entry.bytes, kind));
    }

    debug!("Read {} source entries from {}", files.len(), input.filename());
    Ok(files)
}
