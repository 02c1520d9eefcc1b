use srccompare_common::{extension_of, FileInfo, FormatError};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

pub use srccompare_common::normalize_text;

/// Pretty-printer applied to source text before normalization
pub trait SourceFormatter: Send + Sync {
    fn format(&self, name: &str, content: &str) -> Result<String, FormatError>;
}

/// Leaves content untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFormatter;

impl SourceFormatter for PassthroughFormatter {
    fn format(&self, _name: &str, content: &str) -> Result<String, FormatError> {
        Ok(content.to_string())
    }
}

/// Pipes source through an external formatter (stdin in, stdout out).
///
/// Only files whose extension is listed are sent to the program; anything
/// else is returned as is.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    program: PathBuf,
    args: Vec<String>,
    extensions: Vec<String>,
}

impl CommandFormatter {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, extensions: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn applies_to(&self, name: &str) -> bool {
        let extension = extension_of(name);
        self.extensions.iter().any(|ext| *ext == extension)
    }
}

impl SourceFormatter for CommandFormatter {
    fn format(&self, name: &str, content: &str) -> Result<String, FormatError> {
        if !self.applies_to(name) {
            return Ok(content.to_string());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // The formatter may fill stdout before it has drained stdin.
        let mut stdin = child.stdin.take();
        let input = content.as_bytes().to_vec();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(stdin) = stdin.as_mut() {
                stdin.write_all(&input)?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        let write_result = writer
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "stdin writer panicked",
            )));

        if !output.status.success() {
            return Err(FormatError::Failed {
                program: self.program.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        write_result?;

        String::from_utf8(output.stdout).map_err(|_| FormatError::InvalidOutput(name.to_string()))
    }
}

/// Format (best effort) and normalize one file.
///
/// A formatter failure is logged and the unformatted text is normalized
/// instead; it never fails the comparison.
pub fn prepare_source(formatter: &dyn SourceFormatter, name: &str, content: &str) -> FileInfo {
    let formatted = match formatter.format(name, content) {
        Ok(formatted) => formatted,
        Err(e) => {
            warn!("Formatting {} failed, using normalized text only: {}", name, e);
            content.to_string()
        }
    };

    let file = FileInfo::new(name, normalize_text(&formatted));
    debug!("Prepared {} ({})", name, file.hash().to_hex());
    file
}
