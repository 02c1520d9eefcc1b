use super::DecompileBackend;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Runs an external decompiler as `program args... <class file>` and returns
/// its standard output.
///
/// The entry is written to a scratch directory under its own file name,
/// since most decompilers derive the class name from the path.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl DecompileBackend for CommandBackend {
    fn decompile(&self, entry_name: &str, bytes: &[u8]) -> io::Result<String> {
        let scratch = tempfile::Builder::new()
            .prefix("srccompare-decompile-")
            .tempdir()?;
        let file_name = entry_name
            .rsplit(&['/', '\\'][..])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("Entry.class");
        let class_path = scratch.path().join(file_name);
        fs::write(&class_path, bytes)?;

        debug!("Running {} on {}", self.program.display(), entry_name);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&class_path)
            .output()?;

        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_error() {
        let backend = CommandBackend::new("/nonexistent/decompiler", Vec::new());
        assert!(backend.decompile("pkg/Foo.class", b"\xca\xfe").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_becomes_content() {
        let backend = CommandBackend::new("cat", Vec::new());
        let text = backend
            .decompile("pkg/Foo.class", b"public class Foo {}\n")
            .unwrap();
        assert_eq!(text, "public class Foo {}\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_receives_entry_file_name() {
        let backend = CommandBackend::new("basename", Vec::new());
        let text = backend.decompile("pkg/Foo.class", b"").unwrap();
        assert_eq!(text.trim(), "Foo.class");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_error() {
        let backend = CommandBackend::new("false", Vec::new());
        let err = backend.decompile("pkg/Foo.class", b"").unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
