/// Canonicalize line endings to LF and strip trailing whitespace from every line.
///
/// The line structure is preserved, including a final line break.
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into lines on `\r\n`, `\r` or `\n`.
///
/// A trailing line break terminates the last line instead of opening an
/// empty one, so `"a\n"` yields `["a"]` and `""` yields no lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }

    if start < text.len() {
        lines.push(&text[start..]);
    }

    lines
}

/// Lower-cased extension of the last path segment, or an empty string.
///
/// Both `/` and `\\` separate segments, so `"a.b/c"` has no extension.
pub fn extension_of(name: &str) -> String {
    let file_name = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);
    match file_name.rfind('.') {
        Some(dot) => file_name[dot + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}
