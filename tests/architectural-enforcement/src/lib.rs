//! Architectural Enforcement
//!
//! Line-based source scanners shared by the workspace's architectural tests:
//! - no sleeping outside retry backoff (`tests/sleep_prohibition.rs`)
//! - no blocking I/O inside async functions (`tests/blocking_io_prohibition.rs`)
//!
//! Only production sources are scanned; `#[cfg(test)]` modules and test
//! functions are skipped.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["pipeline/core/src", "pipeline/server/src", "chat/src"];

/// A Rust source file loaded for scanning
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
}

impl SourceFile {
    pub fn lines(&self) -> Vec<&str> {
        self.content.lines().collect()
    }
}

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: PathBuf,
    pub line: usize,
    pub kind: &'static str,
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.kind,
            self.text
        )
    }
}

pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Load every `.rs` file under the production directories
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(entry.path()) {
                files.push(SourceFile {
                    path: entry.path().to_path_buf(),
                    content,
                });
            }
        }
    }

    files
}

/// The part of a line before any `//` comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// `Some(is_async)` if the line opens a function
pub fn fn_header(line: &str) -> Option<bool> {
    let mut rest = line.trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
        }
    }
    if rest.starts_with("async fn ") {
        Some(true)
    } else if rest.starts_with("fn ") {
        Some(false)
    } else {
        None
    }
}

/// Index of the closest function header at or above `idx`
pub fn enclosing_fn(lines: &[&str], idx: usize) -> Option<usize> {
    (0..=idx.min(lines.len().saturating_sub(1)))
        .rev()
        .find(|&i| fn_header(lines[i]).is_some())
}

/// Whether the line sits in a test module or a test function
pub fn is_test_code(lines: &[&str], idx: usize) -> bool {
    if lines[..idx].iter().any(|l| l.trim() == "#[cfg(test)]") {
        return true;
    }
    let Some(fn_idx) = enclosing_fn(lines, idx) else {
        return false;
    };
    lines[..fn_idx]
        .iter()
        .rev()
        .take_while(|l| l.trim_start().starts_with("#["))
        .any(|l| {
            let l = l.trim();
            l.starts_with("#[test]") || l.starts_with("#[tokio::test")
        })
}

/// Whether the enclosing function is `async`
pub fn is_in_async_fn(lines: &[&str], idx: usize) -> bool {
    enclosing_fn(lines, idx)
        .and_then(|i| fn_header(lines[i]))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_header_visibility() {
        assert_eq!(fn_header("    pub async fn send("), Some(true));
        assert_eq!(fn_header("pub(crate) fn parse_line("), Some(false));
        assert_eq!(fn_header("async fn main() -> Result<()> {"), Some(true));
        assert_eq!(fn_header("let f = async move {"), None);
    }

    #[test]
    fn test_async_detection() {
        let code = [
            "async fn bad() {",
            "    let s = std::fs::read_to_string(\"x\");",
            "}",
            "fn fine() {",
            "    let s = std::fs::read_to_string(\"x\");",
            "}",
        ];
        assert!(is_in_async_fn(&code, 1));
        assert!(!is_in_async_fn(&code, 4));
    }

    #[test]
    fn test_test_code_detection() {
        let code = [
            "#[tokio::test]",
            "async fn test_something() {",
            "    tokio::time::sleep(d).await;",
            "}",
        ];
        assert!(is_test_code(&code, 2));

        let module = ["fn real() {}", "#[cfg(test)]", "mod tests {", "    fn helper() {}"];
        assert!(!is_test_code(&module, 0));
        assert!(is_test_code(&module, 3));
    }

    #[test]
    fn test_scans_workspace_sources() {
        assert!(!production_sources().is_empty());
    }
}
