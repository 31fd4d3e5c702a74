//! Loads a source file into the driver's flat instruction list, i.e. `Bass::source`.
//!
//! Tabs and carriage returns are normalized to spaces, `//` strips a trailing
//! comment, and each line is split into `;`-delimited statements — both the
//! comment search and the split are quote-aware, so a stray `//` or `;` inside a
//! string literal doesn't truncate or split anything. `include "path"` is resolved
//! relative to the directory of the file doing the including and loaded recursively
//! before the surrounding statements continue; a missing include is a warning, not
//! a hard failure, matching a missing top-level source file.

use crate::driver::Driver;
use crate::error::Result;
use crate::text;
use std::path::{Path, PathBuf};

/// One `;`-delimited statement from the source, with its provenance and (once
/// `analyze()` runs) the jump target used to skip past the block it opens.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    pub statement: String,
    pub file_number: u32,
    pub line_number: u32,
    pub block_number: u32,
    pub ip: u32,
}

pub fn source(driver: &mut Driver, filename: impl AsRef<Path>) -> Result<bool> {
    let filename = filename.as_ref();
    let data = match std::fs::read_to_string(filename) {
        Ok(data) => data,
        Err(_) => {
            driver.warn(format!("source file not found: {}", filename.display()))?;
            return Ok(false);
        }
    };

    let file_number = driver.source_filenames.len() as u32;
    driver.source_filenames.push(filename.display().to_string());
    let directory = filename.parent().map(Path::to_path_buf).unwrap_or_default();

    let normalized: String = data.chars().map(|c| if c == '\t' || c == '\r' { ' ' } else { c }).collect();

    for (line_index, line) in normalized.split('\n').enumerate() {
        let line = match text::find_unquoted(line, "//") {
            Some(pos) => &line.chars().take(pos).collect::<String>(),
            None => line,
        };

        for (block_index, block) in text::split_unquoted(line, ';').iter().enumerate() {
            let statement = text::collapse_whitespace(block.trim());
            if statement.is_empty() {
                continue;
            }

            if let Some(included) = parse_include(&statement) {
                source(driver, resolve_include(&directory, included))?;
                continue;
            }

            driver.program.push(Instruction {
                statement,
                file_number,
                line_number: 1 + line_index as u32,
                block_number: 1 + block_index as u32,
                ip: 0,
            });
        }
    }

    Ok(true)
}

fn parse_include(statement: &str) -> Option<&str> {
    let rest = statement.strip_prefix("include \"")?;
    rest.strip_suffix('"')
}

fn resolve_include(including_directory: &Path, included: &str) -> PathBuf {
    including_directory.join(included)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_statements_and_strips_comments() {
        let dir = tempdir();
        std::fs::write(dir.join("main.s"), "a = 1; b = 2 // trailing\nc = 3;\n").unwrap();

        let mut driver = Driver::new();
        source(&mut driver, dir.join("main.s")).unwrap();

        let statements: Vec<&str> = driver.program.iter().map(|i| i.statement.as_str()).collect();
        assert_eq!(vec!["a = 1", "b = 2", "c = 3"], statements);
    }

    #[test]
    fn comment_marker_inside_quotes_is_not_stripped() {
        let dir = tempdir();
        std::fs::write(dir.join("main.s"), "print \"a // b\"\n").unwrap();

        let mut driver = Driver::new();
        source(&mut driver, dir.join("main.s")).unwrap();

        assert_eq!("print \"a // b\"", driver.program[0].statement);
    }

    #[test]
    fn include_resolves_relative_to_including_file() {
        let dir = tempdir();
        std::fs::create_dir(dir.join("lib")).unwrap();
        std::fs::write(dir.join("lib/inner.s"), "x = 1\n").unwrap();
        std::fs::write(dir.join("main.s"), "include \"lib/inner.s\"\ny = 2\n").unwrap();

        let mut driver = Driver::new();
        source(&mut driver, dir.join("main.s")).unwrap();

        let statements: Vec<&str> = driver.program.iter().map(|i| i.statement.as_str()).collect();
        assert_eq!(vec!["x = 1", "y = 2"], statements);
    }

    #[test]
    fn missing_source_file_is_a_warning_not_an_error() {
        let mut driver = Driver::new();
        let ok = source(&mut driver, "/nonexistent/path/does-not-exist.s").unwrap();
        assert!(!ok);
        assert!(driver.program.is_empty());
    }

    fn tempdir() -> PathBuf {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("bassette-test-{}-{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
