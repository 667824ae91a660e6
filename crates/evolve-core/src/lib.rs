use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

mod frontmatter;
mod git;
mod window;

pub use frontmatter::{FrontMatter, FrontMatterError, FrontMatterValue, parse_front_matter};
pub use git::{CommitHistory, CommitIter, GitContext, GitError};
pub use window::{InvalidTimeWindow, TimeWindow, parse_boundary};

/// Coarse classification used by the binary to keep input errors and
/// state conflicts apart when choosing an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Input,
    StateConflict,
    Internal,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::StateConflict => "state_conflict",
            Self::Internal => "internal",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Self::Input => 2,
            Self::StateConflict => 3,
            Self::Internal => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub lines_added: u64,
    pub lines_removed: u64,
    #[serde(default)]
    pub binary: bool,
}

impl FileChange {
    pub fn line_changes(&self) -> u64 {
        self.lines_added.saturating_add(self.lines_removed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: i64,
    pub subject: String,
    pub files: Vec<FileChange>,
}

impl CommitRecord {
    pub fn short_hash(&self) -> &str {
        let end = self.hash.len().min(8);
        &self.hash[..end]
    }

    pub fn touches(&self, path: &str) -> bool {
        self.files.iter().any(|file| file.path == path)
    }
}

pub fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/")
}

pub fn content_hash(content: &str) -> String {
    blake3_hex(content.as_bytes())
}

pub fn current_unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}

pub fn current_unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Glob-style match supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let mut previous = vec![false; text.len() + 1];
    let mut current = vec![false; text.len() + 1];
    previous[0] = true;

    for &token in pattern {
        current[0] = token == b'*' && previous[0];
        for index in 1..=text.len() {
            current[index] = match token {
                b'*' => current[index - 1] || previous[index],
                b'?' => previous[index - 1],
                _ => previous[index - 1] && token == text[index - 1],
            };
        }
        std::mem::swap(&mut previous, &mut current);
        current.fill(false);
    }

    previous[text.len()]
}

/// Writes `contents` to a sibling temp file and renames it over `path`, so
/// readers see either the old file or the new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
