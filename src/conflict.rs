//! # Conflict Marker Parser
//!
//! Parses the `<<<<<<<` / `=======` / `>>>>>>>` blocks git leaves in files it
//! could not merge, so they can be shown to whoever (or whatever) resolves
//! them.
//!
//! The parser is a small scanner with three states: seeking a start marker,
//! seeking a separator, seeking an end marker. Any marker out of sequence
//! throws away the region being built and scanning resumes; a region is only
//! emitted for a complete, well-ordered triple. Parsing is total: it never
//! fails, and a conflicted file with no well-formed triple yields an empty
//! list.
//!
//! Marker recognition is done on the trimmed line: start and end markers are
//! prefixes (git appends the branch or commit label), the separator must be
//! exactly seven `=` characters so lines that merely contain `=======` are not
//! mistaken for one.

use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults::{CONFLICT_CONTEXT_LINES, MAX_CONFLICT_FILE_BYTES};
use crate::repository::RepositoryStateInfo;

const START_MARKER: &str = "<<<<<<<";
const SEPARATOR_MARKER: &str = "=======";
const END_MARKER: &str = ">>>>>>>";

/// One complete conflict block inside a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRegion {
    /// Zero-based line index of the start marker.
    pub start_line: usize,
    /// Zero-based line index of the separator.
    pub separator_line: usize,
    /// Zero-based line index of the end marker.
    pub end_line: usize,
    /// Start marker line, verbatim (including any branch label).
    pub start_marker: String,
    pub separator_marker: String,
    /// End marker line, verbatim (including any commit label).
    pub end_marker: String,
    /// Lines strictly between start marker and separator.
    pub ours: String,
    /// Lines strictly between separator and end marker.
    pub theirs: String,
    /// Up to three lines immediately before the start marker.
    pub context_before: Vec<String>,
    /// Up to three lines immediately after the end marker.
    pub context_after: Vec<String>,
}

/// Conflict regions of one file, or why the file could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConflict {
    /// Display name of the repository the file belongs to.
    pub repo: String,
    /// Path relative to the repository root.
    pub file_path: PathBuf,
    pub regions: Vec<ConflictRegion>,
    /// Set when the file was missing, binary or too large.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Start,
    Separator,
    End,
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    SeekingStart,
    SeekingSeparator { start: usize },
    SeekingEnd { start: usize, separator: usize },
}

fn classify(line: &str) -> Option<Marker> {
    let trimmed = line.trim();
    if trimmed.starts_with(START_MARKER) {
        Some(Marker::Start)
    } else if trimmed == SEPARATOR_MARKER {
        Some(Marker::Separator)
    } else if trimmed.starts_with(END_MARKER) {
        Some(Marker::End)
    } else {
        None
    }
}

/// Parse conflict regions out of raw file bytes.
pub fn parse_conflicts(content: &[u8]) -> Vec<ConflictRegion> {
    let text = String::from_utf8_lossy(content);
    let lines: Vec<&str> = text.lines().collect();

    let mut regions = Vec::new();
    let mut state = ScanState::SeekingStart;

    for (index, line) in lines.iter().enumerate() {
        let Some(marker) = classify(line) else {
            continue;
        };

        state = match (state, marker) {
            (_, Marker::Start) => ScanState::SeekingSeparator { start: index },
            (ScanState::SeekingSeparator { start }, Marker::Separator) => ScanState::SeekingEnd {
                start,
                separator: index,
            },
            (ScanState::SeekingEnd { start, separator }, Marker::End) => {
                regions.push(build_region(&lines, start, separator, index));
                ScanState::SeekingStart
            }
            // Out-of-order marker: drop the partial region.
            _ => ScanState::SeekingStart,
        };
    }

    regions
}

fn build_region(lines: &[&str], start: usize, separator: usize, end: usize) -> ConflictRegion {
    let before_from = start.saturating_sub(CONFLICT_CONTEXT_LINES);
    let after_to = (end + 1 + CONFLICT_CONTEXT_LINES).min(lines.len());

    ConflictRegion {
        start_line: start,
        separator_line: separator,
        end_line: end,
        start_marker: lines[start].to_string(),
        separator_marker: lines[separator].to_string(),
        end_marker: lines[end].to_string(),
        ours: lines[start + 1..separator].join("\n"),
        theirs: lines[separator + 1..end].join("\n"),
        context_before: lines[before_from..start]
            .iter()
            .map(|l| l.to_string())
            .collect(),
        context_after: lines[end + 1..after_to]
            .iter()
            .map(|l| l.to_string())
            .collect(),
    }
}

/// Read and parse one conflicted file of a repository.
///
/// Missing files, files over 1 MiB and binary files (any NUL byte) are
/// reported through `FileConflict::error` instead of being parsed.
pub fn load_file_conflict(repo: &str, repo_path: &Path, file_path: &Path) -> FileConflict {
    let mut conflict = FileConflict {
        repo: repo.to_string(),
        file_path: file_path.to_path_buf(),
        regions: Vec::new(),
        error: None,
    };

    let full_path = repo_path.join(file_path);
    let metadata = match fs::metadata(&full_path) {
        Ok(metadata) => metadata,
        Err(e) => {
            conflict.error = Some(format!("cannot read file: {}", e));
            return conflict;
        }
    };

    if metadata.len() > MAX_CONFLICT_FILE_BYTES {
        conflict.error = Some(format!(
            "file too large to display ({} bytes, limit {})",
            metadata.len(),
            MAX_CONFLICT_FILE_BYTES
        ));
        return conflict;
    }

    match fs::read(&full_path) {
        Ok(content) if content.contains(&0) => {
            conflict.error = Some("binary file, resolve it with a merge tool".to_string());
        }
        Ok(content) => conflict.regions = parse_conflicts(&content),
        Err(e) => conflict.error = Some(format!("cannot read file: {}", e)),
    }

    conflict
}

/// Load every conflicted file recorded for a repository.
pub fn load_repository_conflicts(info: &RepositoryStateInfo) -> Vec<FileConflict> {
    info.conflicted_files
        .iter()
        .map(|file| load_file_conflict(&info.repo.name, &info.repo.path, Path::new(file)))
        .collect()
}
