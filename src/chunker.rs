//! Input discovery and chunk planning
//!
//! Walks the input paths, collects non-empty files in discovery order and
//! partitions each file into article-sized byte ranges. Also owns subject
//! derivation and the safe-name normalization used for generated output
//! names.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Characters folded to `-` during name normalization
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ &_=+:]").expect("invalid separator regex"));

/// Everything not allowed in a normalized name (post-lowercasing)
static ILLEGAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9.-]").expect("invalid legal-chars regex"));

/// A discovered input file, immutable once collected
#[derive(Clone, Debug)]
pub struct FileTask {
    /// Path to the file on disk
    pub path: PathBuf,
    /// File size in bytes (always > 0; empty files are skipped)
    pub size: u64,
}

/// One article-sized byte range of one file
///
/// The chunks planned for a file are exhaustive and non-overlapping: part
/// numbers are contiguous from 1 and part sizes sum to the file size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSpec {
    /// 1-based part number
    pub part: u64,
    /// Total parts for the owning file
    pub part_total: u64,
    /// First byte of the range (inclusive)
    pub begin: u64,
    /// One past the last byte of the range
    pub end: u64,
    /// 1-based number of the owning file within the run
    pub file_num: usize,
    /// Total files in the run
    pub file_total: usize,
    /// Size of the owning file in bytes
    pub file_size: u64,
    /// Base name of the owning file
    pub file_name: String,
}

impl ChunkSpec {
    /// Raw byte length of this chunk
    pub fn size(&self) -> u64 {
        self.end - self.begin
    }
}

/// How the subject line for each file is derived
#[derive(Clone, Debug)]
pub enum SubjectMode {
    /// A user-supplied literal, shared by every file
    Literal(String),
    /// The immediate parent directory name of each file
    DirectoryNames,
}

/// Subject text for one file under the given mode
pub fn subject_for(task: &FileTask, mode: &SubjectMode) -> String {
    match mode {
        SubjectMode::Literal(subject) => subject.clone(),
        SubjectMode::DirectoryNames => task
            .path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Walk every input path and collect postable files in discovery order.
///
/// Directories are recursed into with entries sorted by file name; zero-byte
/// files are skipped. A missing input path is fatal.
pub fn collect_files(inputs: &[PathBuf]) -> Result<Vec<FileTask>> {
    let mut files = Vec::new();
    for input in inputs {
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry =
                entry.map_err(|e| Error::Input(format!("walk {}: {e}", input.display())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|e| Error::Input(format!("stat {}: {e}", entry.path().display())))?
                .len();
            if size == 0 {
                continue;
            }
            files.push(FileTask {
                path: entry.path().to_path_buf(),
                size,
            });
        }
    }
    Ok(files)
}

/// Partition one file into article-sized chunks.
///
/// Part k (1-indexed) covers `[(k-1)*A, min(k*A, F))` for article size A and
/// file size F.
pub fn plan_chunks(
    file_num: usize,
    file_total: usize,
    task: &FileTask,
    article_size: u64,
) -> Vec<ChunkSpec> {
    let file_name = task
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parts = task.size.div_ceil(article_size);

    (1..=parts)
        .map(|part| ChunkSpec {
            part,
            part_total: parts,
            begin: (part - 1) * article_size,
            end: (part * article_size).min(task.size),
            file_num,
            file_total,
            file_size: task.size,
            file_name: file_name.clone(),
        })
        .collect()
}

/// Normalize subject text into a filesystem-safe token.
///
/// Lower-cases, folds separator characters to `-`, strips everything that is
/// not alphanumeric, `-` or `.`, and collapses runs of `-`. Idempotent.
pub fn safe_file_name(subject: &str) -> String {
    let name = subject.to_lowercase();
    let name = name.trim();
    let name = SEPARATORS.replace_all(name, "-");
    let mut name = ILLEGAL.replace_all(&name, "").into_owned();
    while name.contains("--") {
        name = name.replace("--", "-");
    }
    name
}
