use std::path::Path;

use serde::Deserialize;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Mojo,
    Python,
    Notebook,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "mojo" | "🔥" => Some(Self::Mojo),
            "py" | "pyx" | "pxd" => Some(Self::Python),
            "ipynb" => Some(Self::Notebook),
            _ => None,
        }
    }
}

/// Code files in a working copy, by kind, plus their non-blank lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCounts {
    pub n_mojo_files: u64,
    pub n_python_files: u64,
    pub n_notebook_files: u64,
    pub n_code_lines: u64,
}

impl FileCounts {
    pub fn total_files(&self) -> u64 {
        self.n_mojo_files + self.n_python_files + self.n_notebook_files
    }
}

#[derive(Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Deserialize)]
struct NotebookCell {
    #[serde(default)]
    source: CellSource,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CellSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for CellSource {
    fn default() -> Self {
        Self::Lines(Vec::new())
    }
}

fn non_blank_lines(text: &str) -> u64 {
    text.lines().filter(|line| !line.trim().is_empty()).count() as u64
}

fn notebook_lines(path: &Path, content: &str) -> u64 {
    match serde_json::from_str::<Notebook>(content) {
        Ok(notebook) => notebook
            .cells
            .iter()
            .map(|cell| match &cell.source {
                CellSource::Lines(lines) => lines.iter().map(|l| non_blank_lines(l)).sum(),
                CellSource::Text(text) => non_blank_lines(text),
            })
            .sum(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "invalid notebook JSON");
            0
        }
    }
}

fn count_lines(path: &Path, kind: FileKind) -> u64 {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read file");
            return 0;
        }
    };
    let content = String::from_utf8_lossy(&bytes);
    match kind {
        FileKind::Notebook => notebook_lines(path, &content),
        FileKind::Mojo | FileKind::Python => non_blank_lines(&content),
    }
}

/// Walk `root` (skipping `.git`) and count Mojo, Python and notebook files.
pub fn count_code_files(root: &Path) -> FileCounts {
    let mut counts = FileCounts::default();

    let entries = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(kind) = FileKind::from_path(entry.path()) else {
            continue;
        };

        match kind {
            FileKind::Mojo => counts.n_mojo_files += 1,
            FileKind::Python => counts.n_python_files += 1,
            FileKind::Notebook => counts.n_notebook_files += 1,
        }
        counts.n_code_lines += count_lines(entry.path(), kind);
    }

    counts
}
