//! Discovery and parsing of the book directories.
//!
//! The corpus is laid out as `<root>/<book number>/<file>.abc`.

use std::path::{Path, PathBuf};

use abc::{DecodePolicy, ParseError, TuneRecord};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AbcFile {
    pub book_number: i32,
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("parse task for {path} did not complete: {source}")]
    Task {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

fn book_number(name: &str) -> Option<i32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

fn is_book_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_str().and_then(book_number).is_some()
}

fn has_abc_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("abc"))
}

/// Lists every `.abc` file directly inside a numbered book directory of
/// `root`, ordered by book number and then path.
#[instrument(level = "trace")]
pub fn find_abc_files(root: &Path) -> Result<Vec<AbcFile>, DiscoveryError> {
    if !root.exists() {
        return Err(DiscoveryError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }

    let walker = WalkDir::new(root)
        .max_depth(2)
        .into_iter()
        .filter_entry(|entry| entry.depth() != 1 || is_book_dir(entry));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() != 2 || !entry.file_type().is_file() || !has_abc_extension(entry.path()) {
            continue;
        }

        let book = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .and_then(book_number);
        if let Some(book_number) = book {
            files.push(AbcFile {
                book_number,
                path: entry.into_path(),
            });
        }
    }

    files.sort();
    debug!(n_files = files.len(), "discovered abc files");
    Ok(files)
}

/// Reads one file and parses it off the async runtime.
#[instrument(skip(file), fields(path = %file.path.display()), level = "trace")]
pub async fn load_file(
    file: &AbcFile,
    policy: DecodePolicy,
) -> Result<Vec<TuneRecord>, LoadError> {
    let bytes = tokio::fs::read(&file.path)
        .await
        .map_err(|source| LoadError::Read {
            path: file.path.clone(),
            source,
        })?;

    let book_number = file.book_number;
    let file_path = file.path.display().to_string();
    let tunes = tokio::task::spawn_blocking(move || {
        abc::parse_source(&bytes, book_number, &file_path, policy)
    })
    .await
    .map_err(|source| LoadError::Task {
        path: file.path.clone(),
        source,
    })??;

    debug!(tunes = tunes.len(), "parsed file");
    Ok(tunes)
}

/// Parses up to `jobs` files at a time, yielding results in the order of `files`.
pub fn parse_files(
    files: Vec<AbcFile>,
    policy: DecodePolicy,
    jobs: usize,
) -> impl Stream<Item = (AbcFile, Result<Vec<TuneRecord>, LoadError>)> {
    futures::stream::iter(files)
        .map(move |file| async move {
            let result = load_file(&file, policy).await;
            (file, result)
        })
        .buffered(jobs.max(1))
}

/// Per-file outcome counts for one load run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub files: usize,
    pub loaded: usize,
    pub empty: usize,
    pub failed: usize,
    pub tunes: u64,
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "files processed: {}/{}", self.loaded, self.files)?;
        writeln!(f, "files without tunes: {}", self.empty)?;
        writeln!(f, "files failed: {}", self.failed)?;
        write!(f, "tunes loaded: {}", self.tunes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TUNE: &str = "X:1\nT:Test Tune\nR:reel\nM:4/4\nK:D\n|:def|\n";

    fn book_tree() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for (dir, file) in [
            ("10", "later.abc"),
            ("2", "b.abc"),
            ("2", "a.ABC"),
            ("2", "notes.txt"),
            ("drafts", "skipped.abc"),
            ("2/nested", "deep.abc"),
        ] {
            let dir = root.path().join(dir);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(file), TUNE).unwrap();
        }
        fs::write(root.path().join("top.abc"), TUNE).unwrap();
        root
    }

    #[test]
    fn test_book_number() {
        assert_eq!(book_number("0"), Some(0));
        assert_eq!(book_number("012"), Some(12));
        assert_eq!(book_number(""), None);
        assert_eq!(book_number("-1"), None);
        assert_eq!(book_number("1a"), None);
        assert_eq!(book_number("99999999999"), None);
    }

    #[test]
    fn test_find_abc_files_in_numbered_books() {
        let root = book_tree();
        let files = find_abc_files(root.path()).unwrap();

        let found = files
            .iter()
            .map(|file| {
                let relative = file.path.strip_prefix(root.path()).unwrap();
                (file.book_number, relative.to_path_buf())
            })
            .collect::<Vec<_>>();
        assert_eq!(
            found,
            vec![
                (2, PathBuf::from("2/a.ABC")),
                (2, PathBuf::from("2/b.abc")),
                (10, PathBuf::from("10/later.abc")),
            ]
        );
    }

    #[test]
    fn test_find_abc_files_rejects_bad_roots() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("file.abc");
        fs::write(&file, TUNE).unwrap();

        assert!(matches!(
            find_abc_files(&root.path().join("missing")),
            Err(DiscoveryError::PathNotFound(_))
        ));
        assert!(matches!(
            find_abc_files(&file),
            Err(DiscoveryError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_load_file() {
        let root = book_tree();
        let file = AbcFile {
            book_number: 2,
            path: root.path().join("2/b.abc"),
        };

        let tunes = load_file(&file, DecodePolicy::Strict).await.unwrap();
        assert_eq!(tunes.len(), 1);
        assert_eq!(tunes[0].book_number, 2);
        assert_eq!(tunes[0].title, "Test Tune");
        assert_eq!(tunes[0].file_path, file.path.display().to_string());
    }

    #[tokio::test]
    async fn test_load_file_errors() {
        let root = tempfile::tempdir().unwrap();
        let binary = AbcFile {
            book_number: 1,
            path: root.path().join("binary.abc"),
        };
        fs::write(&binary.path, b"X:1\n\xFF\xFF").unwrap();
        let missing = AbcFile {
            book_number: 1,
            path: root.path().join("missing.abc"),
        };

        assert!(matches!(
            load_file(&binary, DecodePolicy::Strict).await,
            Err(LoadError::Parse(ParseError::NotText { .. }))
        ));
        assert!(matches!(
            load_file(&missing, DecodePolicy::Strict).await,
            Err(LoadError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn test_parse_files_keeps_discovery_order() {
        let root = book_tree();
        let files = find_abc_files(root.path()).unwrap();
        let expected = files.clone();

        let outcomes = parse_files(files, DecodePolicy::Strict, 4)
            .collect::<Vec<_>>()
            .await;

        let order = outcomes.iter().map(|(file, _)| file.clone()).collect::<Vec<_>>();
        assert_eq!(order, expected);
        assert!(outcomes
            .iter()
            .all(|(_, result)| matches!(result, Ok(tunes) if tunes.len() == 1)));
    }
}
